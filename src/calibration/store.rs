//! Calibration Store: persists and retrieves dark/flat references and
//! bad-pixel masks, with nearest-match lookup (section 4.2).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use super::io;
use super::key::{format_exposure, parse_exposure, CalibrationKey};
use crate::frame::Frame;

/// Default rejection threshold for nearest-match lookup (section 4.2).
pub const DEFAULT_MATCH_THRESHOLD: f64 = 1.0;
const DEFAULT_BAD_PIXEL_FRACTION: f64 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    Dark,
    Flat,
}

impl ReferenceKind {
    fn stem(self) -> &'static str {
        match self {
            ReferenceKind::Dark => "dark",
            ReferenceKind::Flat => "flat",
        }
    }

    fn subdir(self) -> &'static str {
        match self {
            ReferenceKind::Dark => "darks",
            ReferenceKind::Flat => "flats",
        }
    }
}

/// A loaded dark or flat reference. `key` is `None` once a reference has
/// been manually loaded from an arbitrary path (it loses its key
/// association, per the data model).
#[derive(Clone, Debug)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub key: Option<CalibrationKey>,
    pub frame: Frame,
}

/// Boolean bad-pixel grid, valid only for frames of matching shape.
#[derive(Clone, Debug)]
pub struct BadPixelMask {
    pub width: usize,
    pub height: usize,
    pub bits: Vec<bool>,
}

impl BadPixelMask {
    pub fn shape_matches(&self, frame: &Frame) -> bool {
        self.width == frame.width && self.height == frame.height
    }
}

/// Outcome of a nearest-match lookup; kept distinct from `Option<Reference>`
/// so the caller can always report the nearest candidate even on rejection.
pub enum LookupOutcome {
    Applied { reference: Reference, distance: f64 },
    TooFar { nearest_t: f64, nearest_gain: i64, distance: f64 },
    NotFound,
}

struct Candidate {
    path: PathBuf,
    exposure_seconds: f64,
    gain: i64,
    dims: Option<(usize, usize)>,
    scan_rank: u8,
}

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<kind>dark|flat)_(?P<t>[0-9]+(?:\.[0-9]+)?)_(?P<g>-?[0-9]+)(?:_(?P<w>[0-9]+)x(?P<h>[0-9]+))?\.npy$")
        .expect("static regex")
});

/// On-disk + in-memory repository of calibration artifacts, rooted at a
/// single application-data directory.
pub struct CalibrationStore {
    root: PathBuf,
    threshold: Mutex<f64>,
}

impl CalibrationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            threshold: Mutex::new(DEFAULT_MATCH_THRESHOLD),
        }
    }

    pub fn set_threshold(&self, threshold: f64) {
        *self.threshold.lock().unwrap_or_else(|e| e.into_inner()) = threshold;
    }

    fn threshold(&self) -> f64 {
        *self.threshold.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn detector_dir(&self, kind: ReferenceKind, detector_id: &str) -> PathBuf {
        self.root.join(kind.subdir()).join(detector_id)
    }

    fn top_level_dir(&self, kind: ReferenceKind) -> PathBuf {
        self.root.join(kind.subdir())
    }

    fn collect_candidates(&self, kind: ReferenceKind, detector_id: &str) -> Vec<Candidate> {
        let mut out = Vec::new();
        let per_detector = self.detector_dir(kind, detector_id);
        scan_dir_into(&per_detector, kind, 0, &mut out);
        let top_level = self.top_level_dir(kind);
        if top_level != per_detector {
            scan_dir_into(&top_level, kind, 1, &mut out);
        }
        out
    }

    /// Nearest-match lookup per section 4.2 / invariant 3 / invariant 4.
    pub fn lookup(&self, kind: ReferenceKind, query: &CalibrationKey) -> LookupOutcome {
        let candidates = self.collect_candidates(kind, &query.detector_id);
        let mut best: Option<(&Candidate, f64)> = None;
        for c in &candidates {
            if let Some((w, h)) = c.dims {
                if (w, h) != (query.width, query.height) {
                    continue;
                }
            }
            let d = (c.exposure_seconds - query.exposure_seconds).abs()
                + (c.gain - query.gain).unsigned_abs() as f64 / 100.0;
            match &best {
                Some((_, best_d)) if d >= *best_d => {}
                _ => best = Some((c, d)),
            }
        }
        let Some((cand, distance)) = best else {
            return LookupOutcome::NotFound;
        };
        if distance > self.threshold() {
            return LookupOutcome::TooFar {
                nearest_t: cand.exposure_seconds,
                nearest_gain: cand.gain,
                distance,
            };
        }
        match io::load_frame_npy(&cand.path) {
            Ok(frame) => {
                let key = CalibrationKey::new(
                    query.detector_id.clone(),
                    cand.exposure_seconds,
                    cand.gain,
                    frame.width,
                    frame.height,
                );
                LookupOutcome::Applied {
                    reference: Reference {
                        kind,
                        key: Some(key),
                        frame,
                    },
                    distance,
                }
            }
            Err(_) => LookupOutcome::NotFound,
        }
    }

    pub fn lookup_dark(&self, query: &CalibrationKey) -> LookupOutcome {
        self.lookup(ReferenceKind::Dark, query)
    }

    pub fn lookup_flat(&self, query: &CalibrationKey) -> LookupOutcome {
        self.lookup(ReferenceKind::Flat, query)
    }

    /// Writes `<kind>_<t>_<g>_<w>x<h>.{npy,tif}` plus a `last_captured_*`
    /// mirror, both under the per-detector directory.
    pub fn save_reference(&self, kind: ReferenceKind, key: &CalibrationKey, frame: &Frame) -> std::io::Result<()> {
        let dir = self.detector_dir(kind, &key.detector_id);
        std::fs::create_dir_all(&dir)?;
        let stem = format!(
            "{}_{}_{}_{}x{}",
            kind.stem(),
            format_exposure(key.exposure_seconds),
            key.gain,
            frame.width,
            frame.height
        );
        io::save_frame_npy(&dir.join(format!("{stem}.npy")), frame)?;
        io::save_frame_tiff_normalized(&dir.join(format!("{stem}.tif")), frame)?;

        let mirror_stem = format!("last_captured_{}", kind.stem());
        io::save_frame_npy(&dir.join(format!("{mirror_stem}.npy")), frame)?;
        io::save_frame_tiff_normalized(&dir.join(format!("{mirror_stem}.tif")), frame)?;
        Ok(())
    }

    pub fn save_dark(&self, key: &CalibrationKey, frame: &Frame) -> std::io::Result<()> {
        self.save_reference(ReferenceKind::Dark, key, frame)
    }

    pub fn save_flat(&self, key: &CalibrationKey, frame: &Frame) -> std::io::Result<()> {
        self.save_reference(ReferenceKind::Flat, key, frame)
    }

    /// Loads an arbitrary `.npy` file as a manually-associated reference
    /// (no key; see data model note on manual load).
    pub fn load_reference_from_path(&self, kind: ReferenceKind, path: &Path) -> std::io::Result<Reference> {
        let frame = io::load_frame_npy(path)?;
        Ok(Reference {
            kind,
            key: None,
            frame,
        })
    }

    /// Derives a bad-pixel mask from a matching-shape dark/flat pair
    /// (section 4.2).
    pub fn derive_bad_pixel_mask(
        dark: &Frame,
        flat: &Frame,
        p_cold: f64,
        p_hot: f64,
    ) -> Option<BadPixelMask> {
        if !dark.shape_matches(flat) {
            return None;
        }
        // a side with a non-positive threshold fraction is disabled
        // entirely, rather than degenerating to "percentile 0" (the
        // minimum), which would wrongly flag every pixel at the extreme.
        let cold_threshold = if p_cold > 0.0 {
            Some(percentile(&flat.samples, p_cold.min(0.5).max(0.0) * 100.0))
        } else {
            None
        };
        let hot_threshold = if p_hot > 0.0 {
            Some(percentile(&dark.samples, 100.0 - p_hot.min(0.5).max(0.0) * 100.0))
        } else {
            None
        };
        let bits: Vec<bool> = flat
            .samples
            .iter()
            .zip(dark.samples.iter())
            .map(|(&f, &d)| {
                let cold = cold_threshold.is_some_and(|t| f <= t);
                let hot = hot_threshold.is_some_and(|t| d >= t);
                cold || hot
            })
            .collect();
        Some(BadPixelMask {
            width: dark.width,
            height: dark.height,
            bits,
        })
    }

    pub fn derive_bad_pixel_mask_default(dark: &Frame, flat: &Frame) -> Option<BadPixelMask> {
        Self::derive_bad_pixel_mask(dark, flat, DEFAULT_BAD_PIXEL_FRACTION, DEFAULT_BAD_PIXEL_FRACTION)
    }

    fn bad_pixel_path(&self, detector_id: &str, width: usize, height: usize) -> PathBuf {
        self.root
            .join("darks")
            .join(detector_id)
            .join(format!("bad_pixel_map_{width}x{height}.npy"))
    }

    fn bad_pixel_review_path(&self, detector_id: &str, width: usize, height: usize) -> PathBuf {
        self.root
            .join("pixelmaps")
            .join(detector_id)
            .join(format!("bad_pixel_map_{width}x{height}.tif"))
    }

    /// Writes the mask as a binary grid plus a visual 0/255 TIFF in the
    /// review directory.
    pub fn save_bad_pixel_mask(&self, detector_id: &str, mask: &BadPixelMask) -> std::io::Result<()> {
        let mask_path = self.bad_pixel_path(detector_id, mask.width, mask.height);
        std::fs::create_dir_all(mask_path.parent().expect("has parent"))?;
        let samples: Vec<f32> = mask.bits.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        io::write_npy_f32(&mask_path, mask.width, mask.height, &samples)?;

        let review_path = self.bad_pixel_review_path(detector_id, mask.width, mask.height);
        std::fs::create_dir_all(review_path.parent().expect("has parent"))?;
        io::save_mask_tiff(&review_path, mask.width, mask.height, &mask.bits)
    }

    pub fn load_bad_pixel_mask(&self, detector_id: &str, width: usize, height: usize) -> std::io::Result<BadPixelMask> {
        let path = self.bad_pixel_path(detector_id, width, height);
        let (w, h, samples) = io::read_npy_f32(&path)?;
        Ok(BadPixelMask {
            width: w,
            height: h,
            bits: samples.into_iter().map(|v| v > 0.5).collect(),
        })
    }
}

fn scan_dir_into(dir: &Path, kind: ReferenceKind, scan_rank: u8, out: &mut Vec<Candidate>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = FILENAME_RE.captures(name) else {
            continue;
        };
        if &caps["kind"] != kind.stem() {
            continue;
        }
        let Some(t) = parse_exposure(&caps["t"]) else {
            continue;
        };
        let Ok(g) = caps["g"].parse::<i64>() else {
            continue;
        };
        let dims = match (caps.name("w"), caps.name("h")) {
            (Some(w), Some(h)) => match (w.as_str().parse(), h.as_str().parse()) {
                (Ok(w), Ok(h)) => Some((w, h)),
                _ => None,
            },
            _ => None,
        };
        out.push(Candidate {
            path,
            exposure_seconds: t,
            gain: g,
            dims,
            scan_rank,
        });
    }
    out.sort_by_key(|c| c.scan_rank);
}

/// Linear-interpolation percentile, matching numpy's default method.
fn percentile(values: &[f32], pct: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pct = pct.clamp(0.0, 100.0);
    let rank = (pct / 100.0) * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = (rank - lo as f64) as f32;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}
