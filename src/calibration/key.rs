//! `CalibrationKey`: identity of a dark/flat reference, and the nearest-match
//! distance metric over it (section 4.2).

use serde::{Deserialize, Serialize};

/// Identity of a calibration reference.
///
/// `exposure_seconds` is carried as `f64` to give headroom over the
/// millisecond resolution the filename encoding actually needs; values are
/// formatted into filenames with [`format_exposure`] and must round-trip
/// through [`parse_exposure`] exactly as formatted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationKey {
    pub detector_id: String,
    pub exposure_seconds: f64,
    pub gain: i64,
    pub width: usize,
    pub height: usize,
}

impl CalibrationKey {
    pub fn new(
        detector_id: impl Into<String>,
        exposure_seconds: f64,
        gain: i64,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            detector_id: detector_id.into(),
            exposure_seconds,
            gain,
            width,
            height,
        }
    }

    /// `d((t1,g1),(t2,g2)) = |t1-t2| + |g1-g2|/100`. Seconds dominate; a gain
    /// difference of 100 units equals one second.
    pub fn distance(&self, other: &CalibrationKey) -> f64 {
        (self.exposure_seconds - other.exposure_seconds).abs()
            + (self.gain - other.gain).unsigned_abs() as f64 / 100.0
    }

    pub fn dims_match(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }
}

/// Formats an exposure time as a bare decimal (e.g. `1.5`, `1`), the form
/// used in reference filenames.
pub fn format_exposure(t: f64) -> String {
    if t.fract() == 0.0 && t.is_finite() {
        format!("{}", t as i64)
    } else {
        let mut s = format!("{:.6}", t);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

/// Parses an exposure time from its filename representation.
pub fn parse_exposure(s: &str) -> Option<f64> {
    s.parse::<f64>().ok()
}
