//! The Correction Pipeline (section 4.3): an ordered, cached composition of
//! correction stages run three ways — live (full run, with a pre-distortion
//! preview snapshot), prefix-only (dark/flat capture, which must not see its
//! own downstream corrections), and continuation (replaying the fixed tail
//! of stages after one mid-pipeline module's parameters changed).

pub mod stage;
pub mod stages;

pub use stage::{apply_stage, default_stages, PipelineContext, StageEntry, StageKind, DISTORTION_PREVIEW_SLOT};

use crate::error::{AcqError, AppResult};
use crate::frame::Frame;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Result of a full, live run: the final frame, the token identifying this
/// run's cached inputs, and — if any remap stage is slotted in — the frame as
/// it stood immediately before the first one, for the pre-distortion preview.
pub struct PushResult {
    pub output: Frame,
    pub pre_distortion: Option<Frame>,
    pub token: u64,
}

/// Cheap per-frame summary for the `pipeline_step` diagnostic line: the
/// mean of finite samples, treating an all-nonfinite frame as zero.
fn signature(frame: &Frame) -> f32 {
    let mut sum = 0f64;
    let mut count = 0u64;
    for &v in &frame.samples {
        if v.is_finite() {
            sum += v as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

pub struct Pipeline {
    /// Ascending by slot; `new` rejects duplicate slots before this is built.
    stages: Vec<StageEntry>,
    /// Per-slot cache of `(token, input frame seen by that stage)`, so a
    /// later continuation can resume without recomputing the prefix.
    cache: Mutex<HashMap<i32, (u64, Frame)>>,
    token_counter: AtomicU64,
}

impl Pipeline {
    pub fn new(mut stages: Vec<StageEntry>) -> AppResult<Self> {
        stages.sort_by_key(|s| s.slot);
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.slot) {
                return Err(AcqError::Configuration(format!(
                    "duplicate pipeline slot {} (stage {:?})",
                    stage.slot, stage.name
                )));
            }
        }
        Ok(Self {
            stages,
            cache: Mutex::new(HashMap::new()),
            token_counter: AtomicU64::new(0),
        })
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn slot_for_name(&self, name: &str) -> Option<i32> {
        self.stages.iter().find(|s| s.name == name).map(|s| s.slot)
    }

    fn next_token(&self) -> u64 {
        self.token_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<i32, (u64, Frame)>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Full live run: every enabled stage in slot order, with the frame
    /// standing just before the first slot `>= DISTORTION_PREVIEW_SLOT`
    /// captured for the preview feed.
    pub fn push_frame(&self, input: Frame, ctx: &PipelineContext<'_>) -> PushResult {
        let token = self.next_token();
        let mut frame = input;
        let mut pre_distortion = None;
        {
            let mut cache = self.lock_cache();
            for stage in &self.stages {
                if pre_distortion.is_none() && stage.slot >= DISTORTION_PREVIEW_SLOT {
                    pre_distortion = Some(frame.clone());
                }
                cache.insert(stage.slot, (token, frame.clone()));
                let in_sig = signature(&frame);
                if stage.auto_enabled {
                    frame = apply_stage(&stage.kind, &frame, ctx);
                }
                let out_sig = signature(&frame);
                log::debug!(
                    "pipeline_step token={} slot={} module={} in_sig={:.3} out_sig={:.3} changed={} sample_mad={:.3}",
                    token,
                    stage.slot,
                    stage.name,
                    in_sig,
                    out_sig,
                    stage.auto_enabled,
                    (out_sig - in_sig).abs(),
                );
            }
        }
        PushResult { output: frame, pre_distortion, token }
    }

    /// Runs only the stages with `slot < max_slot`, for dark/flat capture:
    /// those references must not see any correction stage downstream of
    /// their own slot's purpose.
    pub fn run_prefix(&self, input: Frame, max_slot: i32, ctx: &PipelineContext<'_>) -> (u64, Frame) {
        let token = self.next_token();
        let mut frame = input;
        let mut cache = self.lock_cache();
        for stage in &self.stages {
            if stage.slot >= max_slot {
                break;
            }
            cache.insert(stage.slot, (token, frame.clone()));
            if stage.auto_enabled {
                frame = apply_stage(&stage.kind, &frame, ctx);
            }
        }
        (token, frame)
    }

    /// Resumes from the stage immediately after `start_slot_exclusive`,
    /// reusing a frame captured earlier under `token` (a prior cache entry
    /// is not consulted here; the caller supplies the resume input).
    pub fn continue_from_slot(&self, input: Frame, start_slot_exclusive: i32, ctx: &PipelineContext<'_>, token: u64) -> Frame {
        let mut frame = input;
        let mut cache = self.lock_cache();
        for stage in &self.stages {
            if stage.slot <= start_slot_exclusive {
                continue;
            }
            cache.insert(stage.slot, (token, frame.clone()));
            if stage.auto_enabled {
                frame = apply_stage(&stage.kind, &frame, ctx);
            }
        }
        frame
    }

    /// Looks up the cached input to the named module's slot from the most
    /// recent live run, and replays the tail of the pipeline from there —
    /// the response to one module's parameters changing mid-session.
    pub fn continue_from_module(&self, name: &str, ctx: &PipelineContext<'_>) -> Option<Frame> {
        let slot = self.slot_for_name(name)?;
        let (token, cached_input) = {
            let cache = self.lock_cache();
            cache.get(&slot)?.clone()
        };
        Some(self.continue_from_slot(cached_input, slot, ctx, token))
    }

    pub fn cached_input_for_slot(&self, slot: i32) -> Option<(u64, Frame)> {
        self.lock_cache().get(&slot).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::crop::CropParams;
    use crate::pipeline::stages::pincushion::PincushionParams;

    #[test]
    fn rejects_duplicate_slots() {
        let stages = vec![
            StageEntry::new("a", true, StageKind::DarkSubtract),
            StageEntry::new("b", true, StageKind::DarkSubtract),
        ];
        let err = Pipeline::new(stages).unwrap_err();
        assert!(matches!(err, AcqError::Configuration(_)));
    }

    #[test]
    fn disabled_stage_passes_through_unmodified() {
        let stages = vec![StageEntry::new(
            "crop",
            false,
            StageKind::Crop(CropParams { x_start: 0, y_start: 0, x_end: 1, y_end: 1 }),
        )];
        let pipeline = Pipeline::new(stages).unwrap();
        let frame = Frame::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let ctx = PipelineContext::default();
        let result = pipeline.push_frame(frame.clone(), &ctx);
        assert_eq!(result.output, frame);
    }

    #[test]
    fn pre_distortion_snapshot_captured_before_remap_stage() {
        let stages = vec![
            StageEntry::new("dark_subtract", true, StageKind::DarkSubtract),
            StageEntry::new(
                "pincushion_remap",
                true,
                StageKind::PincushionRemap(PincushionParams { k: 0.5, cx: -1.0, cy: -1.0 }),
            ),
        ];
        let pipeline = Pipeline::new(stages).unwrap();
        let frame = Frame::filled(4, 4, 100.0);
        let dark = Frame::filled(4, 4, 10.0);
        let ctx = PipelineContext { dark: Some(&dark), flat: None, bad_pixel_mask: None };
        let result = pipeline.push_frame(frame, &ctx);
        let pre = result.pre_distortion.expect("pincushion slot should trigger a snapshot");
        assert!(pre.samples.iter().all(|&v| (v - 90.0).abs() < 1e-4));
    }

    #[test]
    fn continue_from_module_replays_only_the_tail() {
        let stages = vec![
            StageEntry::new("dark_subtract", true, StageKind::DarkSubtract),
            StageEntry::new(
                "crop",
                true,
                StageKind::Crop(CropParams { x_start: 0, y_start: 0, x_end: 2, y_end: 2 }),
            ),
        ];
        let pipeline = Pipeline::new(stages).unwrap();
        let frame = Frame::filled(4, 4, 100.0);
        let dark = Frame::filled(4, 4, 10.0);
        let ctx = PipelineContext { dark: Some(&dark), flat: None, bad_pixel_mask: None };
        let first = pipeline.push_frame(frame, &ctx);
        assert_eq!(first.output.shape(), (2, 2));

        let replayed = pipeline.continue_from_module("crop", &ctx).expect("crop slot was cached");
        assert_eq!(replayed.shape(), (2, 2));
        assert!(replayed.samples.iter().all(|&v| (v - 90.0).abs() < 1e-4));
    }

    #[test]
    fn run_prefix_stops_before_max_slot() {
        let stages = default_stages();
        let pipeline = Pipeline::new(stages).unwrap();
        let frame = Frame::filled(4, 4, 100.0);
        let dark = Frame::filled(4, 4, 10.0);
        let ctx = PipelineContext { dark: Some(&dark), flat: None, bad_pixel_mask: None };
        let (_, out) = pipeline.run_prefix(frame, stage::SLOT_FLAT, &ctx);
        // only dark subtraction (slot 100) ran; flat (200) did not.
        assert!(out.samples.iter().all(|&v| (v - 90.0).abs() < 1e-4));
    }
}
