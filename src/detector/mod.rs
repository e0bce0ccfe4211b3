//! Detector Worker (section 4.4): the contract a detector driver implements,
//! and the thread-local context a driver's worker thread uses to deliver
//! frames back without depending on the controller or pipeline directly.

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::AppResult;
use crate::frame::Frame;

/// Handed to a driver's `start_acquisition`; the driver's worker thread calls
/// `submit_frame` once per captured frame and polls `should_stop` at every
/// read boundary. Decouples the driver from the pipeline/controller — it
/// only ever sees this narrow surface, per the design note on inverting the
/// callback relationship.
pub struct WorkerContext {
    cancel: Arc<AtomicBool>,
    pub exposure_seconds: f64,
    /// `Some(n)` for capture_n/dark/flat capture; `None` for continuous.
    pub frame_limit: Option<u64>,
    on_frame: Box<dyn Fn(Frame) + Send + Sync>,
}

impl WorkerContext {
    pub fn new(
        cancel: Arc<AtomicBool>,
        exposure_seconds: f64,
        frame_limit: Option<u64>,
        on_frame: impl Fn(Frame) + Send + Sync + 'static,
    ) -> Self {
        Self {
            cancel,
            exposure_seconds,
            frame_limit,
            on_frame: Box::new(on_frame),
        }
    }

    /// Delivers one captured frame to the controller.
    pub fn submit_frame(&self, frame: Frame) {
        (self.on_frame)(frame);
    }

    pub fn should_stop(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

/// Contract a detector driver implements (section 4.4).
pub trait DetectorDriver: Send + Sync {
    fn open(&self) -> AppResult<()>;
    fn close(&self) -> AppResult<()>;
    fn is_connected(&self) -> bool;

    /// `(label, mode_id)` pairs offered in the acquisition-mode selector.
    fn acquisition_modes(&self) -> Vec<(String, String)>;

    /// `None` means the caller should fall back to its own exposure defaults.
    fn exposure_choices(&self) -> Option<Vec<String>>;

    /// 12, 14, or 16; determines the detector's native display range.
    fn sensor_bit_depth(&self) -> u8;

    fn frame_size(&self) -> (usize, usize);

    fn current_gain(&self) -> Option<i64> {
        None
    }

    /// When true, dark/flat capture timeouts are doubled (section 4.5).
    fn uses_dual_shot_for_capture_n(&self) -> bool {
        false
    }

    /// Spawns (or binds) the worker thread that delivers frames through
    /// `ctx` until `ctx.should_stop()` or `ctx.frame_limit` is reached.
    fn start_acquisition(&self, ctx: WorkerContext) -> JoinHandle<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn worker_context_delivers_frames_to_callback() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let ctx = WorkerContext::new(Arc::new(AtomicBool::new(false)), 1.0, Some(2), move |f: Frame| {
            received_clone.lock().unwrap().push(f);
        });
        ctx.submit_frame(Frame::filled(2, 2, 1.0));
        ctx.submit_frame(Frame::filled(2, 2, 2.0));
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[test]
    fn should_stop_reflects_shared_cancel_flag() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext::new(Arc::clone(&cancel), 1.0, None, |_| {});
        assert!(!ctx.should_stop());
        cancel.store(true, Ordering::Release);
        assert!(ctx.should_stop());
    }
}
