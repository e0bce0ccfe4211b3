//! Acquisition Controller (section 4.5): the `idle ⇄ capturing` state
//! machine, the beam-supply handshake, and the synchronous `request_*`
//! entry points workflow threads block on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::beam::{BeamSupply, BEAM_READY_TIMEOUT};
use crate::calibration::BadPixelMask;
use crate::detector::{DetectorDriver, WorkerContext};
use crate::frame::Frame;
use crate::frame_store::FrameStore;
use crate::pipeline::{Pipeline, PipelineContext};

/// Readout/warm-up slack folded into dark/flat capture timeouts, per frame.
const READOUT_MARGIN_SECONDS: f64 = 5.0;
const MIN_INTEGRATION_N: usize = 1;
const MAX_INTEGRATION_N: usize = 32;
const LAST_CAPTURED_WAIT: Duration = Duration::from_secs(3);
const STOP_SETTLE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The `capturing` submode; calibration capture reuses the same machinery as
/// live acquisition but runs the pipeline in prefix-only mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionMode {
    Single,
    Dual,
    Continuous,
    CaptureN,
    DarkCapture,
    FlatCapture,
}

/// Stable, payload-free failure taxonomy a workflow caller switches on
/// (section 7; invariant 7's required set).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailReason {
    Timeout,
    Stopped,
    NoFrame,
    NotConnected,
    NotIdle,
    SupplyNotConnected,
    SupplyNotReady,
}

impl FailReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailReason::Timeout => "timeout",
            FailReason::Stopped => "stopped",
            FailReason::NoFrame => "no_frame",
            FailReason::NotConnected => "not_connected",
            FailReason::NotIdle => "not_idle",
            FailReason::SupplyNotConnected => "supply_not_connected",
            FailReason::SupplyNotReady => "supply_not_ready",
        }
    }
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    /// Claimed by a caller that passed the `NotIdle` check but hasn't yet
    /// finished the beam handshake / worker spawn; blocks concurrent
    /// `start`/`request_n_frames_processed_up_to_slot` calls from also
    /// passing that check before the transition to `Capturing` completes.
    Starting,
    Capturing(AcquisitionMode),
}

struct ControllerState {
    mode: Mode,
    worker: Option<JoinHandle<()>>,
    keep_beam_on: bool,
    last_fail_reason: Option<FailReason>,
}

/// Orchestrates the detector worker and (optional) beam supply around the
/// Correction Pipeline, exposing the blocking `request_*` calls workflow
/// scripts use.
pub struct AcquisitionController {
    frame_store: Arc<FrameStore>,
    pipeline: Arc<Pipeline>,
    detector: Arc<dyn DetectorDriver>,
    beam: Option<Arc<dyn BeamSupply>>,
    dark: Mutex<Option<Frame>>,
    flat: Mutex<Option<Frame>>,
    bad_pixel_mask: Mutex<Option<BadPixelMask>>,
    state: Mutex<ControllerState>,
    cancel: Arc<AtomicBool>,
    stop_requested: AtomicBool,
    /// Tracks whether the beam is believed on from a prior `keep_beam_on`
    /// session, so a workflow's repeated `request_integration` calls only
    /// pay the handshake once (scenario S6).
    beam_on: AtomicBool,
}

impl AcquisitionController {
    pub fn new(
        frame_store: Arc<FrameStore>,
        pipeline: Arc<Pipeline>,
        detector: Arc<dyn DetectorDriver>,
        beam: Option<Arc<dyn BeamSupply>>,
    ) -> Self {
        Self {
            frame_store,
            pipeline,
            detector,
            beam,
            dark: Mutex::new(None),
            flat: Mutex::new(None),
            bad_pixel_mask: Mutex::new(None),
            state: Mutex::new(ControllerState {
                mode: Mode::Idle,
                worker: None,
                keep_beam_on: false,
                last_fail_reason: None,
            }),
            cancel: Arc::new(AtomicBool::new(false)),
            stop_requested: AtomicBool::new(false),
            beam_on: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.lock_state().mode, Mode::Idle)
    }

    pub fn last_fail_reason(&self) -> Option<FailReason> {
        self.lock_state().last_fail_reason
    }

    pub fn set_dark(&self, frame: Option<Frame>) {
        *self.dark.lock().unwrap_or_else(|p| p.into_inner()) = frame;
    }

    pub fn set_flat(&self, frame: Option<Frame>) {
        *self.flat.lock().unwrap_or_else(|p| p.into_inner()) = frame;
    }

    pub fn set_bad_pixel_mask(&self, mask: Option<BadPixelMask>) {
        *self.bad_pixel_mask.lock().unwrap_or_else(|p| p.into_inner()) = mask;
    }

    /// Sets the shared cancellation flag; does not itself block.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.cancel.store(true, Ordering::Release);
    }

    /// Non-blocking poll, meant to be called from a UI-style render tick:
    /// if the worker has exited, performs the `capturing -> idle` transition
    /// (latches the integrated frame, turns the beam off unless told to
    /// keep it on).
    pub fn tick(&self) {
        let finished = {
            let state = self.lock_state();
            matches!(state.mode, Mode::Capturing(_)) && state.worker.as_ref().is_some_and(|h| h.is_finished())
        };
        if !finished {
            return;
        }
        self.frame_store.latch_last_captured();
        let keep_beam_on = {
            let mut state = self.lock_state();
            if let Some(handle) = state.worker.take() {
                let _ = handle.join();
            }
            state.mode = Mode::Idle;
            state.keep_beam_on
        };
        if !keep_beam_on {
            if let Some(beam) = &self.beam {
                beam.turn_off();
            }
            self.beam_on.store(false, Ordering::Release);
        }
    }

    fn clamp_n(n: usize) -> usize {
        n.clamp(MIN_INTEGRATION_N, MAX_INTEGRATION_N)
    }

    fn references(&self) -> (Option<Frame>, Option<Frame>, Option<BadPixelMask>) {
        (
            self.dark.lock().unwrap_or_else(|p| p.into_inner()).clone(),
            self.flat.lock().unwrap_or_else(|p| p.into_inner()).clone(),
            self.bad_pixel_mask.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        )
    }

    /// Beam-supply handshake (section 4.5). Returns `Ok(())` if acquisition
    /// may proceed, or the reason it may not. A no-op if the beam is already
    /// believed on from a prior `keep_beam_on` session.
    fn handshake_beam(&self) -> Result<(), FailReason> {
        let Some(beam) = &self.beam else {
            return Ok(());
        };
        if !beam.wants_auto_toggle() {
            return Ok(());
        }
        if self.beam_on.load(Ordering::Acquire) {
            return Ok(());
        }
        if !beam.is_connected() {
            return Err(FailReason::SupplyNotConnected);
        }
        let deadline = Instant::now() + BEAM_READY_TIMEOUT;
        let ready = beam.turn_on_wait_ready(&self.cancel, deadline);
        if self.cancel.load(Ordering::Acquire) {
            beam.turn_off();
            return Err(FailReason::Stopped);
        }
        if !ready {
            beam.turn_off();
            return Err(FailReason::SupplyNotReady);
        }
        self.beam_on.store(true, Ordering::Release);
        Ok(())
    }

    /// Starts a live acquisition in `mode`, running the pipeline in full on
    /// each incoming frame. `frame_limit` is `Some(n)` for `capture_n`.
    pub fn start(
        &self,
        mode: AcquisitionMode,
        exposure_seconds: f64,
        frame_limit: Option<u64>,
        keep_beam_on: bool,
    ) -> Result<(), FailReason> {
        {
            let mut state = self.lock_state();
            if state.mode != Mode::Idle {
                return Err(FailReason::NotIdle);
            }
            state.mode = Mode::Starting;
        }
        if !self.detector.is_connected() {
            self.lock_state().mode = Mode::Idle;
            return Err(FailReason::NotConnected);
        }

        self.stop_requested.store(false, Ordering::Release);
        self.cancel.store(false, Ordering::Release);
        if let Err(reason) = self.handshake_beam() {
            self.lock_state().mode = Mode::Idle;
            return Err(reason);
        }

        self.frame_store.clear_buffer();
        let (dark, flat, mask) = self.references();
        let pipeline = Arc::clone(&self.pipeline);
        let frame_store = Arc::clone(&self.frame_store);
        let ctx = WorkerContext::new(Arc::clone(&self.cancel), exposure_seconds, frame_limit, move |raw: Frame| {
            let pctx = PipelineContext { dark: dark.as_ref(), flat: flat.as_ref(), bad_pixel_mask: mask.as_ref() };
            let result = pipeline.push_frame(raw, &pctx);
            frame_store.push_processed(result.output);
        });
        let handle = self.detector.start_acquisition(ctx);

        let mut state = self.lock_state();
        state.mode = Mode::Capturing(mode);
        state.worker = Some(handle);
        state.keep_beam_on = keep_beam_on;
        state.last_fail_reason = None;
        Ok(())
    }

    /// Blocks the calling thread until `self.is_idle()` or `deadline`
    /// passes, calling `tick()` to drive the transition. Returns `true` if
    /// idle was reached, and whether it was via an explicit `stop()` call.
    fn wait_for_idle(&self, deadline: Instant) -> (bool, bool) {
        loop {
            self.tick();
            if self.is_idle() {
                return (true, self.stop_requested.load(Ordering::Acquire));
            }
            if self.stop_requested.load(Ordering::Acquire) {
                let settle_deadline = Instant::now() + STOP_SETTLE_TIMEOUT;
                while !self.is_idle() && Instant::now() < settle_deadline {
                    self.tick();
                    std::thread::sleep(POLL_INTERVAL);
                }
                return (self.is_idle(), true);
            }
            if Instant::now() >= deadline {
                return (false, false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn record_fail_reason(&self, reason: FailReason) {
        self.lock_state().last_fail_reason = Some(reason);
    }

    /// The synchronous call workflow automation uses: starts a `capture_n`
    /// acquisition of `n` frames, waits for it to finish, and returns the
    /// integrated frame (section 4.5 algorithm).
    pub fn request_integration(&self, n: usize, exposure_seconds: f64, timeout: Duration, keep_beam_on: bool) -> (Option<Frame>, Option<FailReason>) {
        let n = Self::clamp_n(n);
        self.frame_store.set_integration_capacity(n);
        self.frame_store.clear_buffer();
        self.frame_store.clear_last_captured();

        if let Err(reason) = self.start(AcquisitionMode::CaptureN, exposure_seconds, Some(n as u64), keep_beam_on) {
            self.record_fail_reason(reason);
            return (None, Some(reason));
        }

        let deadline = Instant::now() + timeout;
        let (reached_idle, stopped) = self.wait_for_idle(deadline);
        if stopped {
            self.record_fail_reason(FailReason::Stopped);
            return (None, Some(FailReason::Stopped));
        }
        if !reached_idle {
            self.cancel.store(true, Ordering::Release);
            let settle_deadline = Instant::now() + STOP_SETTLE_TIMEOUT;
            while !self.is_idle() && Instant::now() < settle_deadline {
                self.tick();
                std::thread::sleep(POLL_INTERVAL);
            }
            self.record_fail_reason(FailReason::Timeout);
            return (None, Some(FailReason::Timeout));
        }

        let wait_deadline = Instant::now() + LAST_CAPTURED_WAIT;
        loop {
            if let Some(frame) = self.frame_store.take_last_captured() {
                return (Some(frame), None);
            }
            if Instant::now() >= wait_deadline {
                self.record_fail_reason(FailReason::NoFrame);
                return (None, Some(FailReason::NoFrame));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn calibration_timeout(&self, n: usize, exposure_seconds: f64) -> Duration {
        let mut seconds = n as f64 * (exposure_seconds + READOUT_MARGIN_SECONDS);
        if self.detector.uses_dual_shot_for_capture_n() {
            seconds *= 2.0;
        }
        Duration::from_secs_f64(seconds)
    }

    /// Dark (`max_slot = 100`) or flat (`max_slot = 200`) reference capture:
    /// runs the pipeline in prefix-only mode and averages `n` results.
    pub fn request_n_frames_processed_up_to_slot(&self, n: usize, max_slot: i32, exposure_seconds: f64, dark_capture: bool) -> (Option<Frame>, Option<FailReason>) {
        let n = Self::clamp_n(n);
        let timeout = self.calibration_timeout(n, exposure_seconds);

        {
            let mut state = self.lock_state();
            if state.mode != Mode::Idle {
                return (None, Some(FailReason::NotIdle));
            }
            state.mode = Mode::Starting;
        }
        if !self.detector.is_connected() {
            self.lock_state().mode = Mode::Idle;
            return (None, Some(FailReason::NotConnected));
        }
        self.stop_requested.store(false, Ordering::Release);
        self.cancel.store(false, Ordering::Release);

        let accumulated: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
        let (dark, flat, mask) = self.references();
        let pipeline = Arc::clone(&self.pipeline);
        let acc = Arc::clone(&accumulated);
        let ctx = WorkerContext::new(Arc::clone(&self.cancel), exposure_seconds, Some(n as u64), move |raw: Frame| {
            let pctx = PipelineContext { dark: dark.as_ref(), flat: flat.as_ref(), bad_pixel_mask: mask.as_ref() };
            let (_, prefixed) = pipeline.run_prefix(raw, max_slot, &pctx);
            acc.lock().unwrap_or_else(|p| p.into_inner()).push(prefixed);
        });
        let handle = self.detector.start_acquisition(ctx);

        let mode = if dark_capture { AcquisitionMode::DarkCapture } else { AcquisitionMode::FlatCapture };
        {
            let mut state = self.lock_state();
            state.mode = Mode::Capturing(mode);
            state.worker = Some(handle);
            state.keep_beam_on = true;
            state.last_fail_reason = None;
        }

        let deadline = Instant::now() + timeout;
        let (reached_idle, stopped) = self.wait_for_idle(deadline);
        if stopped {
            self.record_fail_reason(FailReason::Stopped);
            return (None, Some(FailReason::Stopped));
        }
        if !reached_idle {
            self.cancel.store(true, Ordering::Release);
            let settle_deadline = Instant::now() + STOP_SETTLE_TIMEOUT;
            while !self.is_idle() && Instant::now() < settle_deadline {
                self.tick();
                std::thread::sleep(POLL_INTERVAL);
            }
            self.record_fail_reason(FailReason::Timeout);
            return (None, Some(FailReason::Timeout));
        }

        let frames = accumulated.lock().unwrap_or_else(|p| p.into_inner()).clone();
        match Frame::mean(&frames) {
            Some(frame) => (Some(frame), None),
            None => {
                self.record_fail_reason(FailReason::NoFrame);
                (None, Some(FailReason::NoFrame))
            }
        }
    }
}
