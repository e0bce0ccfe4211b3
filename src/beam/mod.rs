//! Beam Supply: the optional high-voltage interlock an acquisition can
//! require to be on and ready before a detector worker starts (section 4.5).

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Poll cadence for `turn_on_wait_ready`, matching the reference supply
/// driver's handshake loop.
pub const BEAM_READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default overall readiness timeout; the controller may override with a
/// tighter deadline for capture_n calibration flows.
pub const BEAM_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// External interlock capability set (section 3's `BeamSupply` entity).
/// Implementations are held behind `Arc<dyn BeamSupply>`.
pub trait BeamSupply: Send + Sync {
    /// Whether the user has enabled automatic on/off around acquisitions.
    fn wants_auto_toggle(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Turns the beam on and blocks the calling thread until ready, the
    /// deadline passes, or `cancel` is observed set. Polls at
    /// [`BEAM_READY_POLL_INTERVAL`].
    fn turn_on_wait_ready(&self, cancel: &AtomicBool, deadline: Instant) -> bool;

    fn turn_off(&self);
}

/// Blocking readiness loop shared by supply implementations: polls
/// `is_ready`/`has_faulted` at [`BEAM_READY_POLL_INTERVAL`] until one fires,
/// `cancel` is set, or `deadline` passes.
pub fn poll_until_ready(
    cancel: &AtomicBool,
    deadline: Instant,
    mut is_ready: impl FnMut() -> bool,
    mut has_faulted: impl FnMut() -> bool,
) -> bool {
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        if is_ready() {
            return true;
        }
        if has_faulted() {
            return false;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(BEAM_READY_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_until_ready_returns_true_when_ready_flag_flips() {
        let cancel = AtomicBool::new(false);
        let mut ticks = 0;
        let ready = poll_until_ready(
            &cancel,
            Instant::now() + Duration::from_secs(5),
            || {
                ticks += 1;
                ticks >= 2
            },
            || false,
        );
        assert!(ready);
    }

    #[test]
    fn poll_until_ready_returns_false_on_cancel() {
        let cancel = AtomicBool::new(true);
        let ready = poll_until_ready(&cancel, Instant::now() + Duration::from_secs(5), || false, || false);
        assert!(!ready);
    }

    #[test]
    fn poll_until_ready_returns_false_on_fault() {
        let cancel = AtomicBool::new(false);
        let ready = poll_until_ready(&cancel, Instant::now() + Duration::from_secs(5), || false, || true);
        assert!(!ready);
    }
}
