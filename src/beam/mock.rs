//! Mock beam supplies for tests and the demo CLI: one that becomes ready
//! promptly, and one that never does (scenario S5: cancel during beam wait).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use super::{poll_until_ready, BeamSupply};

/// Becomes ready after a short simulated warm-up; tracks on/off call counts
/// so tests can assert the handshake happened exactly once (scenario S6).
pub struct MockBeamSupply {
    auto_toggle: bool,
    connected: AtomicBool,
    ready_after_polls: u32,
    turn_on_calls: AtomicU32,
    turn_off_calls: AtomicU32,
    poll_count: AtomicU32,
}

impl MockBeamSupply {
    pub fn new(auto_toggle: bool) -> Self {
        Self {
            auto_toggle,
            connected: AtomicBool::new(true),
            ready_after_polls: 1,
            turn_on_calls: AtomicU32::new(0),
            turn_off_calls: AtomicU32::new(0),
            poll_count: AtomicU32::new(0),
        }
    }

    /// A beam supply that never reports ready, for scenario S5.
    pub fn never_ready() -> Self {
        Self {
            auto_toggle: true,
            connected: AtomicBool::new(true),
            ready_after_polls: u32::MAX,
            turn_on_calls: AtomicU32::new(0),
            turn_off_calls: AtomicU32::new(0),
            poll_count: AtomicU32::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn turn_on_count(&self) -> u32 {
        self.turn_on_calls.load(Ordering::Acquire)
    }

    pub fn turn_off_count(&self) -> u32 {
        self.turn_off_calls.load(Ordering::Acquire)
    }
}

impl BeamSupply for MockBeamSupply {
    fn wants_auto_toggle(&self) -> bool {
        self.auto_toggle
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn turn_on_wait_ready(&self, cancel: &AtomicBool, deadline: Instant) -> bool {
        self.turn_on_calls.fetch_add(1, Ordering::AcqRel);
        self.poll_count.store(0, Ordering::Release);
        poll_until_ready(
            cancel,
            deadline,
            || self.poll_count.fetch_add(1, Ordering::AcqRel) + 1 >= self.ready_after_polls,
            || false,
        )
    }

    fn turn_off(&self) {
        self.turn_off_calls.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn mock_becomes_ready_quickly() {
        let beam = MockBeamSupply::new(true);
        let cancel = AtomicBool::new(false);
        let ready = beam.turn_on_wait_ready(&cancel, Instant::now() + Duration::from_secs(2));
        assert!(ready);
        assert_eq!(beam.turn_on_count(), 1);
    }

    #[test]
    fn never_ready_times_out() {
        let beam = MockBeamSupply::never_ready();
        let cancel = AtomicBool::new(false);
        let ready = beam.turn_on_wait_ready(&cancel, Instant::now() + Duration::from_millis(50));
        assert!(!ready);
    }
}
