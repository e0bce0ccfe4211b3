//! Frame Store: the single point of truth for frame state under concurrent
//! access (section 4.1). One mutex; all access is a short copy-out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::frame::Frame;

const MIN_CAPACITY: usize = 1;
const MAX_CAPACITY: usize = 32;
const DEFAULT_CAPACITY: usize = 4;

/// Bounded FIFO of processed frames, all sharing one `(width, height)`.
#[derive(Default)]
struct IntegrationBuffer {
    capacity: usize,
    frames: std::collections::VecDeque<Frame>,
}

impl IntegrationBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
            frames: std::collections::VecDeque::new(),
        }
    }

    fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    fn clear(&mut self) {
        self.frames.clear();
    }

    fn integrated(&self) -> Option<Frame> {
        let as_vec: Vec<Frame> = self.frames.iter().cloned().collect();
        Frame::mean(&as_vec)
    }
}

/// A one-shot request to paint a specific frame on the next UI tick,
/// regardless of whether the acquisition is live. See design note
/// "Apply manually button" — this is how a manual pipeline re-run result
/// gets back to the display.
#[derive(Clone, Debug)]
pub struct PendingPreview {
    pub frame: Frame,
    pub histogram_mode: bool,
}

struct Inner {
    raw_frame: Option<Frame>,
    buffer: IntegrationBuffer,
    last_captured_frame: Option<Frame>,
    pending_preview: Option<PendingPreview>,
}

/// Shared frame state. Cheap to clone (wraps an `Arc` internally via
/// `Mutex` + a flag); intended to be held behind an `Arc<FrameStore>`.
pub struct FrameStore {
    inner: Mutex<Inner>,
    new_frame_ready: AtomicBool,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                raw_frame: None,
                buffer: IntegrationBuffer::new(capacity),
                last_captured_frame: None,
                pending_preview: None,
            }),
            new_frame_ready: AtomicBool::new(false),
        }
    }

    /// Unconditionally replaces the raw frame.
    pub fn submit(&self, raw: Frame) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.raw_frame = Some(raw);
    }

    pub fn snapshot_raw(&self) -> Option<Frame> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.raw_frame.clone()
    }

    /// Appends to the integration buffer, evicts the oldest entry beyond
    /// capacity, recomputes the integrated mean, and signals readiness.
    pub fn push_processed(&self, f: Frame) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffer.push(f);
        self.new_frame_ready.store(true, Ordering::Release);
    }

    pub fn snapshot_integrated(&self) -> Option<Frame> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffer.integrated()
    }

    pub fn clear_buffer(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffer.clear();
    }

    /// Clamps to 1..=32; trimming keeps the newest entries.
    pub fn set_integration_capacity(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffer.set_capacity(n);
    }

    pub fn integration_len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.buffer.frames.len()
    }

    /// Queue a frame for the next UI tick to paint, independent of whether
    /// an acquisition is currently live.
    pub fn set_pending_preview(&self, frame: Frame, histogram_mode: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pending_preview = Some(PendingPreview {
            frame,
            histogram_mode,
        });
    }

    /// Takes (consumes) the pending preview, if any.
    pub fn take_pending_preview(&self) -> Option<PendingPreview> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pending_preview.take()
    }

    /// Level-triggered: true since the last `push_processed`, reset by
    /// `drain_new_frame_ready`.
    pub fn drain_new_frame_ready(&self) -> bool {
        self.new_frame_ready.swap(false, Ordering::AcqRel)
    }

    /// Called by the UI tick on the `capturing -> idle` edge: copies the
    /// integrated frame (if any) into `last_captured_frame`.
    pub fn latch_last_captured(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.last_captured_frame = inner.buffer.integrated();
    }

    pub fn take_last_captured(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.last_captured_frame.take()
    }

    pub fn clear_last_captured(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.last_captured_frame = None;
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrates_mean_of_last_n() {
        let store = FrameStore::with_capacity(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            store.push_processed(Frame::filled(2, 2, v));
        }
        let integrated = store.snapshot_integrated().unwrap();
        assert!(integrated.samples.iter().all(|&v| (v - 30.0).abs() < 1e-6));
    }

    #[test]
    fn capacity_shrink_keeps_newest() {
        let store = FrameStore::with_capacity(4);
        for v in [10.0, 20.0, 30.0, 40.0] {
            store.push_processed(Frame::filled(1, 1, v));
        }
        store.set_integration_capacity(2);
        let integrated = store.snapshot_integrated().unwrap();
        assert!((integrated.samples[0] - 35.0).abs() < 1e-6);
    }

    #[test]
    fn clear_buffer_forgets_integrated() {
        let store = FrameStore::new();
        store.push_processed(Frame::filled(1, 1, 5.0));
        assert!(store.snapshot_integrated().is_some());
        store.clear_buffer();
        assert!(store.snapshot_integrated().is_none());
    }

    #[test]
    fn new_frame_ready_is_level_triggered() {
        let store = FrameStore::new();
        assert!(!store.drain_new_frame_ready());
        store.push_processed(Frame::filled(1, 1, 1.0));
        assert!(store.drain_new_frame_ready());
        assert!(!store.drain_new_frame_ready());
    }

    #[test]
    fn latch_last_captured_copies_integrated() {
        let store = FrameStore::new();
        store.push_processed(Frame::filled(1, 1, 7.0));
        store.latch_last_captured();
        let f = store.take_last_captured().unwrap();
        assert!((f.samples[0] - 7.0).abs() < 1e-6);
        assert!(store.take_last_captured().is_none());
    }
}
