//! A simulated detector: flat-field level, Gaussian-ish noise, and a slow
//! vignette, honoring the shared cancellation flag and an exposure-derived
//! cadence. Used by the demo CLI and integration tests in place of a real
//! USB/serial driver.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::Rng;

use super::{DetectorDriver, WorkerContext};
use crate::error::AppResult;
use crate::frame::Frame;

/// Cancellation is re-checked at least this often while "exposing", so a
/// `should_stop` set mid-exposure is observed within one polling boundary.
const POLL_SLICE: Duration = Duration::from_millis(20);

pub struct MockDetector {
    width: usize,
    height: usize,
    bit_depth: u8,
    connected: AtomicBool,
    gain: i64,
    dual_shot: bool,
    level: f32,
    noise_amplitude: f32,
    frames_produced: AtomicU32,
}

impl MockDetector {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bit_depth: 16,
            connected: AtomicBool::new(true),
            gain: 100,
            dual_shot: false,
            level: 20000.0,
            noise_amplitude: 25.0,
            frames_produced: AtomicU32::new(0),
        }
    }

    pub fn with_dual_shot(mut self, dual_shot: bool) -> Self {
        self.dual_shot = dual_shot;
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

}

impl DetectorDriver for MockDetector {
    fn open(&self) -> AppResult<()> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> AppResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn acquisition_modes(&self) -> Vec<(String, String)> {
        vec![
            ("Single".to_string(), "single".to_string()),
            ("Continuous".to_string(), "continuous".to_string()),
        ]
    }

    fn exposure_choices(&self) -> Option<Vec<String>> {
        None
    }

    fn sensor_bit_depth(&self) -> u8 {
        self.bit_depth
    }

    fn frame_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn current_gain(&self) -> Option<i64> {
        Some(self.gain)
    }

    fn uses_dual_shot_for_capture_n(&self) -> bool {
        self.dual_shot
    }

    fn start_acquisition(&self, ctx: WorkerContext) -> JoinHandle<()> {
        let width = self.width;
        let height = self.height;
        let noise_amplitude = self.noise_amplitude;
        let level = self.level;
        std::thread::spawn(move || {
            let exposure = Duration::from_secs_f64(ctx.exposure_seconds.max(0.0));
            let mut produced: u64 = 0;
            loop {
                if ctx.should_stop() {
                    return;
                }
                if let Some(limit) = ctx.frame_limit {
                    if produced >= limit {
                        return;
                    }
                }

                let mut elapsed = Duration::ZERO;
                while elapsed < exposure {
                    if ctx.should_stop() {
                        return;
                    }
                    let slice = POLL_SLICE.min(exposure - elapsed);
                    std::thread::sleep(slice);
                    elapsed += slice;
                }

                let frame = synthesize_frame(width, height, level, noise_amplitude);
                ctx.submit_frame(frame);
                produced += 1;
            }
        })
    }
}

fn synthesize_frame(width: usize, height: usize, level: f32, noise_amplitude: f32) -> Frame {
    let mut rng = rand::thread_rng();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let r_max = (cx * cx + cy * cy).sqrt().max(1.0);
    let mut samples = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let r_norm = (dx * dx + dy * dy).sqrt() / r_max;
            let vignette = 1.0 - 0.15 * r_norm * r_norm;
            let noise: f32 = rng.gen_range(-noise_amplitude..noise_amplitude);
            samples.push((level * vignette + noise).max(0.0));
        }
    }
    Frame::new(width, height, samples)
}
