//! `Frame`: a single 2-D grid of single-precision samples.
//!
//! Every correction stage and store in this crate passes `Frame` values
//! around; it deliberately carries no provenance (timestamp, exposure, ...)
//! of its own, since that lives in `CalibrationKey` or capture metadata.

use serde::{Deserialize, Serialize};

/// A single-channel, row-major grid of finite `f32` samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub samples: Vec<f32>,
}

impl Frame {
    pub fn new(width: usize, height: usize, samples: Vec<f32>) -> Self {
        assert_eq!(
            samples.len(),
            width * height,
            "sample count must equal width * height"
        );
        Self {
            width,
            height,
            samples,
        }
    }

    /// An all-zero frame of the given dimensions.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            samples: vec![0.0; width * height],
        }
    }

    /// A constant-valued frame, useful for tests and synthetic capture.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            samples: vec![value; width * height],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn shape_matches(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.samples[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.samples[y * self.width + x] = v;
    }

    /// Replace any non-finite sample with `replacement`, in place.
    pub fn scrub_nonfinite(&mut self, replacement: f32) {
        for s in self.samples.iter_mut() {
            if !s.is_finite() {
                *s = replacement;
            }
        }
    }

    /// Finite min/max over the frame; `None` if every sample is non-finite.
    pub fn finite_min_max(&self) -> Option<(f32, f32)> {
        let mut it = self.samples.iter().copied().filter(|v| v.is_finite());
        let first = it.next()?;
        let (mut lo, mut hi) = (first, first);
        for v in it {
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        Some((lo, hi))
    }

    /// Arithmetic mean over a slice of same-shape frames.
    ///
    /// Summation order follows the input slice order, per the determinism
    /// note that integration results are only stable for a fixed frame count
    /// and arrival order.
    pub fn mean(frames: &[Frame]) -> Option<Frame> {
        let first = frames.first()?;
        let (w, h) = first.shape();
        let n = frames.len() as f32;
        let mut acc = vec![0f32; w * h];
        for f in frames {
            debug_assert!(f.shape() == (w, h), "mean() requires identical shapes");
            for (a, s) in acc.iter_mut().zip(f.samples.iter()) {
                *a += *s;
            }
        }
        for a in acc.iter_mut() {
            *a /= n;
        }
        Some(Frame::new(w, h, acc))
    }
}
