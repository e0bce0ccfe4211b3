//! Slot 200: flat correction — `frame / normalize(flat)`, clamped, scrubbed.

use crate::frame::Frame;

const CLIP_MAX: f32 = 1e4;
const DIVISOR_FLOOR: f32 = 1e-10;

pub fn apply(frame: &Frame, flat: Option<&Frame>) -> Frame {
    let Some(flat) = flat else {
        return frame.clone();
    };
    if !frame.shape_matches(flat) {
        return frame.clone();
    }

    let mean = flat.samples.iter().sum::<f32>() / flat.samples.len().max(1) as f32;
    let mean = if mean.is_finite() && mean > 0.0 { mean } else { DIVISOR_FLOOR };

    let mut samples = Vec::with_capacity(frame.samples.len());
    for (&f, &flt) in frame.samples.iter().zip(flat.samples.iter()) {
        let divisor = (flt / mean).max(DIVISOR_FLOOR);
        let v = f / divisor;
        samples.push(v.clamp(0.0, CLIP_MAX));
    }
    let mut out = Frame::new(frame.width, frame.height, samples);
    out.scrub_nonfinite(0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_flat_is_identity_scaled() {
        let frame = Frame::filled(2, 2, 50.0);
        let flat = Frame::filled(2, 2, 2.0);
        let out = apply(&frame, Some(&flat));
        assert!(out.samples.iter().all(|&v| (v - 50.0).abs() < 1e-3));
    }

    #[test]
    fn output_is_clamped_and_finite() {
        let frame = Frame::filled(2, 2, 1e9);
        let flat = Frame::filled(2, 2, 1.0);
        let out = apply(&frame, Some(&flat));
        assert!(out.samples.iter().all(|&v| v <= CLIP_MAX && v.is_finite()));
    }

    #[test]
    fn passes_through_without_flat() {
        let frame = Frame::filled(2, 2, 50.0);
        assert_eq!(apply(&frame, None), frame);
    }

    #[test]
    fn zero_mean_flat_falls_back_to_the_divisor_floor_not_one() {
        let frame = Frame::filled(2, 2, 50.0);
        let flat = Frame::filled(2, 2, 0.0);
        let out = apply(&frame, Some(&flat));
        // mean_flat <= 0 falls back to DIVISOR_FLOOR; divisor = flat/mean_flat = 0/1e-10 = 0,
        // which itself gets floored to DIVISOR_FLOOR, so output saturates at CLIP_MAX.
        assert!(out.samples.iter().all(|&v| (v - CLIP_MAX).abs() < 1e-3));
    }

    #[test]
    fn negative_mean_flat_is_treated_as_degenerate() {
        let frame = Frame::filled(2, 2, 50.0);
        let flat = Frame::filled(2, 2, -3.0);
        let out = apply(&frame, Some(&flat));
        assert!(out.samples.iter().all(|&v| v.is_finite() && v <= CLIP_MAX));
    }
}
