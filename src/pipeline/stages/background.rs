//! Slot 600: background separator — estimates a white reference from a high
//! percentile band of the frame, then clips near-white pixels to it.

use crate::frame::Frame;

#[derive(Clone, Copy, Debug)]
pub struct BackgroundParams {
    /// Offset subtracted from the estimated white reference to form the
    /// clip threshold; larger offsets clip more pixels.
    pub offset: f32,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self { offset: 0.0 }
    }
}

fn percentile(values: &[f32], pct: f32) -> f32 {
    let mut finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return 0.0;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (finite.len() as f32 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        finite[lo]
    } else {
        finite[lo] + (finite[hi] - finite[lo]) * (rank - lo as f32)
    }
}

/// Estimates the bright, uncovered-sensor level: the mean of samples in a
/// near-white band (98.8th-99.9th percentile) just below the extreme tail,
/// falling back to the mean of the top 0.5% when that band is too thin, and
/// to the frame's finite maximum when there's too little data to estimate
/// robustly at all — hot-pixel resistant by construction.
fn estimate_white_reference(frame: &Frame) -> f32 {
    let finite: Vec<f32> = frame.samples.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return 0.0;
    }
    if finite.len() < 32 {
        return finite.iter().cloned().fold(f32::MIN, f32::max);
    }

    let p_lo = percentile(&finite, 98.8);
    let p_hi = percentile(&finite, 99.9);
    let mut samples: Vec<f32> = finite.iter().copied().filter(|&v| v >= p_lo && v <= p_hi).collect();

    if samples.len() < 32 {
        let p_top = percentile(&finite, 99.5);
        samples = finite.iter().copied().filter(|&v| v >= p_top).collect();
    }
    if samples.is_empty() {
        return finite.iter().cloned().fold(f32::MIN, f32::max);
    }

    samples.iter().sum::<f32>() / samples.len() as f32
}

pub fn apply(frame: &Frame, params: &BackgroundParams) -> Frame {
    let white_ref = estimate_white_reference(frame);
    let threshold = white_ref - params.offset.max(0.0);
    let samples: Vec<f32> = frame
        .samples
        .iter()
        .map(|&v| if v >= threshold { white_ref } else if !v.is_finite() { 0.0 } else { v })
        .collect();
    let mut out = Frame::new(frame.width, frame.height, samples);
    out.scrub_nonfinite(0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_near_white_pixels() {
        let mut samples = vec![10.0f32; 1000];
        for v in samples.iter_mut().skip(990) {
            *v = 900.0;
        }
        let frame = Frame::new(1000, 1, samples);
        let out = apply(&frame, &BackgroundParams::default());
        // the non-background region should be untouched.
        assert!((out.samples[0] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn larger_offset_clips_fewer_pixels() {
        let mut samples = vec![10.0f32; 1000];
        for v in samples.iter_mut().skip(950) {
            *v = 900.0;
        }
        let frame = Frame::new(1000, 1, samples);
        let tight = apply(&frame, &BackgroundParams { offset: 0.0 });
        let loose = apply(&frame, &BackgroundParams { offset: 1000.0 });
        let count = |f: &Frame, v: f32| f.samples.iter().filter(|&&x| (x - v).abs() < 1e-3).count();
        assert!(count(&loose, 900.0) <= count(&tight, 900.0));
    }

    #[test]
    fn white_reference_averages_the_near_white_band_not_just_its_endpoints() {
        // 1000 samples: a flat floor plus a near-white band whose members
        // are not all equal, so a midpoint-of-bounds estimate would differ
        // from the true mean of the in-band samples.
        let mut samples = vec![10.0f32; 900];
        for i in 0..100 {
            samples.push(880.0 + i as f32 * 0.2); // 880.0..=899.8
        }
        let frame = Frame::new(1000, 1, samples.clone());
        let white_ref = estimate_white_reference(&frame);
        let finite: Vec<f32> = samples;
        let mut sorted = finite.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        // the true mean of the actual near-white samples, not the bounds.
        let expected_band: Vec<f32> = sorted.iter().copied().filter(|&v| v > 500.0).collect();
        let expected_mean = expected_band.iter().sum::<f32>() / expected_band.len() as f32;
        assert!((white_ref - expected_mean).abs() < 5.0);
    }

    #[test]
    fn fewer_than_32_finite_samples_falls_back_to_the_max() {
        let frame = Frame::new(5, 1, vec![1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_eq!(estimate_white_reference(&frame), 100.0);
    }
}
