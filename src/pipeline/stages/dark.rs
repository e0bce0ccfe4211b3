//! Slot 100: dark subtraction, with the source's "range rescale" heuristic
//! carried over as-is (see design note: do not attempt to improve it).

use crate::frame::Frame;

/// Rescale trigger: if the frame's max exceeds this multiple of the dark's
/// max (or an absolute floor), rescale the frame into the dark's range
/// before subtracting. Numerically fragile by the source's own admission;
/// ported unmodified.
const RESCALE_MAX_RATIO: f32 = 1.5;
const RESCALE_ABS_FLOOR: f32 = 5000.0;

pub fn apply(frame: &Frame, dark: Option<&Frame>) -> Frame {
    let Some(dark) = dark else {
        return frame.clone();
    };
    if !frame.shape_matches(dark) {
        return frame.clone();
    }

    let (f_min, f_max) = frame.finite_min_max().unwrap_or((0.0, 0.0));
    let (d_min, d_max) = dark.finite_min_max().unwrap_or((0.0, 0.0));
    let f_range = f_max - f_min;

    let mut samples = frame.samples.clone();
    if f_range > 1e-6 && (f_max > RESCALE_MAX_RATIO * d_max || f_max > RESCALE_ABS_FLOOR) {
        let scale = (d_max - d_min + 1e-6) / f_range;
        for s in samples.iter_mut() {
            *s = (*s - f_min) * scale + d_min;
        }
    }

    for (s, d) in samples.iter_mut().zip(dark.samples.iter()) {
        *s -= *d;
    }
    let mut out = Frame::new(frame.width, frame.height, samples);
    out.scrub_nonfinite(0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtracts_matching_dark() {
        let frame = Frame::filled(2, 2, 100.0);
        let dark = Frame::filled(2, 2, 10.0);
        let out = apply(&frame, Some(&dark));
        assert!(out.samples.iter().all(|&v| (v - 90.0).abs() < 1e-4));
    }

    #[test]
    fn passes_through_on_shape_mismatch() {
        let frame = Frame::filled(2, 2, 100.0);
        let dark = Frame::filled(3, 3, 10.0);
        let out = apply(&frame, Some(&dark));
        assert_eq!(out, frame);
    }

    #[test]
    fn passes_through_when_no_dark() {
        let frame = Frame::filled(2, 2, 100.0);
        let out = apply(&frame, None);
        assert_eq!(out, frame);
    }

    #[test]
    fn rescales_when_frame_far_above_dark_range() {
        // dark: narrow range around 10; frame: has its own range, but sits
        // at a plateau well above 1.5x dark max and the absolute floor.
        let frame = Frame::new(2, 2, vec![19990.0, 20000.0, 19995.0, 20005.0]);
        let dark = Frame::new(2, 2, vec![9.0, 10.0, 11.0, 10.0]);
        let out = apply(&frame, Some(&dark));
        // after rescale into dark's range then subtraction, result should be
        // small, not ~19990.
        assert!(out.samples.iter().all(|&v| v.abs() < 100.0));
    }
}
