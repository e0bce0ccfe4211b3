//! Slot 455: mustache correction — `r_src = r / (1 + k1*r_norm^2 + k2*r_norm^4)`.

use super::distortion::{radial_remap, resolve_center};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct MustacheParams {
    pub k1: f32,
    pub k2: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Default for MustacheParams {
    fn default() -> Self {
        Self { k1: 0.0, k2: 0.0, cx: -1.0, cy: -1.0 }
    }
}

pub fn apply(frame: &Frame, params: &MustacheParams) -> Frame {
    if params.k1.abs() < 1e-9 && params.k2.abs() < 1e-9 {
        return frame.clone();
    }
    let (cx, cy) = resolve_center(params.cx, params.cy, frame.width, frame.height);
    let (k1, k2) = (params.k1, params.k2);
    let mut out = radial_remap(frame, cx, cy, move |r, r_norm| {
        let r2 = r_norm * r_norm;
        r / (1.0 + k1 * r2 + k2 * r2 * r2)
    });
    out.scrub_nonfinite(0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coefficients_is_identity() {
        let frame = Frame::new(4, 4, (0..16).map(|v| v as f32).collect());
        let out = apply(&frame, &MustacheParams::default());
        assert_eq!(out, frame);
    }

    #[test]
    fn nonzero_coefficients_change_frame() {
        let frame = Frame::new(8, 8, (0..64).map(|v| v as f32).collect());
        let params = MustacheParams { k1: 0.2, k2: 0.05, cx: -1.0, cy: -1.0 };
        let out = apply(&frame, &params);
        assert_ne!(out.samples, frame.samples);
    }

    #[test]
    fn off_center_remap_differs_from_default_center() {
        let frame = Frame::new(8, 8, (0..64).map(|v| v as f32).collect());
        let default_center = apply(&frame, &MustacheParams { k1: 0.2, k2: 0.05, cx: -1.0, cy: -1.0 });
        let off_center = apply(&frame, &MustacheParams { k1: 0.2, k2: 0.05, cx: 1.0, cy: 1.0 });
        assert_ne!(default_center.samples, off_center.samples);
    }
}
