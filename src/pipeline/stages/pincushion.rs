//! Slot 450: pincushion correction — `r_src = r / (1 + k * r_norm^2)`.

use super::distortion::{radial_remap, resolve_center};
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct PincushionParams {
    pub k: f32,
    /// Negative means "use frame center".
    pub cx: f32,
    pub cy: f32,
}

impl Default for PincushionParams {
    fn default() -> Self {
        Self { k: 0.0, cx: -1.0, cy: -1.0 }
    }
}

pub fn apply(frame: &Frame, params: &PincushionParams) -> Frame {
    if params.k.abs() < 1e-9 {
        return frame.clone();
    }
    let (cx, cy) = resolve_center(params.cx, params.cy, frame.width, frame.height);
    let k = params.k;
    let mut out = radial_remap(frame, cx, cy, move |r, r_norm| r / (1.0 + k * r_norm * r_norm));
    out.scrub_nonfinite(0.0);
    out
}
