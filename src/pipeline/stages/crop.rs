//! Slot 500: crop to a rectangle; `(0,0,0,0)` disables. The only stage that
//! deliberately shrinks frame shape.

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, Default)]
pub struct CropParams {
    pub x_start: usize,
    pub y_start: usize,
    pub x_end: usize,
    pub y_end: usize,
}

pub fn apply(frame: &Frame, params: &CropParams) -> Frame {
    if params.x_end <= params.x_start || params.y_end <= params.y_start {
        return frame.clone();
    }
    let (w, h) = frame.shape();
    let x_start = params.x_start.min(w.saturating_sub(1));
    let x_end = params.x_end.clamp(x_start + 1, w);
    let y_start = params.y_start.min(h.saturating_sub(1));
    let y_end = params.y_end.clamp(y_start + 1, h);

    let out_w = x_end - x_start;
    let out_h = y_end - y_start;
    let mut samples = Vec::with_capacity(out_w * out_h);
    for y in y_start..y_end {
        let row_start = y * w + x_start;
        samples.extend_from_slice(&frame.samples[row_start..row_start + out_w]);
    }
    Frame::new(out_w, out_h, samples)
}
