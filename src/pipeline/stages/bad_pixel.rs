//! Slot 250: bad-pixel replacement — each masked pixel becomes the median of
//! its unmasked 3x3 neighbors (edge-safe); unchanged if no good neighbor
//! exists.

use crate::calibration::BadPixelMask;
use crate::frame::Frame;

pub fn apply(frame: &Frame, mask: Option<&BadPixelMask>) -> Frame {
    let Some(mask) = mask else {
        return frame.clone();
    };
    if mask.width != frame.width || mask.height != frame.height {
        return frame.clone();
    }

    let w = frame.width as isize;
    let h = frame.height as isize;
    let mut samples = frame.samples.clone();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if !mask.bits[idx] {
                continue;
            }
            let mut neighbors = Vec::with_capacity(8);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if !mask.bits[nidx] {
                        neighbors.push(frame.samples[nidx]);
                    }
                }
            }
            if !neighbors.is_empty() {
                samples[idx] = median(&mut neighbors);
            }
        }
    }

    let mut out = Frame::new(frame.width, frame.height, samples);
    out.scrub_nonfinite(0.0);
    out
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
