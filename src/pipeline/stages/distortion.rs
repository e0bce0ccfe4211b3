//! Shared radial-resample machinery for slots 450 (pincushion) and 455
//! (mustache): for each output pixel, compute its radius from a configurable
//! center, remap to a source radius, and bilinearly sample the source frame
//! with reflect-at-edge boundary handling.

use crate::frame::Frame;

/// Resolves a possibly-default center: negative values mean "use the frame
/// center", matching the source convention.
pub fn resolve_center(cx: f32, cy: f32, width: usize, height: usize) -> (f32, f32) {
    let cx = if cx < 0.0 { (width as f32 - 1.0) / 2.0 } else { cx };
    let cy = if cy < 0.0 { (height as f32 - 1.0) / 2.0 } else { cy };
    (cx, cy)
}

/// Remaps every output pixel to a source radius via `r_src_fn(r, r_norm)`
/// and bilinearly samples the input frame there (reflect boundary mode).
pub fn radial_remap(frame: &Frame, cx: f32, cy: f32, r_src_fn: impl Fn(f32, f32) -> f32) -> Frame {
    let (w, h) = frame.shape();
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let r_max = (cx.max(w as f32 - 1.0 - cx).powi(2) + cy.max(h as f32 - 1.0 - cy).powi(2))
        .sqrt()
        .max(1e-6);

    let mut samples = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let r = (dx * dx + dy * dy).sqrt();
            if r < 1e-6 {
                samples[y * w + x] = sample_reflect(frame, cx, cy);
                continue;
            }
            let r_norm = r / r_max;
            let r_src = r_src_fn(r, r_norm);
            let scale = r_src / r;
            let src_x = cx + dx * scale;
            let src_y = cy + dy * scale;
            samples[y * w + x] = sample_reflect(frame, src_x, src_y);
        }
    }
    Frame::new(w, h, samples)
}

fn reflect_index(i: isize, len: isize) -> isize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut m = i % period;
    if m < 0 {
        m += period;
    }
    if m >= len {
        period - m
    } else {
        m
    }
}

fn sample_reflect(frame: &Frame, x: f32, y: f32) -> f32 {
    let w = frame.width as isize;
    let h = frame.height as isize;
    let x0 = x.floor() as isize;
    let y0 = y.floor() as isize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |xi: isize, yi: isize| -> f32 {
        let xi = reflect_index(xi, w);
        let yi = reflect_index(yi, h);
        frame.samples[(yi * w + xi) as usize]
    };

    let v00 = at(x0, y0);
    let v10 = at(x0 + 1, y0);
    let v01 = at(x0, y0 + 1);
    let v11 = at(x0 + 1, y0 + 1);

    let top = v00 * (1.0 - fx) + v10 * fx;
    let bottom = v01 * (1.0 - fx) + v11 * fx;
    top * (1.0 - fy) + bottom * fy
}
