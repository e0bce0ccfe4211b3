//! Slot 480: local contrast / dehaze / deconvolution — optional fixed-
//! iteration Richardson-Lucy deconvolution against a Gaussian PSF, followed
//! by a midtone-weighted clarity (local contrast) pass and a soft dehaze
//! curve. Ported from the original's clarity/dehaze module; deconvolution
//! always runs in-process here (no optional dependency to gate it on).

use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct EnhanceParams {
    pub deconv_enabled: bool,
    pub deconv_sigma: f32,
    pub deconv_iterations: u32,
    /// -300..300 on the UI slider scale; divided by 100 internally.
    pub clarity: f32,
    /// 0..100 on the UI slider scale; divided by 100 internally.
    pub dehaze: f32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            deconv_enabled: false,
            deconv_sigma: 1.0,
            deconv_iterations: 10,
            clarity: 0.0,
            dehaze: 0.0,
        }
    }
}

pub fn apply(frame: &Frame, params: &EnhanceParams) -> Frame {
    let mut out = frame.clone();
    if params.deconv_enabled {
        out = deconvolve_richardson_lucy(&out, params.deconv_sigma, params.deconv_iterations);
    }
    if params.clarity.abs() > 1e-6 || params.dehaze > 0.0 {
        out = enhance(&out, params.clarity, params.dehaze);
    }
    out.scrub_nonfinite(0.0);
    out
}

fn gaussian_psf(sigma: f32) -> (Vec<f32>, usize) {
    let size = (((sigma * 6.0).round() as usize) | 1).max(3);
    let half = (size as f32 - 1.0) / 2.0;
    let mut psf = vec![0f32; size * size];
    let mut sum = 0f32;
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - half;
            let dy = y as f32 - half;
            let v = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            psf[y * size + x] = v;
            sum += v;
        }
    }
    if sum > 0.0 {
        for v in psf.iter_mut() {
            *v /= sum;
        }
    }
    (psf, size)
}

/// Same-size convolution with reflect-at-edge boundary handling.
fn convolve_same(data: &[f32], w: usize, h: usize, kernel: &[f32], ksize: usize) -> Vec<f32> {
    let half = (ksize / 2) as isize;
    let wi = w as isize;
    let hi = h as isize;
    let mut out = vec![0f32; w * h];
    for y in 0..hi {
        for x in 0..wi {
            let mut acc = 0f32;
            for ky in 0..ksize as isize {
                for kx in 0..ksize as isize {
                    let sy = reflect(y + ky - half, hi);
                    let sx = reflect(x + kx - half, wi);
                    acc += data[(sy * wi + sx) as usize] * kernel[(ky * ksize as isize + kx) as usize];
                }
            }
            out[(y * wi + x) as usize] = acc;
        }
    }
    out
}

fn reflect(i: isize, len: isize) -> isize {
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

fn deconvolve_richardson_lucy(frame: &Frame, sigma: f32, iterations: u32) -> Frame {
    let (w, h) = frame.shape();
    let Some((lo, hi)) = frame.finite_min_max() else {
        return frame.clone();
    };
    if hi <= lo {
        return frame.clone();
    }
    let scale = hi - lo;
    let img_norm: Vec<f32> = frame.samples.iter().map(|&v| (v - lo) / scale).collect();
    let (psf, ksize) = gaussian_psf(sigma.max(0.1));

    let mut latent = img_norm.clone();
    for _ in 0..iterations {
        let conv = convolve_same(&latent, w, h, &psf, ksize);
        let relative: Vec<f32> = img_norm
            .iter()
            .zip(conv.iter())
            .map(|(&i, &c)| if c.abs() > 1e-6 { i / c } else { 0.0 })
            .collect();
        let correction = convolve_same(&relative, w, h, &psf, ksize);
        for (l, c) in latent.iter_mut().zip(correction.iter()) {
            *l *= c;
        }
    }

    let samples: Vec<f32> = latent
        .iter()
        .map(|&v| (v * scale + lo).clamp(lo, hi))
        .collect();
    Frame::new(w, h, samples)
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

fn enhance(frame: &Frame, clarity_amount: f32, dehaze_amount: f32) -> Frame {
    let (w, h) = frame.shape();
    let lo = percentile(&frame.samples, 0.5);
    let hi = percentile(&frame.samples, 99.5);
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return frame.clone();
    }

    let mut norm: Vec<f32> = frame.samples.iter().map(|&v| ((v - lo) / (hi - lo)).clamp(0.0, 1.0)).collect();

    let clarity = (clarity_amount / 100.0).clamp(-3.0, 3.0);
    let dehaze = (dehaze_amount / 100.0).clamp(0.0, 1.0);

    if dehaze > 0.0 {
        let air = percentile(&norm, 99.7).max(1e-3);
        let strength = dehaze.powf(1.35) * 0.45;
        let mut dehazed = vec![0f32; norm.len()];
        for (i, &n) in norm.iter().enumerate() {
            let base = (n / air).clamp(0.0, 1.0);
            let t = (1.0 - strength * (1.0 - base)).clamp(0.60, 1.0);
            dehazed[i] = ((base - (1.0 - t)) / t).clamp(0.0, 1.0);
        }
        for (n, d) in norm.iter_mut().zip(dehazed.iter()) {
            *n = (1.0 - strength) * *n + strength * *d;
        }
    }

    if clarity.abs() > 1e-6 {
        let (psf_small, ks_small) = gaussian_psf(1.2);
        let (psf_large, ks_large) = gaussian_psf(3.2);
        let blur_small = convolve_same(&norm, w, h, &psf_small, ks_small);
        let blur_large = convolve_same(&norm, w, h, &psf_large, ks_large);

        for i in 0..norm.len() {
            let detail_fine = norm[i] - blur_small[i];
            let detail_mid = blur_small[i] - blur_large[i];
            let detail = 0.35 * detail_fine + 0.90 * detail_mid;
            let midtone = (-((norm[i] - 0.5).powi(2)) / (2.0 * 0.23 * 0.23)).exp();
            let edge_strength = (detail_mid.abs() * 10.0).clamp(0.0, 1.0);
            let halo_guard = 1.0 - 0.45 * edge_strength;
            let delta = (clarity * 2.6 * detail * midtone * halo_guard).clamp(-0.45, 0.45);
            norm[i] = (norm[i] + delta).clamp(0.0, 1.0);
        }
    }

    let samples: Vec<f32> = norm.iter().map(|&n| n * (hi - lo) + lo).collect();
    let mut out = Frame::new(w, h, samples);
    out.scrub_nonfinite(0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_params_are_identity() {
        let frame = Frame::new(6, 6, (0..36).map(|v| v as f32).collect());
        let out = apply(&frame, &EnhanceParams::default());
        assert_eq!(out, frame);
    }

    #[test]
    fn dehaze_changes_frame() {
        let frame = Frame::new(6, 6, (0..36).map(|v| v as f32).collect());
        let params = EnhanceParams {
            dehaze: 50.0,
            ..EnhanceParams::default()
        };
        let out = apply(&frame, &params);
        assert_ne!(out.samples, frame.samples);
        assert_eq!(out.shape(), frame.shape());
    }

    #[test]
    fn deconvolution_preserves_shape_and_range() {
        let frame = Frame::new(10, 10, (0..100).map(|v| v as f32).collect());
        let params = EnhanceParams {
            deconv_enabled: true,
            deconv_sigma: 1.0,
            deconv_iterations: 3,
            ..EnhanceParams::default()
        };
        let out = apply(&frame, &params);
        assert_eq!(out.shape(), frame.shape());
        let (lo, hi) = frame.finite_min_max().unwrap();
        assert!(out.samples.iter().all(|&v| v >= lo - 1e-3 && v <= hi + 1e-3));
    }
}
