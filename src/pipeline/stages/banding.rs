//! Slot 300: banding correction — separates a slow per-row/column background
//! from a fast banding component using a reference stripe, subtracting only
//! the fast component.

use crate::frame::Frame;

/// Matches the original's `DEFAULT_BLACK_W`/`DEFAULT_VERTICAL_STRIPE_H`.
const DEFAULT_STRIPE_WIDTH: usize = 20;
/// Matches the original's `DEFAULT_SMOOTH_WIN`/`DEFAULT_VERTICAL_SMOOTH_WIN`.
const DEFAULT_SMOOTH_WINDOW: usize = 128;

#[derive(Clone, Debug)]
pub struct BandingParams {
    pub horizontal: bool,
    pub vertical: bool,
    /// Number of trailing columns/rows used to build the reference stripe.
    pub stripe_width: usize,
    pub auto_window: bool,
    pub manual_window: usize,
}

impl Default for BandingParams {
    fn default() -> Self {
        Self {
            horizontal: true,
            vertical: false,
            stripe_width: DEFAULT_STRIPE_WIDTH,
            auto_window: true,
            manual_window: DEFAULT_SMOOTH_WINDOW,
        }
    }
}

pub fn apply(frame: &Frame, params: &BandingParams) -> Frame {
    let mut out = frame.clone();
    if params.horizontal {
        out = correct_horizontal(&out, params);
    }
    if params.vertical {
        out = correct_vertical(&out, params);
    }
    out.scrub_nonfinite(0.0);
    out
}

fn correct_horizontal(frame: &Frame, params: &BandingParams) -> Frame {
    let (w, h) = frame.shape();
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let stripe_w = params.stripe_width.min(w).max(1);
    // Raw reference rows, kept around (not just their per-row medians) so
    // the auto-window scorer can re-derive a corrected per-row median
    // exactly as the source does.
    let raw_rows: Vec<Vec<f32>> = (0..h)
        .map(|y| {
            let row_start = (y * w) + (w - stripe_w);
            frame.samples[row_start..row_start + stripe_w].to_vec()
        })
        .collect();
    let ref_vals: Vec<f32> = raw_rows.iter().map(|row| median_of(row)).collect();

    let window = select_window(&raw_rows, &ref_vals, params);
    let background = moving_average(&ref_vals, window);
    let band: Vec<f32> = ref_vals.iter().zip(background.iter()).map(|(s, b)| s - b).collect();

    let mut samples = frame.samples.clone();
    for y in 0..h {
        let offset = band[y];
        for x in 0..w {
            samples[y * w + x] -= offset;
        }
    }
    Frame::new(w, h, samples)
}

fn correct_vertical(frame: &Frame, params: &BandingParams) -> Frame {
    let (w, h) = frame.shape();
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let stripe_h = params.stripe_width.min(h).max(1);
    let raw_cols: Vec<Vec<f32>> = (0..w)
        .map(|x| {
            let mut col = Vec::with_capacity(stripe_h);
            for y in (h - stripe_h)..h {
                col.push(frame.samples[y * w + x]);
            }
            col
        })
        .collect();
    let ref_vals: Vec<f32> = raw_cols.iter().map(|col| median_of(col)).collect();

    let window = select_window(&raw_cols, &ref_vals, params);
    let background = moving_average(&ref_vals, window);
    let band: Vec<f32> = ref_vals.iter().zip(background.iter()).map(|(s, b)| s - b).collect();

    let mut samples = frame.samples.clone();
    for x in 0..w {
        let offset = band[x];
        for y in 0..h {
            samples[y * w + x] -= offset;
        }
    }
    Frame::new(w, h, samples)
}

/// Candidate windows the original tests: `range(10, min(512, len/4)+1, 5)`,
/// falling back to a fixed small set when that range is empty.
fn auto_window_candidates(ref_len: usize) -> Vec<usize> {
    let max_win = 512.min(ref_len / 4);
    if max_win < 10 {
        return vec![10, 32, 64, 128, 256];
    }
    (10..=max_win).step_by(5).collect()
}

fn select_window(raw_stripe: &[Vec<f32>], ref_vals: &[f32], params: &BandingParams) -> usize {
    if !params.auto_window {
        return params.manual_window.max(1);
    }
    auto_window_candidates(ref_vals.len())
        .into_iter()
        .min_by(|&a, &b| {
            let sa = score_window(raw_stripe, ref_vals, a);
            let sb = score_window(raw_stripe, ref_vals, b);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(params.manual_window.max(1))
}

/// Re-applies the band correction to the raw stripe and measures the std of
/// the resulting per-row (or per-column) median — the original's
/// "uniformity of the corrected reference" quality metric, lower is better.
fn score_window(raw_stripe: &[Vec<f32>], ref_vals: &[f32], window: usize) -> f32 {
    let background = moving_average(ref_vals, window);
    let band: Vec<f32> = ref_vals.iter().zip(background.iter()).map(|(r, b)| r - b).collect();
    let corrected_ref: Vec<f32> = raw_stripe
        .iter()
        .zip(band.iter())
        .map(|(row, &offset)| {
            let shifted: Vec<f32> = row.iter().map(|v| v - offset).collect();
            median_of(&shifted)
        })
        .collect();
    std_dev(&corrected_ref)
}

fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    var.sqrt()
}

/// Edge-padded moving average (reflects the source's `moving_average_1d`);
/// windows under 3 are a no-op, matching the original's early return.
fn moving_average(x: &[f32], window: usize) -> Vec<f32> {
    if x.is_empty() {
        return Vec::new();
    }
    if window < 3 {
        return x.to_vec();
    }
    let half = window / 2;
    let n = x.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for off in -(half as isize)..=(half as isize) {
            let idx = i as isize + off;
            let clamped = idx.clamp(0, n as isize - 1) as usize;
            sum += x[clamped];
            count += 1;
        }
        out.push(sum / count as f32);
    }
    out
}

fn median_of(values: &[f32]) -> f32 {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = v.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_frame_is_unaffected() {
        let frame = Frame::filled(20, 10, 42.0);
        let params = BandingParams::default();
        let out = apply(&frame, &params);
        assert!(out.samples.iter().all(|&v| (v - 42.0).abs() < 1e-2));
    }

    #[test]
    fn removes_constant_row_offset() {
        let w = 20;
        let h = 10;
        let mut samples = vec![0.0f32; w * h];
        for y in 0..h {
            let offset = if y % 2 == 0 { 50.0 } else { 0.0 };
            for x in 0..w {
                samples[y * w + x] = 100.0 + offset;
            }
        }
        let frame = Frame::new(w, h, samples);
        let params = BandingParams {
            horizontal: true,
            vertical: false,
            stripe_width: 8,
            auto_window: false,
            manual_window: 3,
        };
        let out = apply(&frame, &params);
        // banding should shrink the row-to-row spread substantially.
        let row_means: Vec<f32> = (0..h)
            .map(|y| out.samples[y * w..y * w + w].iter().sum::<f32>() / w as f32)
            .collect();
        let spread = row_means.iter().cloned().fold(f32::MIN, f32::max)
            - row_means.iter().cloned().fold(f32::MAX, f32::min);
        assert!(spread < 50.0);
    }

    #[test]
    fn auto_window_picks_a_candidate_and_reduces_row_to_row_spread() {
        let w = 64;
        let h = 64;
        let mut samples = vec![0.0f32; w * h];
        for y in 0..h {
            // slow drift plus a fast alternating band riding on top.
            let drift = (y as f32 / h as f32) * 200.0;
            let band = if y % 2 == 0 { 40.0 } else { -40.0 };
            for x in 0..w {
                samples[y * w + x] = 1000.0 + drift + band;
            }
        }
        let frame = Frame::new(w, h, samples);
        let params = BandingParams {
            horizontal: true,
            vertical: false,
            stripe_width: 16,
            auto_window: true,
            manual_window: DEFAULT_SMOOTH_WINDOW,
        };
        let out = apply(&frame, &params);
        let row_means: Vec<f32> = (0..h)
            .map(|y| out.samples[y * w..y * w + w].iter().sum::<f32>() / w as f32)
            .collect();
        let adjacent_diffs: f32 = row_means.windows(2).map(|pair| (pair[1] - pair[0]).abs()).sum();
        assert!(adjacent_diffs / (h as f32 - 1.0) < 40.0);
    }

    #[test]
    fn auto_window_candidates_span_the_original_range() {
        assert_eq!(auto_window_candidates(64)[0], 10);
        assert_eq!(auto_window_candidates(2048).last().copied(), Some(510));
        assert_eq!(auto_window_candidates(20), vec![10, 32, 64, 128, 256]);
    }
}
