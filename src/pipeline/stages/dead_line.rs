//! Slot 400: dead-line interpolation — fills listed dead rows/columns from
//! the nearest healthy neighbors on each side, skipping other dead lines.

use crate::frame::Frame;

#[derive(Clone, Debug, Default)]
pub struct DeadLineParams {
    pub dead_rows: Vec<usize>,
    pub dead_cols: Vec<usize>,
}

pub fn apply(frame: &Frame, params: &DeadLineParams) -> Frame {
    let mut out = frame.clone();
    if !params.dead_cols.is_empty() {
        fill_dead_columns(&mut out, &params.dead_cols);
    }
    if !params.dead_rows.is_empty() {
        fill_dead_rows(&mut out, &params.dead_rows);
    }
    out.scrub_nonfinite(0.0);
    out
}

fn fill_dead_columns(frame: &mut Frame, dead_cols: &[usize]) {
    let (w, h) = frame.shape();
    let dead: std::collections::HashSet<usize> = dead_cols.iter().copied().filter(|&c| c < w).collect();
    for &col in &dead {
        let left = find_healthy(col, w, &dead, -1);
        let right = find_healthy(col, w, &dead, 1);
        for y in 0..h {
            let value = match (left, right) {
                (Some(l), Some(r)) => (frame.samples[y * w + l] + frame.samples[y * w + r]) / 2.0,
                (Some(l), None) => frame.samples[y * w + l],
                (None, Some(r)) => frame.samples[y * w + r],
                (None, None) => continue,
            };
            frame.samples[y * w + col] = value;
        }
    }
}

fn fill_dead_rows(frame: &mut Frame, dead_rows: &[usize]) {
    let (w, h) = frame.shape();
    let dead: std::collections::HashSet<usize> = dead_rows.iter().copied().filter(|&r| r < h).collect();
    for &row in &dead {
        let above = find_healthy(row, h, &dead, -1);
        let below = find_healthy(row, h, &dead, 1);
        for x in 0..w {
            let value = match (above, below) {
                (Some(a), Some(b)) => (frame.samples[a * w + x] + frame.samples[b * w + x]) / 2.0,
                (Some(a), None) => frame.samples[a * w + x],
                (None, Some(b)) => frame.samples[b * w + x],
                (None, None) => continue,
            };
            frame.samples[row * w + x] = value;
        }
    }
}

/// Walks from `start` in `direction` (+1/-1), skipping indices in `dead`,
/// and returns the first healthy index within bounds, or `None`.
fn find_healthy(start: usize, len: usize, dead: &std::collections::HashSet<usize>, direction: isize) -> Option<usize> {
    let mut idx = start as isize + direction;
    while idx >= 0 && (idx as usize) < len {
        if !dead.contains(&(idx as usize)) {
            return Some(idx as usize);
        }
        idx += direction;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_single_dead_column_from_both_sides() {
        let frame = Frame::new(3, 1, vec![10.0, 999.0, 20.0]);
        let params = DeadLineParams {
            dead_rows: vec![],
            dead_cols: vec![1],
        };
        let out = apply(&frame, &params);
        assert!((out.samples[1] - 15.0).abs() < 1e-4);
    }

    #[test]
    fn edge_dead_column_copies_single_neighbor() {
        let frame = Frame::new(3, 1, vec![999.0, 10.0, 20.0]);
        let params = DeadLineParams {
            dead_rows: vec![],
            dead_cols: vec![0],
        };
        let out = apply(&frame, &params);
        assert!((out.samples[0] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn skips_adjacent_dead_columns() {
        let frame = Frame::new(4, 1, vec![10.0, 999.0, 999.0, 20.0]);
        let params = DeadLineParams {
            dead_rows: vec![],
            dead_cols: vec![1, 2],
        };
        let out = apply(&frame, &params);
        assert!((out.samples[1] - 15.0).abs() < 1e-4);
        assert!((out.samples[2] - 15.0).abs() < 1e-4);
    }

    #[test]
    fn fills_dead_row() {
        let frame = Frame::new(1, 3, vec![10.0, 999.0, 20.0]);
        let params = DeadLineParams {
            dead_rows: vec![1],
            dead_cols: vec![],
        };
        let out = apply(&frame, &params);
        assert!((out.samples[1] - 15.0).abs() < 1e-4);
    }
}
