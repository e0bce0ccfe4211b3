//! Projection capture sequences (section 6): each sequence gets its own
//! `captures/<timestamp>/` directory, with frames numbered in arrival order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;

use crate::calibration::io::save_frame_tiff_normalized;
use crate::frame::Frame;

/// A single run's output directory, handed out new sequential frame indices.
pub struct CaptureSequence {
    dir: PathBuf,
    next_index: AtomicUsize,
}

impl CaptureSequence {
    /// Creates `<root>/captures/<timestamp>/`, timestamped to the second.
    pub fn start(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let stamp = Local::now().format("%Y%m%dT%H%M%S").to_string();
        let dir = root.into().join("captures").join(stamp);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, next_index: AtomicUsize::new(0) })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Saves `frame` as `<i>.tif` and returns the index it was saved under.
    pub fn save_next(&self, frame: &Frame) -> std::io::Result<usize> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{index}.tif"));
        save_frame_tiff_normalized(&path, frame)?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saves_frames_with_ascending_indices() {
        let root = tempdir().unwrap();
        let sequence = CaptureSequence::start(root.path()).unwrap();
        let frame = Frame::filled(2, 2, 100.0);
        assert_eq!(sequence.save_next(&frame).unwrap(), 0);
        assert_eq!(sequence.save_next(&frame).unwrap(), 1);
        assert!(sequence.dir().join("0.tif").exists());
        assert!(sequence.dir().join("1.tif").exists());
    }
}
