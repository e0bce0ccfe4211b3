//! On-disk contracts for calibration artifacts (section 6).
//!
//! NPY: native single-precision binary, 2-D, row-major. No crate in this
//! workspace's dependency graph speaks NPY, and the format is small and
//! fully specified, so it is hand-rolled here rather than pulled in as a
//! dependency (see DESIGN.md).
//!
//! TIFF: single-channel, uncompressed, `minisblack`, via the `image` crate's
//! `tiff` feature — the same crate the teacher's storage layer reaches for.

use std::io::{self, Read, Write};
use std::path::Path;

use crate::frame::Frame;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Reads a 2-D, row-major, little-endian `f32` NPY array.
pub fn read_npy_f32(path: &Path) -> io::Result<(usize, usize, Vec<f32>)> {
    let mut file = std::fs::File::open(path)?;
    let mut magic = [0u8; 6];
    file.read_exact(&mut magic)?;
    if &magic != NPY_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not an NPY file"));
    }
    let mut version = [0u8; 2];
    file.read_exact(&mut version)?;
    let header_len = if version[0] == 1 {
        let mut len_bytes = [0u8; 2];
        file.read_exact(&mut len_bytes)?;
        u16::from_le_bytes(len_bytes) as usize
    } else {
        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        u32::from_le_bytes(len_bytes) as usize
    };
    let mut header = vec![0u8; header_len];
    file.read_exact(&mut header)?;
    let header_str = String::from_utf8_lossy(&header);

    let (height, width) = parse_shape(&header_str).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "could not parse npy header shape")
    })?;
    if !header_str.contains("<f4") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "npy dtype must be little-endian float32 (<f4)",
        ));
    }

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    let expected_len = width * height * 4;
    if raw.len() < expected_len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "npy payload truncated"));
    }
    let mut samples = Vec::with_capacity(width * height);
    for chunk in raw[..expected_len].chunks_exact(4) {
        let arr: [u8; 4] = chunk.try_into().unwrap();
        samples.push(f32::from_le_bytes(arr));
    }
    Ok((width, height, samples))
}

/// Parses `"shape": (H, W)` (or `(H, W, 1)`) out of an NPY header dict.
fn parse_shape(header: &str) -> Option<(usize, usize)> {
    let start = header.find("'shape':")? + "'shape':".len();
    let rest = &header[start..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    let inner = &rest[open + 1..close];
    let dims: Vec<usize> = inner
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<usize>().ok())
        .collect();
    match dims.as_slice() {
        [h, w] => Some((*h, *w)),
        [h, w, _] => Some((*h, *w)),
        _ => None,
    }
}

/// Writes a 2-D, row-major `f32` array as an NPY v1.0 file.
pub fn write_npy_f32(path: &Path, width: usize, height: usize, samples: &[f32]) -> io::Result<()> {
    debug_assert_eq!(samples.len(), width * height);
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        height, width
    );
    // Header must be padded so magic(6) + version(2) + len(2) + header ends
    // on a 64-byte boundary, terminated with '\n'.
    let prefix_len = 6 + 2 + 2;
    let mut header = dict.into_bytes();
    header.push(b'\n');
    let total = prefix_len + header.len();
    let pad = (64 - (total % 64)) % 64;
    // insert padding spaces before the trailing newline
    header.pop();
    header.extend(std::iter::repeat(b' ').take(pad));
    header.push(b'\n');

    let tmp_path = path.with_extension("npy.tmp");
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(NPY_MAGIC)?;
        f.write_all(&[1u8, 0u8])?;
        f.write_all(&(header.len() as u16).to_le_bytes())?;
        f.write_all(&header)?;
        for s in samples {
            f.write_all(&s.to_le_bytes())?;
        }
        f.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn save_frame_npy(path: &Path, frame: &Frame) -> io::Result<()> {
    write_npy_f32(path, frame.width, frame.height, &frame.samples)
}

pub fn load_frame_npy(path: &Path) -> io::Result<Frame> {
    let (w, h, samples) = read_npy_f32(path)?;
    Ok(Frame::new(w, h, samples))
}

/// Linearly normalizes finite samples into `[0, 65535]`; non-finite values
/// clamp to the nearest end, per the "save processed as 16-bit TIFF"
/// contract in section 6.
pub fn normalize_to_u16(frame: &Frame) -> Vec<u16> {
    let (lo, hi) = frame.finite_min_max().unwrap_or((0.0, 1.0));
    let range = if (hi - lo).abs() > f32::EPSILON { hi - lo } else { 1.0 };
    frame
        .samples
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                if v.is_sign_negative() {
                    0u16
                } else {
                    65535u16
                }
            } else {
                let n = ((v - lo) / range * 65535.0).round();
                n.clamp(0.0, 65535.0) as u16
            }
        })
        .collect()
}

/// Writes a single-channel, uncompressed, `minisblack` 16-bit TIFF.
pub fn write_tiff_u16(path: &Path, width: usize, height: usize, data: &[u16]) -> io::Result<()> {
    let buf: image::ImageBuffer<image::Luma<u16>, Vec<u16>> =
        image::ImageBuffer::from_raw(width as u32, height as u32, data.to_vec())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad buffer dims"))?;
    let dyn_img = image::DynamicImage::ImageLuma16(buf);
    dyn_img
        .save_with_format(path, image::ImageFormat::Tiff)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

pub fn save_frame_tiff_normalized(path: &Path, frame: &Frame) -> io::Result<()> {
    let data = normalize_to_u16(frame);
    write_tiff_u16(path, frame.width, frame.height, &data)
}

/// Writes the bad-pixel mask as an 0/255 grayscale visual TIFF.
pub fn save_mask_tiff(path: &Path, width: usize, height: usize, mask: &[bool]) -> io::Result<()> {
    let data: Vec<u16> = mask.iter().map(|&b| if b { 65535 } else { 0 }).collect();
    write_tiff_u16(path, width, height, &data)
}
