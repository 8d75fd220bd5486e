//! Orientation normalization
//!
//! EXIF tag 0x0112 is read straight from the encoded bytes. Anything missing or
//! unreadable means `Normal`; orientation never fails a pipeline run.
//!
//! After the EXIF correction, catalog policy forces portrait: a buffer wider
//! than it is tall is rotated 90 degrees clockwise.

use std::io::Cursor;

use image::imageops;
use serde::{Deserialize, Serialize};
use crate::buffer::PixelBuffer;

/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationTag {
    Normal,
    FlipH,
    Rotate180,
    FlipV,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl OrientationTag {
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => OrientationTag::FlipH,
            3 => OrientationTag::Rotate180,
            4 => OrientationTag::FlipV,
            5 => OrientationTag::Transpose,
            6 => OrientationTag::Rotate90,
            7 => OrientationTag::Transverse,
            8 => OrientationTag::Rotate270,
            _ => OrientationTag::Normal,
        }
    }
}

pub fn read_orientation(bytes: &[u8]) -> OrientationTag {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("No EXIF orientation ({}), assuming normal", e);
            return OrientationTag::Normal;
        }
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(OrientationTag::from_exif)
        .unwrap_or(OrientationTag::Normal)
}

pub fn apply_orientation(buffer: PixelBuffer, tag: OrientationTag) -> PixelBuffer {
    match tag {
        OrientationTag::Normal => buffer,
        OrientationTag::FlipH => buffer.transformed(|img| imageops::flip_horizontal(img)),
        OrientationTag::Rotate180 => buffer.transformed(|img| imageops::rotate180(img)),
        OrientationTag::FlipV => buffer.transformed(|img| imageops::flip_vertical(img)),
        OrientationTag::Transpose => {
            buffer.transformed(|img| imageops::flip_horizontal(&imageops::rotate90(img)))
        }
        OrientationTag::Rotate90 => buffer.transformed(|img| imageops::rotate90(img)),
        OrientationTag::Transverse => {
            buffer.transformed(|img| imageops::flip_horizontal(&imageops::rotate270(img)))
        }
        OrientationTag::Rotate270 => buffer.transformed(|img| imageops::rotate270(img)),
    }
}

/// Rotate landscape buffers 90deg clockwise so that `height >= width`
pub fn force_portrait(buffer: PixelBuffer) -> PixelBuffer {
    if buffer.width() > buffer.height() {
        buffer.transformed(|img| imageops::rotate90(img))
    } else {
        buffer
    }
}

pub fn normalize(buffer: PixelBuffer, tag: OrientationTag) -> PixelBuffer {
    force_portrait(apply_orientation(buffer, tag))
}

/// Baseline JPEG carrying an APP1 EXIF block with only tag 0x0112 set
#[cfg(test)]
pub(crate) fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Rgb([30, 30, 30]) } else { Rgb([230, 230, 230]) }
    });
    let mut jpeg = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 90)).unwrap();

    // Big-endian TIFF header, one IFD with one SHORT entry, no next IFD
    let mut tiff: Vec<u8> = vec![b'M', b'M', 0x00, 0x2a, 0x00, 0x00, 0x00, 0x08, 0x00, 0x01];
    tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);
    let segment_len = (payload.len() + 2) as u16;

    let mut out = vec![0xff, 0xd8, 0xff, 0xe1];
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}
