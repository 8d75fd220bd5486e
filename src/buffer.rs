//! Pixel buffer shared by every stage
//!
//! `PixelBuffer` is an `RgbaImage` that is known to be non-empty. All lookups
//! by coordinate go through bounds-checked accessors, and brightness is the
//! integer Rec.601 luma used by segmentation and refinement alike.
//!
//! Decoding happens here too, including the power-of-two subsample that keeps
//! the longest side at or under `max_width` before any pixel work starts.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{GenericImageView, GrayImage, ImageReader, Limits, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use crate::error::{Result, PipelineError};

// ============================================================================
// COLOR SAMPLE
// ============================================================================

/// An estimated background or seed color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSample {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorSample {
    pub const WHITE: ColorSample = ColorSample { r: 255, g: 255, b: 255 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgba(pixel: &Rgba<u8>) -> Self {
        Self::new(pixel[0], pixel[1], pixel[2])
    }

    /// Channel-wise mean of the given pixels, or `None` when there are none
    pub fn average<'a, I>(pixels: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Rgba<u8>>,
    {
        let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
        for p in pixels {
            r += p[0] as u64;
            g += p[1] as u64;
            b += p[2] as u64;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(Self::new((r / n) as u8, (g / n) as u8, (b / n) as u8))
    }

    pub fn brightness(&self) -> u8 {
        luma(self.r, self.g, self.b)
    }

    /// Largest per-channel absolute difference
    pub fn channel_distance(&self, pixel: &Rgba<u8>) -> u8 {
        let dr = self.r.abs_diff(pixel[0]);
        let dg = self.g.abs_diff(pixel[1]);
        let db = self.b.abs_diff(pixel[2]);
        dr.max(dg).max(db)
    }
}

/// Integer Rec.601 luma, rounded
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

// ============================================================================
// PIXEL BUFFER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    pub fn new(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(*self.image.get_pixel(x, y))
        } else {
            None
        }
    }

    pub fn brightness(&self, x: u32, y: u32) -> Option<u8> {
        self.get(x, y).map(|p| luma(p[0], p[1], p[2]))
    }

    /// Row-major brightness of every pixel (`index = y * width + x`)
    pub fn brightness_plane(&self) -> Vec<u8> {
        self.image.pixels().map(|p| luma(p[0], p[1], p[2])).collect()
    }

    pub fn luma_image(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let p = self.image.get_pixel(x, y);
            Luma([luma(p[0], p[1], p[2])])
        })
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Apply a geometric transform that never produces an empty image
    pub(crate) fn transformed<F>(&self, transform: F) -> Self
    where
        F: FnOnce(&RgbaImage) -> RgbaImage,
    {
        let image = transform(&self.image);
        debug_assert!(image.width() > 0 && image.height() > 0);
        Self { image }
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Smallest power of two `f` such that `max(width, height) / f <= max_width`
pub fn subsample_factor(width: u32, height: u32, max_width: u32) -> u32 {
    let longest = width.max(height);
    let limit = max_width.max(1);
    let mut factor = 1u32;
    while longest / factor > limit {
        factor *= 2;
    }
    factor
}

/// Largest side accepted from an encoded source
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;
/// Decoder allocation ceiling (512 MiB)
pub const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Decode raw bytes into a buffer whose longest side fits `max_width`
///
/// Sources over `MAX_SOURCE_DIMENSION` per side or `MAX_DECODE_ALLOC` bytes
/// are refused before any pixels are allocated.
pub fn decode(bytes: &[u8], max_width: u32) -> Result<PixelBuffer> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;
    reader.limits(decode_limits());
    let decoded = reader
        .decode()
        .map_err(|e| PipelineError::Decode(e.to_string()))?;

    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidDimensions { width, height });
    }

    let factor = subsample_factor(width, height, max_width);
    let rgba = decoded.into_rgba8();

    let rgba = if factor > 1 {
        let target_w = (width / factor).max(1);
        let target_h = (height / factor).max(1);
        log::debug!(
            "Subsampling {}x{} by {} -> {}x{}",
            width, height, factor, target_w, target_h
        );
        imageops::resize(&rgba, target_w, target_h, FilterType::Triangle)
    } else {
        rgba
    };

    PixelBuffer::new(rgba)
}
