//! Size-bounded lossy compression
//!
//! Two phases:
//! 1. Downsampling happens at decode time (`buffer::decode`), by the power of
//!    two that keeps the longest side at or under `max_width`.
//! 2. Quality search: encode at `quality_start`, and while the output is over
//!    `target_size_kb` and quality is above `quality_min`, step quality down
//!    and re-encode. The last encoded buffer is returned whether or not the
//!    target was met; `target_met` tells the caller which case it got.
//!
//! Every attempt is recorded in `OptimizationResult::attempts`.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use crate::buffer::{self, PixelBuffer};
use crate::error::{Result, PipelineError};

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Longest side allowed after decode-time subsampling (default: 600)
    pub max_width: u32,
    /// Size ceiling in KB, 1 KB = 1024 bytes (default: 150)
    pub target_size_kb: u32,
    /// First quality tried (default: 90)
    pub quality_start: u8,
    /// Quality floor, never encoded below (default: 60)
    pub quality_min: u8,
    /// Quality decrement per retry (default: 5)
    pub quality_step: u8,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_width: 600,
            target_size_kb: 150,
            quality_start: 90,
            quality_min: 60,
            quality_step: 5,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 {
            return Err(PipelineError::InvalidParameter("max_width must be positive".to_string()));
        }
        if self.target_size_kb == 0 {
            return Err(PipelineError::InvalidParameter("target_size_kb must be positive".to_string()));
        }
        if self.quality_min == 0 || self.quality_start > 100 {
            return Err(PipelineError::InvalidParameter(format!(
                "quality must be within 1-100, got {}..{}",
                self.quality_min, self.quality_start
            )));
        }
        if self.quality_min > self.quality_start {
            return Err(PipelineError::InvalidParameter(format!(
                "quality_min ({}) exceeds quality_start ({})",
                self.quality_min, self.quality_start
            )));
        }
        if self.quality_step == 0 {
            return Err(PipelineError::InvalidParameter("quality_step must be positive".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// ENCODERS
// ============================================================================

/// A quality-parameterized lossy encoder
pub trait LossyEncoder {
    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>>;
}

/// Baseline JPEG through the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegQualityEncoder;

impl LossyEncoder for JpegQualityEncoder {
    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        image
            .write_with_encoder(encoder)
            .map_err(|e| PipelineError::Encode(format!("JPEG encode at quality {} failed: {}", quality, e)))?;
        Ok(buf.into_inner())
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressionAttempt {
    pub quality: u8,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size_kb: f64,
    pub final_quality: u8,
    pub target_met: bool,
    pub width: u32,
    pub height: u32,
    /// Every encode in loop order
    pub attempts: Vec<CompressionAttempt>,
}

pub fn size_kb(bytes: &[u8]) -> f64 {
    bytes.len() as f64 / 1024.0
}

// ============================================================================
// COMPRESSION
// ============================================================================

/// Drop alpha by compositing onto white
pub fn flatten_onto_white(buffer: &PixelBuffer) -> RgbImage {
    let (width, height) = buffer.dimensions();
    let source = buffer.as_image();
    RgbImage::from_fn(width, height, |x, y| {
        let p = source.get_pixel(x, y);
        let a = p[3] as u32;
        let over = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over(p[0]), over(p[1]), over(p[2])])
    })
}

pub fn compress(buffer: &PixelBuffer, config: &OptimizerConfig) -> Result<OptimizationResult> {
    compress_with(buffer, config, &JpegQualityEncoder)
}

pub fn compress_with<E: LossyEncoder>(
    buffer: &PixelBuffer,
    config: &OptimizerConfig,
    encoder: &E,
) -> Result<OptimizationResult> {
    config.validate()?;

    let rgb = flatten_onto_white(buffer);
    let target_bytes = config.target_size_kb as usize * 1024;
    let mut quality = config.quality_start;
    let mut attempts: Vec<CompressionAttempt> = Vec::new();
    let mut best: Option<(Vec<u8>, u8)> = None;

    loop {
        let bytes = match encoder.encode(&rgb, quality) {
            Ok(bytes) => bytes,
            Err(e) => match best {
                // Keep what the previous quality produced
                Some(_) => {
                    log::warn!("Encode failed at quality {}, keeping previous output: {}", quality, e);
                    break;
                }
                None => return Err(e),
            },
        };

        log::debug!("Encoded at quality {}: {} bytes", quality, bytes.len());
        attempts.push(CompressionAttempt { quality, size_bytes: bytes.len() });

        let done = bytes.len() <= target_bytes || quality <= config.quality_min;
        best = Some((bytes, quality));
        if done {
            break;
        }

        quality = quality.saturating_sub(config.quality_step).max(config.quality_min);
    }

    let (bytes, final_quality) = best.ok_or_else(|| PipelineError::Encode("No output produced".to_string()))?;
    let kb = size_kb(&bytes);
    let target_met = bytes.len() <= target_bytes;

    if target_met {
        log::info!("Compressed to {:.1} KB at quality {}", kb, final_quality);
    } else {
        log::warn!(
            "Quality floor {} reached at {:.1} KB, over the {} KB target",
            final_quality, kb, config.target_size_kb
        );
    }

    Ok(OptimizationResult {
        bytes,
        size_kb: kb,
        final_quality,
        target_met,
        width: rgb.width(),
        height: rgb.height(),
        attempts,
    })
}

/// Decode (with subsampling) and compress in one step
pub fn optimize_bytes(raw: &[u8], config: &OptimizerConfig) -> Result<OptimizationResult> {
    config.validate()?;
    let buffer = buffer::decode(raw, config.max_width)?;
    compress(&buffer, config)
}
