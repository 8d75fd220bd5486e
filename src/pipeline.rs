//! Pipeline orchestration
//!
//! One item: decode → (segment → refine → smooth → composite) → orientation
//! normalize → compress. Every stage is a pure transform; buffers are owned by
//! the call and dropped on every exit path.
//!
//! Batches run strictly one item at a time. A failure on one item is recorded
//! and the batch moves on, so N inputs always produce N results.

use std::io::Cursor;
use std::path::Path;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use crate::buffer::{self, PixelBuffer};
use crate::compositor::{check_feather_sigma, composite, BackgroundMode};
use crate::compressor::{compress, CompressionAttempt, OptimizerConfig};
use crate::error::{Result, PipelineError};
use crate::orientation::{normalize, read_orientation, OrientationTag};
use crate::refine::{refine, smooth};
use crate::segmentation::{segment, SegmentationConfig};
use crate::sink::ResultSink;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `None` skips segmentation and only normalizes + compresses
    pub segmentation: Option<SegmentationConfig>,
    pub background_mode: BackgroundMode,
    /// Gaussian sigma for the cut edge, 0 disables (default: 1.0)
    pub feather_sigma: f32,
    pub optimizer: OptimizerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmentation: Some(SegmentationConfig::default()),
            background_mode: BackgroundMode::White,
            feather_sigma: 1.0,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::debug!("Loaded pipeline config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_feather_sigma(self.feather_sigma)?;
        self.optimizer.validate()
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OptimizedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size_kb: f64,
    pub quality: u8,
    pub target_met: bool,
    pub width: u32,
    pub height: u32,
    pub segmented: bool,
    pub orientation: OrientationTag,
    pub attempts: Vec<CompressionAttempt>,
}

/// Outcome of one named item in a persisted batch
#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub name: String,
    /// Where the sink put it
    pub location: Option<String>,
    pub image: Option<OptimizedImage>,
    pub error: Option<PipelineError>,
}

impl BatchEntry {
    pub fn failed(name: impl Into<String>, error: PipelineError) -> Self {
        Self { name: name.into(), location: None, image: None, error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Segment and composite onto the configured background
    fn extract(&self, buffer: &PixelBuffer, settings: &SegmentationConfig) -> Result<PixelBuffer> {
        let mask = segment(buffer, settings);
        let mut mask = refine(&mask, buffer, settings.edge_threshold);
        if settings.smooth_edges {
            mask = smooth(&mask);
        }
        composite(buffer, &mask, self.config.background_mode, self.config.feather_sigma)
    }

    /// Decode, optionally extract, then orient
    fn prepare(
        &self,
        raw: &[u8],
        segmentation: Option<&SegmentationConfig>,
    ) -> Result<(PixelBuffer, OrientationTag)> {
        let decoded = buffer::decode(raw, self.config.optimizer.max_width)?;
        let processed = match segmentation {
            Some(settings) => self.extract(&decoded, settings)?,
            None => decoded,
        };
        let tag = read_orientation(raw);
        Ok((normalize(processed, tag), tag))
    }

    pub fn process(&self, raw: &[u8]) -> Result<OptimizedImage> {
        let segmentation = self.config.segmentation.as_ref();
        let (buffer, orientation) = self.prepare(raw, segmentation)?;
        let result = compress(&buffer, &self.config.optimizer)?;

        Ok(OptimizedImage {
            bytes: result.bytes,
            size_kb: result.size_kb,
            quality: result.final_quality,
            target_met: result.target_met,
            width: result.width,
            height: result.height,
            segmented: segmentation.is_some(),
            orientation,
            attempts: result.attempts,
        })
    }

    /// Extracted foreground as PNG, keeping alpha for `BackgroundMode::Transparent`
    pub fn cutout(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let settings = self.config.segmentation.clone().unwrap_or_default();
        let (buffer, _) = self.prepare(raw, Some(&settings))?;
        encode_png(buffer.as_image())
    }

    pub fn process_batch<I, B>(&self, inputs: I) -> Vec<Result<OptimizedImage>>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        inputs
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let result = self.process(raw.as_ref());
                if let Err(e) = &result {
                    log::warn!("Batch item {} failed: {}", index, e);
                }
                result
            })
            .collect()
    }

    /// Process one named input and hand it to `sink` on success
    pub fn process_into<S: ResultSink>(&self, name: &str, raw: &[u8], sink: &mut S) -> BatchEntry {
        let outcome = self
            .process(raw)
            .and_then(|image| sink.persist(name, &image).map(|location| (image, location)));

        match outcome {
            Ok((mut image, location)) => {
                // Released once persisted
                image.bytes = Vec::new();
                BatchEntry { name: name.to_string(), location: Some(location), image: Some(image), error: None }
            }
            Err(e) => {
                log::warn!("Batch item {} failed: {}", name, e);
                BatchEntry::failed(name, e)
            }
        }
    }

    pub fn process_batch_into<S: ResultSink>(
        &self,
        inputs: &[(String, Vec<u8>)],
        sink: &mut S,
    ) -> Vec<BatchEntry> {
        let entries: Vec<BatchEntry> = inputs
            .iter()
            .map(|(name, raw)| self.process_into(name, raw, sink))
            .collect();
        log_batch_summary(&entries);
        entries
    }

    /// Read and process files one at a time, one entry per path in input order
    pub fn process_files_into<P, S>(&self, paths: &[P], sink: &mut S) -> Vec<BatchEntry>
    where
        P: AsRef<Path>,
        S: ResultSink,
    {
        let entries: Vec<BatchEntry> = paths
            .iter()
            .map(|path| {
                let name = path.as_ref().display().to_string();
                match std::fs::read(path) {
                    Ok(raw) => self.process_into(&name, &raw, sink),
                    Err(e) => {
                        log::warn!("Cannot read {}: {}", name, e);
                        BatchEntry::failed(name, PipelineError::Io(e))
                    }
                }
            })
            .collect();
        log_batch_summary(&entries);
        entries
    }

    pub async fn process_async(&self, raw: Vec<u8>) -> Result<OptimizedImage> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.process(&raw))
            .await
            .map_err(|e| PipelineError::Processing(format!("Task join error: {}", e)))?
    }

    /// Sequential: each item is awaited before the next one starts
    pub async fn process_batch_async(&self, inputs: Vec<Vec<u8>>) -> Vec<Result<OptimizedImage>> {
        let mut results = Vec::with_capacity(inputs.len());
        for (index, raw) in inputs.into_iter().enumerate() {
            let result = self.process_async(raw).await;
            if let Err(e) = &result {
                log::warn!("Batch item {} failed: {}", index, e);
            }
            results.push(result);
        }
        results
    }

    pub async fn cutout_async(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.cutout(&raw))
            .await
            .map_err(|e| PipelineError::Processing(format!("Task join error: {}", e)))?
    }
}

fn log_batch_summary(entries: &[BatchEntry]) {
    let failed = entries.iter().filter(|e| !e.is_ok()).count();
    log::info!("Batch finished: {} ok, {} failed", entries.len() - failed, failed);
}

/// Encode image as PNG bytes
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| PipelineError::Encode(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer.into_inner())
}

// ============================================================================
// TESTS
// ============================================================================
