pub mod background;
pub mod buffer;
pub mod compositor;
pub mod compressor;
pub mod error;
pub mod orientation;
pub mod pipeline;
pub mod refine;
pub mod segmentation;
pub mod sink;

pub use background::BackgroundModel;
pub use buffer::{decode, ColorSample, PixelBuffer};
pub use compositor::BackgroundMode;
pub use compressor::{compress, optimize_bytes, OptimizationResult, OptimizerConfig};
pub use error::{PipelineError, Result};
pub use orientation::OrientationTag;
pub use pipeline::{BatchEntry, OptimizedImage, Pipeline, PipelineConfig};
pub use segmentation::{Connectivity, Mask, SegmentationConfig, SegmentationStrategy};
pub use sink::{DirectorySink, MemorySink, ResultSink};

/// Decode and compress off the async runtime
pub async fn optimize_bytes_async(raw: Vec<u8>, config: OptimizerConfig) -> Result<OptimizationResult> {
    tokio::task::spawn_blocking(move || compressor::optimize_bytes(&raw, &config))
        .await
        .map_err(|e| PipelineError::Processing(format!("Task join error: {}", e)))?
}
