//! Compositing a mask onto its source
//!
//! The copy pass walks per-row foreground spans. Background pixels become
//! opaque white or fully transparent depending on `BackgroundMode`.
//! Foreground pixels on the mask boundary are then feathered with a Gaussian
//! blur of the coverage plane, so the cut edge does not look stair-stepped.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use crate::buffer::PixelBuffer;
use crate::error::{Result, PipelineError};
use crate::segmentation::Mask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    White,
    Transparent,
}

impl BackgroundMode {
    fn fill(&self) -> Rgba<u8> {
        match self {
            BackgroundMode::White => Rgba([255, 255, 255, 255]),
            BackgroundMode::Transparent => Rgba([255, 255, 255, 0]),
        }
    }
}

/// A horizontal run of foreground pixels: `start_x..end_x` on row `y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub y: u32,
    pub start_x: u32,
    pub end_x: u32,
}

impl Span {
    pub fn width(&self) -> u32 {
        self.end_x - self.start_x
    }
}

/// Sigmas outside this range either underflow the Gaussian kernel or make it enormous
pub const MIN_FEATHER_SIGMA: f32 = 0.05;
pub const MAX_FEATHER_SIGMA: f32 = 64.0;

/// `0` disables feathering; anything else must be within `MIN..=MAX_FEATHER_SIGMA`
pub fn check_feather_sigma(sigma: f32) -> Result<()> {
    if sigma == 0.0 || (MIN_FEATHER_SIGMA..=MAX_FEATHER_SIGMA).contains(&sigma) {
        return Ok(());
    }
    Err(PipelineError::InvalidParameter(format!(
        "feather_sigma must be 0 or within {}..={}, got {}",
        MIN_FEATHER_SIGMA, MAX_FEATHER_SIGMA, sigma
    )))
}

pub fn foreground_spans(mask: &Mask) -> Vec<Span> {
    let (width, height) = mask.dimensions();
    let mut spans = Vec::new();

    for y in 0..height {
        let mut start: Option<u32> = None;
        for x in 0..width {
            match (mask.get(x, y), start) {
                (true, None) => start = Some(x),
                (false, Some(s)) => {
                    spans.push(Span { y, start_x: s, end_x: x });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push(Span { y, start_x: s, end_x: width });
        }
    }

    spans
}

fn blend(src: u8, fill: u8, coverage: f32) -> u8 {
    (src as f32 * coverage + fill as f32 * (1.0 - coverage)).round().clamp(0.0, 255.0) as u8
}

pub fn composite(
    buffer: &PixelBuffer,
    mask: &Mask,
    mode: BackgroundMode,
    feather_sigma: f32,
) -> Result<PixelBuffer> {
    if buffer.dimensions() != mask.dimensions() {
        return Err(PipelineError::InvalidParameter(format!(
            "Mask {:?} does not match buffer {:?}",
            mask.dimensions(),
            buffer.dimensions()
        )));
    }

    check_feather_sigma(feather_sigma)?;

    let (width, height) = buffer.dimensions();
    let source = buffer.as_image();
    let fill = mode.fill();
    let mut out = RgbaImage::from_pixel(width, height, fill);
    let spans = foreground_spans(mask);
    log::debug!(
        "Compositing {} spans, {} foreground pixels",
        spans.len(),
        spans.iter().map(Span::width).sum::<u32>()
    );

    for span in &spans {
        for x in span.start_x..span.end_x {
            out.put_pixel(x, span.y, *source.get_pixel(x, span.y));
        }
    }

    if feather_sigma > 0.0 {
        let coverage = GrayImage::from_fn(width, height, |x, y| {
            Luma([if mask.get(x, y) { 255 } else { 0 }])
        });
        let blurred = gaussian_blur_f32(&coverage, feather_sigma);

        for span in &spans {
            for x in span.start_x..span.end_x {
                if !mask.is_boundary(x, span.y) {
                    continue;
                }
                let c = blurred.get_pixel(x, span.y)[0] as f32 / 255.0;
                let src = source.get_pixel(x, span.y);
                let px = match mode {
                    BackgroundMode::White => Rgba([
                        blend(src[0], fill[0], c),
                        blend(src[1], fill[1], c),
                        blend(src[2], fill[2], c),
                        255,
                    ]),
                    BackgroundMode::Transparent => {
                        Rgba([src[0], src[1], src[2], (src[3] as f32 * c).round() as u8])
                    }
                };
                out.put_pixel(x, span.y, px);
            }
        }
    }

    PixelBuffer::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([200, 10, 10, 255]);

    fn square_mask(size: u32, from: u32, to: u32) -> Mask {
        let mut mask = Mask::new(size, size);
        for y in from..to {
            for x in from..to {
                mask.set(x, y, true);
            }
        }
        mask
    }

    fn red_buffer(size: u32) -> PixelBuffer {
        PixelBuffer::new(RgbaImage::from_pixel(size, size, RED)).unwrap()
    }

    #[test]
    fn test_spans_per_row() {
        let mut mask = Mask::new(6, 2);
        mask.set(0, 0, true);
        mask.set(1, 0, true);
        mask.set(4, 0, true);
        mask.set(5, 0, true);
        mask.set(2, 1, true);

        let spans = foreground_spans(&mask);
        assert_eq!(
            spans,
            vec![
                Span { y: 0, start_x: 0, end_x: 2 },
                Span { y: 0, start_x: 4, end_x: 6 },
                Span { y: 1, start_x: 2, end_x: 3 },
            ]
        );
        assert_eq!(spans.iter().map(Span::width).sum::<u32>(), 5);
    }

    #[test]
    fn test_white_background() {
        let out = composite(&red_buffer(20), &square_mask(20, 5, 15), BackgroundMode::White, 1.0).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get(0, 0), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(out.get(10, 10), Some(RED));

        // Feathered edge sits between the object and white
        let edge = out.get(5, 10).unwrap();
        assert!(edge[1] > RED[1] && edge[1] < 255);
        assert_eq!(edge[3], 255);
    }

    #[test]
    fn test_transparent_background() {
        let out = composite(&red_buffer(20), &square_mask(20, 5, 15), BackgroundMode::Transparent, 1.0).unwrap();
        assert_eq!(out.get(0, 0).unwrap()[3], 0);
        assert_eq!(out.get(10, 10).unwrap()[3], 255);
        let edge_alpha = out.get(5, 10).unwrap()[3];
        assert!(edge_alpha > 0 && edge_alpha < 255);
    }

    #[test]
    fn test_no_feather_copies_exactly() {
        let out = composite(&red_buffer(10), &square_mask(10, 2, 8), BackgroundMode::White, 0.0).unwrap();
        assert_eq!(out.get(2, 2), Some(RED));
        assert_eq!(out.get(1, 1), Some(Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn test_feather_sigma_range() {
        assert!(check_feather_sigma(0.0).is_ok());
        assert!(check_feather_sigma(1.0).is_ok());
        assert!(check_feather_sigma(MAX_FEATHER_SIGMA).is_ok());
        for sigma in [1e12, 64.5, 1e-30, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(check_feather_sigma(sigma), Err(PipelineError::InvalidParameter(_))), "{}", sigma);
        }

        let err = composite(&red_buffer(10), &square_mask(10, 2, 8), BackgroundMode::White, 1e12).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = composite(&red_buffer(10), &Mask::new(9, 10), BackgroundMode::White, 1.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }
}
