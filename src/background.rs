//! Background color estimation
//!
//! Three interchangeable ways to guess what "background" looks like:
//! - `CornerAverage`: mean of the four corner pixels
//! - `CenterSeed`: the single pixel at `(width / 2, height / 2)`
//! - `EdgeSamples`: mean of `sample_grid_size` evenly spaced samples per edge
//!
//! None of them fail. A 1x1 buffer has no meaningful background, so it
//! yields pure white.

use image::Rgba;
use serde::{Deserialize, Serialize};
use crate::buffer::{ColorSample, PixelBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundModel {
    CornerAverage,
    CenterSeed,
    EdgeSamples,
}

impl BackgroundModel {
    pub fn sample(&self, buffer: &PixelBuffer, sample_grid_size: u32) -> ColorSample {
        match self {
            BackgroundModel::CornerAverage => corner_average(buffer),
            BackgroundModel::CenterSeed => center_seed(buffer),
            BackgroundModel::EdgeSamples => edge_samples(buffer, sample_grid_size),
        }
    }
}

fn is_single_pixel(buffer: &PixelBuffer) -> bool {
    buffer.dimensions() == (1, 1)
}

/// Average of the four corner pixels
pub fn corner_average(buffer: &PixelBuffer) -> ColorSample {
    if is_single_pixel(buffer) {
        return ColorSample::WHITE;
    }

    let (width, height) = buffer.dimensions();
    let corners: Vec<Rgba<u8>> = [
        (0, 0),
        (width - 1, 0),
        (0, height - 1),
        (width - 1, height - 1),
    ]
    .iter()
    .filter_map(|&(x, y)| buffer.get(x, y))
    .collect();

    ColorSample::average(corners.iter()).unwrap_or(ColorSample::WHITE)
}

/// The pixel at the buffer center, used as the flood-fill seed color
pub fn center_seed(buffer: &PixelBuffer) -> ColorSample {
    if is_single_pixel(buffer) {
        return ColorSample::WHITE;
    }

    let (width, height) = buffer.dimensions();
    buffer
        .get(width / 2, height / 2)
        .map(|p| ColorSample::from_rgba(&p))
        .unwrap_or(ColorSample::WHITE)
}

/// Evenly spaced positions along an edge of `length` pixels
fn edge_positions(length: u32, samples: u32) -> Vec<u32> {
    let samples = samples.max(1).min(length);
    if samples == 1 {
        return vec![length / 2];
    }
    (0..samples)
        .map(|i| (i as u64 * (length - 1) as u64 / (samples - 1) as u64) as u32)
        .collect()
}

/// Average of `samples_per_edge` points on each of the four borders
pub fn edge_samples(buffer: &PixelBuffer, samples_per_edge: u32) -> ColorSample {
    if is_single_pixel(buffer) {
        return ColorSample::WHITE;
    }

    let (width, height) = buffer.dimensions();
    let mut pixels: Vec<Rgba<u8>> = Vec::new();

    for x in edge_positions(width, samples_per_edge) {
        pixels.extend(buffer.get(x, 0));
        pixels.extend(buffer.get(x, height - 1));
    }
    for y in edge_positions(height, samples_per_edge) {
        pixels.extend(buffer.get(0, y));
        pixels.extend(buffer.get(width - 1, y));
    }

    ColorSample::average(pixels.iter()).unwrap_or(ColorSample::WHITE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn framed(width: u32, height: u32, border: [u8; 3], inner: [u8; 3]) -> PixelBuffer {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            let edge = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            let c = if edge { border } else { inner };
            Rgba([c[0], c[1], c[2], 255])
        });
        PixelBuffer::new(img).unwrap()
    }

    #[test]
    fn test_single_pixel_falls_back_to_white() {
        let buf = PixelBuffer::new(RgbaImage::from_pixel(1, 1, Rgba([3, 4, 5, 255]))).unwrap();
        for model in [
            BackgroundModel::CornerAverage,
            BackgroundModel::CenterSeed,
            BackgroundModel::EdgeSamples,
        ] {
            assert_eq!(model.sample(&buf, 8), ColorSample::WHITE);
        }
    }

    #[test]
    fn test_corner_average() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 100, 40, 255]));
        img.put_pixel(3, 3, Rgba([200, 100, 40, 255]));
        let buf = PixelBuffer::new(img).unwrap();
        assert_eq!(corner_average(&buf), ColorSample::new(100, 50, 20));
    }

    #[test]
    fn test_center_seed_reads_middle() {
        let buf = framed(5, 5, [255, 255, 255], [10, 20, 30]);
        assert_eq!(center_seed(&buf), ColorSample::new(10, 20, 30));
    }

    #[test]
    fn test_edge_samples_ignore_interior() {
        let buf = framed(20, 10, [240, 240, 240], [0, 0, 0]);
        assert_eq!(edge_samples(&buf, 4), ColorSample::new(240, 240, 240));
    }

    #[test]
    fn test_edge_positions_spread() {
        assert_eq!(edge_positions(10, 1), vec![5]);
        assert_eq!(edge_positions(10, 4), vec![0, 3, 6, 9]);
        assert_eq!(edge_positions(2, 8), vec![0, 1]);
    }
}
