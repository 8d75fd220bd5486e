//! Foreground segmentation
//!
//! Two propagation rules share one breadth-first traversal:
//!
//! 1. **CenterFill**: grows the *object* outward from the center pixel,
//!    accepting neighbors whose brightness is within `brightness_threshold`
//!    of the seed. Only works when the subject interior is roughly uniform.
//! 2. **EdgeGradient**: marks strong-gradient pixels and pixels far from the
//!    estimated background color as foreground candidates, then floods the
//!    *background* inward from the border band through everything else.
//!    Whatever the flood never reaches is foreground, enclosed holes included.
//!
//! Masks are flat `Vec<bool>` buffers indexed `y * width + x`.

use std::collections::VecDeque;

use imageproc::gradients::sobel_gradients;
use serde::{Deserialize, Serialize};
use crate::background::{center_seed, BackgroundModel};
use crate::buffer::PixelBuffer;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Four,
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(i32, i32)] {
        const FOUR: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        const EIGHT: [(i32, i32); 8] = [
            (-1, -1), (0, -1), (1, -1),
            (-1, 0), (1, 0),
            (-1, 1), (0, 1), (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    CenterFill,
    EdgeGradient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Propagation rule (default: edge_gradient)
    pub strategy: SegmentationStrategy,
    /// Background estimate used by edge_gradient (default: edge_samples)
    pub background: BackgroundModel,
    /// Neighbor connectivity for the flood (default: four)
    pub connectivity: Connectivity,
    /// Brightness/color delta that still counts as "same region" (default: 30)
    pub brightness_threshold: u8,
    /// Gradient magnitude above which a pixel is an edge (default: 40)
    pub edge_threshold: u8,
    /// Width in pixels of the border band the background flood starts from (default: 2)
    pub tolerance_window: u32,
    /// Samples per edge for `BackgroundModel::EdgeSamples` (default: 8)
    pub sample_grid_size: u32,
    /// Run one majority-smoothing pass after refinement (default: true)
    pub smooth_edges: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            strategy: SegmentationStrategy::EdgeGradient,
            background: BackgroundModel::EdgeSamples,
            connectivity: Connectivity::Four,
            brightness_threshold: 30,
            edge_threshold: 40,
            tolerance_window: 2,
            sample_grid_size: 8,
            smooth_edges: true,
        }
    }
}

// ============================================================================
// MASK
// ============================================================================

/// Per-pixel foreground classification, `true` = keep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, false)
    }

    pub fn filled(width: u32, height: u32, value: bool) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Out-of-bounds coordinates read as background
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.index(x, y).map(|i| self.data[i]).unwrap_or(false)
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = value;
        }
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.foreground_count() as f32 / self.data.len() as f32
    }

    /// True when the pixel is foreground and touches background (or the frame) in its 8-neighborhood
    pub fn is_boundary(&self, x: u32, y: u32) -> bool {
        if !self.get(x, y) {
            return false;
        }
        Connectivity::Eight.offsets().iter().any(|&(dx, dy)| {
            let nx = x as i64 + dx as i64;
            let ny = y as i64 + dy as i64;
            nx < 0 || ny < 0 || !self.get(nx as u32, ny as u32)
        })
    }
}

// ============================================================================
// FLOOD FILL
// ============================================================================

/// Per-pixel traversal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    Queued,
    /// Reached by the flood
    Filled,
    /// Examined and refused by the predicate
    Rejected,
}

/// In-bounds neighbors of `(x, y)`
pub fn neighbors(x: u32, y: u32, width: u32, height: u32, connectivity: Connectivity) -> Vec<(u32, u32)> {
    connectivity
        .offsets()
        .iter()
        .filter_map(|&(dx, dy)| {
            let nx = x as i64 + dx as i64;
            let ny = y as i64 + dy as i64;
            if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64 {
                Some((nx as u32, ny as u32))
            } else {
                None
            }
        })
        .collect()
}

/// Breadth-first flood over a `width x height` grid
///
/// Seeds are always filled. Every other pixel is filled only when reached
/// from a filled neighbor and `accept(index)` holds; a refused pixel is
/// never reconsidered.
pub fn flood_fill<F>(
    width: u32,
    height: u32,
    seeds: &[usize],
    connectivity: Connectivity,
    mut accept: F,
) -> Vec<VisitState>
where
    F: FnMut(usize) -> bool,
{
    let len = width as usize * height as usize;
    let mut state = vec![VisitState::Unvisited; len];
    let mut queue: VecDeque<usize> = VecDeque::new();

    for &seed in seeds {
        if seed < len && state[seed] == VisitState::Unvisited {
            state[seed] = VisitState::Queued;
            queue.push_back(seed);
        }
    }

    while let Some(idx) = queue.pop_front() {
        state[idx] = VisitState::Filled;
        let x = (idx % width as usize) as u32;
        let y = (idx / width as usize) as u32;

        for (nx, ny) in neighbors(x, y, width, height, connectivity) {
            let n = ny as usize * width as usize + nx as usize;
            if state[n] != VisitState::Unvisited {
                continue;
            }
            if accept(n) {
                state[n] = VisitState::Queued;
                queue.push_back(n);
            } else {
                state[n] = VisitState::Rejected;
            }
        }
    }

    state
}

// ============================================================================
// GRADIENT
// ============================================================================

/// Sobel gradient magnitude per pixel, scaled by 1/4 so a hard step of `d`
/// brightness levels reads as roughly `d`
pub fn gradient_magnitude(buffer: &PixelBuffer) -> Vec<u8> {
    sobel_gradients(&buffer.luma_image())
        .pixels()
        .map(|p| (p[0] / 4).min(255) as u8)
        .collect()
}

// ============================================================================
// SEGMENTATION
// ============================================================================

pub fn segment(buffer: &PixelBuffer, config: &SegmentationConfig) -> Mask {
    let mask = match config.strategy {
        SegmentationStrategy::CenterFill => segment_center_fill(buffer, config),
        SegmentationStrategy::EdgeGradient => segment_edge_gradient(buffer, config),
    };

    log::debug!(
        "Segmented {}x{} with {:?}: {:.1}% foreground",
        mask.width(),
        mask.height(),
        config.strategy,
        mask.foreground_ratio() * 100.0
    );

    mask
}

fn segment_center_fill(buffer: &PixelBuffer, config: &SegmentationConfig) -> Mask {
    let (width, height) = buffer.dimensions();
    let brightness = buffer.brightness_plane();
    let target = center_seed(buffer).brightness();
    let threshold = config.brightness_threshold;

    let seed = (height / 2) as usize * width as usize + (width / 2) as usize;
    let states = flood_fill(width, height, &[seed], config.connectivity, |i| {
        brightness[i].abs_diff(target) < threshold
    });

    Mask {
        width,
        height,
        data: states.iter().map(|&s| s == VisitState::Filled).collect(),
    }
}

fn segment_edge_gradient(buffer: &PixelBuffer, config: &SegmentationConfig) -> Mask {
    let (width, height) = buffer.dimensions();
    let gradient = gradient_magnitude(buffer);
    let background = config.background.sample(buffer, config.sample_grid_size);

    let candidate: Vec<bool> = buffer
        .as_image()
        .pixels()
        .zip(gradient.iter())
        .map(|(pixel, &g)| {
            g > config.edge_threshold
                || background.channel_distance(pixel) > config.brightness_threshold
        })
        .collect();

    let band = config.tolerance_window.max(1);
    let mut seeds = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let in_band = x < band || y < band || x >= width.saturating_sub(band) || y >= height.saturating_sub(band);
            let idx = y as usize * width as usize + x as usize;
            if in_band && !candidate[idx] {
                seeds.push(idx);
            }
        }
    }

    let states = flood_fill(width, height, &seeds, config.connectivity, |i| !candidate[i]);

    Mask {
        width,
        height,
        data: states.iter().map(|&s| s != VisitState::Filled).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use proptest::prelude::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const DARK: Rgba<u8> = Rgba([30, 30, 30, 255]);

    /// White canvas with a dark rectangle covering `x0..x1, y0..y1`
    fn rect_on_white(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> PixelBuffer {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 { DARK } else { WHITE }
        });
        PixelBuffer::new(img).unwrap()
    }

    fn settings_for(strategy: SegmentationStrategy) -> SegmentationConfig {
        SegmentationConfig {
            strategy,
            ..SegmentationConfig::default()
        }
    }

    #[test]
    fn test_neighbors_4way() {
        assert_eq!(neighbors(5, 5, 10, 10, Connectivity::Four).len(), 4);
    }

    #[test]
    fn test_neighbors_8way() {
        assert_eq!(neighbors(5, 5, 10, 10, Connectivity::Eight).len(), 8);
    }

    #[test]
    fn test_neighbors_corner() {
        assert_eq!(neighbors(0, 0, 10, 10, Connectivity::Four).len(), 2);
        assert_eq!(neighbors(0, 0, 10, 10, Connectivity::Eight).len(), 3);
    }

    #[test]
    fn test_flood_leaves_no_queued_state() {
        let states = flood_fill(6, 4, &[0], Connectivity::Four, |i| i % 2 == 0);
        assert!(states.iter().all(|&s| s != VisitState::Queued));
        assert_eq!(states[0], VisitState::Filled);
    }

    #[test]
    fn test_center_fill_takes_uniform_object() {
        let buf = rect_on_white(20, 20, 5, 5, 15, 15);
        let mask = segment(&buf, &settings_for(SegmentationStrategy::CenterFill));

        assert_eq!(mask.foreground_count(), 100);
        assert!(mask.get(5, 5));
        assert!(mask.get(14, 14));
        assert!(!mask.get(4, 5));
        assert!(!mask.get(0, 0));
    }

    #[test]
    fn test_center_fill_stops_at_tone_change_inside_object() {
        // Two-tone garment: the fill only keeps the half holding the seed.
        let img = RgbaImage::from_fn(20, 20, |x, y| {
            if !(2..18).contains(&x) || !(2..18).contains(&y) {
                WHITE
            } else if x >= 10 {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([120, 120, 120, 255])
            }
        });
        let buf = PixelBuffer::new(img).unwrap();
        let mask = segment(&buf, &settings_for(SegmentationStrategy::CenterFill));

        assert!(mask.get(12, 10));
        assert!(!mask.get(5, 10));
        assert_eq!(mask.foreground_count(), 8 * 16);
    }

    #[test]
    fn test_center_fill_connectivity() {
        let mut img = RgbaImage::from_pixel(5, 5, WHITE);
        for i in 0..5 {
            img.put_pixel(i, i, DARK);
        }
        let buf = PixelBuffer::new(img).unwrap();

        let mut cfg = settings_for(SegmentationStrategy::CenterFill);
        cfg.connectivity = Connectivity::Four;
        assert_eq!(segment(&buf, &cfg).foreground_count(), 1);

        cfg.connectivity = Connectivity::Eight;
        assert_eq!(segment(&buf, &cfg).foreground_count(), 5);
    }

    #[test]
    fn test_edge_gradient_finds_off_center_object() {
        let buf = rect_on_white(30, 30, 3, 3, 10, 10);
        let mask = segment(&buf, &settings_for(SegmentationStrategy::EdgeGradient));

        for y in 3..10 {
            for x in 3..10 {
                assert!(mask.get(x, y), "object pixel ({}, {}) lost", x, y);
            }
        }
        assert!(!mask.get(0, 0));
        assert!(!mask.get(20, 20));
        assert!(!mask.get(15, 15));
        // Object plus at most a one-pixel gradient ring
        assert!(mask.foreground_count() <= 9 * 9);
    }

    #[test]
    fn test_edge_gradient_keeps_enclosed_holes() {
        // Dark frame around a white hole: the border flood cannot reach the hole.
        let img = RgbaImage::from_fn(30, 30, |x, y| {
            let in_outer = (5..25).contains(&x) && (5..25).contains(&y);
            let in_hole = (10..20).contains(&x) && (10..20).contains(&y);
            if in_outer && !in_hole { DARK } else { WHITE }
        });
        let buf = PixelBuffer::new(img).unwrap();
        let mask = segment(&buf, &settings_for(SegmentationStrategy::EdgeGradient));

        assert!(mask.get(15, 15));
        assert!(!mask.get(1, 1));
    }

    #[test]
    fn test_uniform_image_edge_gradient_is_all_background() {
        let buf = PixelBuffer::new(RgbaImage::from_pixel(8, 8, WHITE)).unwrap();
        let mask = segment(&buf, &settings_for(SegmentationStrategy::EdgeGradient));
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn test_tiny_buffers_do_not_panic() {
        for (w, h) in [(1, 1), (1, 3), (3, 1), (2, 2)] {
            let buf = PixelBuffer::new(RgbaImage::from_pixel(w, h, DARK)).unwrap();
            for strategy in [SegmentationStrategy::CenterFill, SegmentationStrategy::EdgeGradient] {
                let mask = segment(&buf, &settings_for(strategy));
                assert_eq!(mask.dimensions(), (w, h));
            }
        }
    }

    #[test]
    fn test_mask_boundary() {
        let mut mask = Mask::new(5, 5);
        for y in 1..4 {
            for x in 1..4 {
                mask.set(x, y, true);
            }
        }
        assert!(mask.is_boundary(1, 1));
        assert!(!mask.is_boundary(2, 2));
        assert!(!mask.is_boundary(0, 0));
        assert!(Mask::filled(3, 3, true).is_boundary(0, 1));
    }

    fn arb_buffer() -> impl Strategy<Value = PixelBuffer> {
        (1u32..16, 1u32..16)
            .prop_flat_map(|(w, h)| {
                proptest::collection::vec(any::<u8>(), (w * h) as usize)
                    .prop_map(move |levels| {
                        let img = RgbaImage::from_fn(w, h, |x, y| {
                            let v = levels[(y * w + x) as usize];
                            Rgba([v, v, v, 255])
                        });
                        PixelBuffer::new(img).unwrap()
                    })
            })
    }

    proptest! {
        #[test]
        fn prop_mask_matches_buffer_dimensions(
            buf in arb_buffer(),
            center in any::<bool>(),
            eight in any::<bool>(),
        ) {
            let mut cfg = settings_for(if center {
                SegmentationStrategy::CenterFill
            } else {
                SegmentationStrategy::EdgeGradient
            });
            cfg.connectivity = if eight { Connectivity::Eight } else { Connectivity::Four };
            let mask = segment(&buf, &cfg);
            prop_assert_eq!(mask.dimensions(), buf.dimensions());
            prop_assert_eq!(mask.as_slice().len(), buf.pixel_count());
        }

        #[test]
        fn prop_center_fill_keeps_seed(buf in arb_buffer(), threshold in any::<u8>()) {
            let mut cfg = settings_for(SegmentationStrategy::CenterFill);
            cfg.brightness_threshold = threshold;
            let mask = segment(&buf, &cfg);
            let (w, h) = buf.dimensions();
            prop_assert!(mask.get(w / 2, h / 2));
        }
    }
}
