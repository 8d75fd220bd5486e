//! Mask refinement
//!
//! `refine` reclaims anti-aliased transition pixels: a background pixel next to
//! the foreground is promoted when its brightness is within `edge_threshold` of
//! the foreground pixel it touches. It is a single dilation ring computed
//! against a snapshot of the input mask. Running it again grows the mask by
//! another ring, so callers apply it exactly once.
//!
//! `smooth` is an optional majority pass that fills pinholes and drops specks.

use crate::buffer::PixelBuffer;
use crate::segmentation::{neighbors, Connectivity, Mask};

pub fn refine(mask: &Mask, buffer: &PixelBuffer, edge_threshold: u8) -> Mask {
    let (width, height) = mask.dimensions();
    let mut refined = mask.clone();

    for y in 0..height {
        for x in 0..width {
            if !mask.get(x, y) {
                continue;
            }
            let Some(fg) = buffer.brightness(x, y) else {
                continue;
            };

            for (nx, ny) in neighbors(x, y, width, height, Connectivity::Eight) {
                if mask.get(nx, ny) || refined.get(nx, ny) {
                    continue;
                }
                if let Some(bg) = buffer.brightness(nx, ny) {
                    if fg.abs_diff(bg) < edge_threshold {
                        refined.set(nx, ny, true);
                    }
                }
            }
        }
    }

    refined
}

/// One majority pass over the 8-neighborhood (frame counts as background)
pub fn smooth(mask: &Mask) -> Mask {
    let (width, height) = mask.dimensions();
    let mut smoothed = mask.clone();

    for y in 0..height {
        for x in 0..width {
            let foreground_neighbors = neighbors(x, y, width, height, Connectivity::Eight)
                .into_iter()
                .filter(|&(nx, ny)| mask.get(nx, ny))
                .count();

            if mask.get(x, y) {
                if foreground_neighbors <= 1 {
                    smoothed.set(x, y, false);
                }
            } else if foreground_neighbors >= 6 {
                smoothed.set(x, y, true);
            }
        }
    }

    smoothed
}
