//! Edge-preserving 3x3 smoothing.
//!
//! A texel is pulled towards its neighbourhood average only when every
//! channel of that average is already close to it, so hard shadow edges
//! survive while speckle noise is flattened.

use std::ops::{Add, Mul};

use rayon::prelude::*;

use crate::texel::{FColor, LightImage};

/// Below this amount the filter does nothing.
const MIN_AMOUNT: f32 = 0.001;

/// Pixel types the filter runs on.
pub trait Smoothable: Copy + Default + Send + Sync + Add<Output = Self> + Mul<f32, Output = Self> {
    /// True when every channel of `self` and `other` differs by less than `tolerance`.
    fn is_near(self, other: Self, tolerance: f32) -> bool;
}

impl Smoothable for f32 {
    fn is_near(self, other: Self, tolerance: f32) -> bool {
        (self - other).abs() < tolerance
    }
}

impl Smoothable for FColor {
    fn is_near(self, other: Self, tolerance: f32) -> bool {
        (self.r - other.r).abs() < tolerance && (self.g - other.g).abs() < tolerance && (self.b - other.b).abs() < tolerance
    }
}

/// Blend each texel with its 3x3 average by `amount` where the average lies
/// within `tolerance`. Edge texels reuse the nearest row and column.
#[tracing::instrument(skip_all, fields(tolerance, amount))]
pub fn smooth_image<T: Smoothable>(image: &mut LightImage<T>, tolerance: f32, amount: f32) {
    let (w, h) = (image.width(), image.height());
    if amount <= MIN_AMOUNT || w < 2 || h < 2 {
        return;
    }
    let source = image.clone();
    let amount = amount.min(1.0);

    image.pixels_mut().par_chunks_mut(w as usize).enumerate().for_each(|(y, row)| {
        let y = y as i32;
        for (x, out) in row.iter_mut().enumerate() {
            let x = x as i32;
            let avg = neighbourhood_average(&source, x, y);
            let centre = *out;
            if avg.is_near(centre, tolerance) {
                *out = avg * amount + centre * (1.0 - amount);
            }
        }
    });
}

fn neighbourhood_average<T: Smoothable>(image: &LightImage<T>, x: i32, y: i32) -> T {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    let mut total = T::default();
    for dy in -1..=1 {
        for dx in -1..=1 {
            let sx = (x + dx).clamp(0, max_x) as u32;
            let sy = (y + dy).clamp(0, max_y) as u32;
            total = total + image[(sx, sy)];
        }
    }
    total * (1.0 / 9.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speckle_is_flattened() {
        let mut im = LightImage::filled(5, 5, 0.5f32);
        im[(2, 2)] = 0.55;
        smooth_image(&mut im, 0.1, 1.0);
        assert!((im[(2, 2)] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_hard_edge_survives() {
        let mut im = LightImage::new(6, 6);
        for y in 0..6 {
            for x in 3..6 {
                im[(x, y)] = FColor::WHITE;
            }
        }
        let before = im.clone();
        smooth_image(&mut im, 0.1, 1.0);
        // texels beside the edge see an average a third of the way across
        assert_eq!(im[(2, 3)], before[(2, 3)]);
        assert_eq!(im[(3, 3)], before[(3, 3)]);
        assert_eq!(im[(0, 0)], FColor::BLACK);
    }

    #[test]
    fn test_tiny_amount_is_noop() {
        let mut im = LightImage::filled(4, 4, 0.2f32);
        im[(1, 1)] = 0.25;
        let before = im.clone();
        smooth_image(&mut im, 1.0, 0.0005);
        assert_eq!(im, before);
    }

    #[test]
    fn test_single_row_is_noop() {
        let mut im = LightImage::filled(4, 1, 0.2f32);
        im[(1, 0)] = 0.25;
        let before = im.clone();
        smooth_image(&mut im, 1.0, 1.0);
        assert_eq!(im, before);
    }
}
