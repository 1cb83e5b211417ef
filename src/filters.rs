//! Image filters for noise bitmaps and externally supplied images.
//!
//! Every filter reads its source bitmap and returns a new one; sources are
//! never modified. Per-pixel filters run through [`Grid::par_map`], the
//! bilateral filter through [`Grid::par_from_fn`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::color::{Bitmap, Color};
use crate::grid::Grid;

/// Largest magnitude accepted for contrast and saturation amounts.
pub const MAX_ADJUSTMENT: f32 = 254.99;

/// Gamma exponents are clamped to this range.
pub const GAMMA_RANGE: (f32, f32) = (0.0, 2.0);

/// Bilateral filter settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralParams {
    /// Window radius; the window is (2k+1)² pixels
    pub kernel_size: usize,
    /// Spatial falloff (sigma in pixels)
    pub spatial_weight: f32,
    /// Intensity falloff (sigma in intensity units, 0-255)
    pub intensity_weight: f32,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            kernel_size: 2,
            spatial_weight: 3.0,
            intensity_weight: 30.0,
        }
    }
}

/// `2σ²`, kept strictly positive so a zero sigma cuts every neighbour off
/// instead of dividing by zero.
fn two_sigma_squared(sigma: f32) -> f32 {
    let v = 2.0 * sigma * sigma;
    if v > 0.0 { v } else { f32::MIN_POSITIVE }
}

/// Edge-preserving blur on grayscale intensity.
///
/// Output pixels are gray (R = G = B = filtered intensity) and keep the
/// source alpha. The centre pixel contributes no weight of its own, so a
/// pixel with no in-bounds neighbours (or whose neighbour weights all
/// underflow) is passed through unchanged.
pub fn bilateral(src: &Bitmap, params: &BilateralParams) -> Bitmap {
    let k = params.kernel_size as i64;
    let spatial_denom = two_sigma_squared(params.spatial_weight);
    let intensity_denom = two_sigma_squared(params.intensity_weight);

    Grid::par_from_fn(src.width(), src.height(), |idx, x, y| {
        let centre = src.as_slice()[idx];
        let centre_intensity = centre.intensity();
        let (x, y) = (x as i64, y as i64);

        let mut weight_sum = 0.0f32;
        let mut weighted = 0.0f32;

        for ny in y - k..=y + k {
            for nx in x - k..=x + k {
                if nx == x && ny == y {
                    continue;
                }
                let Some(neighbour) = src.get_checked(nx, ny) else {
                    continue;
                };

                let (dx, dy) = ((nx - x) as f32, (ny - y) as f32);
                let spatial = (dx * dx + dy * dy) / spatial_denom;
                let neighbour_intensity = neighbour.intensity();
                let diff = centre_intensity - neighbour_intensity;
                let range = diff * diff / intensity_denom;

                let weight = (-spatial - range).exp();
                weight_sum += weight;
                weighted += neighbour_intensity * weight;
            }
        }

        if weight_sum <= 0.0 || !weight_sum.is_finite() {
            return centre;
        }

        let v = (weighted / weight_sum).round().clamp(0.0, 255.0) as u8;
        Color::new(v, v, v, centre.a)
    })
}

/// Mean grayscale intensity of the whole bitmap, 0 when empty.
///
/// Computed as a running mean so large images don't accumulate a huge sum.
pub fn average_brightness(src: &Bitmap) -> f32 {
    let mut mean = 0.0f32;
    for (i, c) in src.as_slice().iter().enumerate() {
        mean += (c.intensity() - mean) / (i + 1) as f32;
    }
    mean
}

/// Clamp a contrast or saturation amount into (-255, 255).
pub fn clamp_adjustment(amount: f32) -> f32 {
    let clamped = amount.clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
    if clamped != amount {
        warn!(amount, clamped, "adjustment outside (-255, 255), clamping");
    }
    clamped
}

fn adjustment_factor(amount: f32) -> f32 {
    (255.0 + amount) / (255.0 - amount)
}

fn to_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Stretch every channel away from (or towards) the image's mean brightness.
pub fn contrast(src: &Bitmap, amount: f32) -> Bitmap {
    let alpha = adjustment_factor(clamp_adjustment(amount));
    let mean = average_brightness(src);
    let adjust = |c: u8| to_channel((alpha * (c as f32 - mean) + mean).round() as i32);

    src.par_map(|c| Color::new(adjust(c.r), adjust(c.g), adjust(c.b), c.a))
}

/// Add `delta` to every color channel.
pub fn brightness(src: &Bitmap, delta: f32) -> Bitmap {
    let adjust = |c: u8| (c as f32 + delta).clamp(0.0, 255.0) as u8;

    src.par_map(|c| Color::new(adjust(c.r), adjust(c.g), adjust(c.b), c.a))
}

/// Push each channel away from (or towards) the pixel's own intensity.
pub fn saturation(src: &Bitmap, amount: f32) -> Bitmap {
    let alpha = adjustment_factor(clamp_adjustment(amount));

    src.par_map(|c| {
        let intensity = c.intensity();
        let adjust = |ch: u8| to_channel((alpha * (ch as f32 - intensity) + intensity) as i32);
        Color::new(adjust(c.r), adjust(c.g), adjust(c.b), c.a)
    })
}

/// Power-law adjustment: `255 * (c / 255)^gamma`, gamma clamped to [0, 2].
pub fn gamma(src: &Bitmap, gamma: f32) -> Bitmap {
    let (lo, hi) = GAMMA_RANGE;
    let g = gamma.clamp(lo, hi);
    if g != gamma {
        warn!(gamma, clamped = g, "gamma outside [0, 2], clamping");
    }
    let adjust = |c: u8| to_channel((255.0 * (c as f32 / 255.0).powf(g)).round() as i32);

    src.par_map(|c| Color::new(adjust(c.r), adjust(c.g), adjust(c.b), c.a))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_bitmap(width: usize, height: usize) -> Bitmap {
        Grid::par_from_fn(width, height, |idx, _, _| {
            let v = (idx * 37 % 256) as u8;
            Color::new(v, 255 - v, v / 2, 200)
        })
    }

    #[test]
    fn test_bilateral_single_pixel_passes_through() {
        let src = Grid::new_with(1, 1, Color::new(10, 200, 30, 77));
        let out = bilateral(&src, &BilateralParams::default());
        assert_eq!(*out.get(0, 0), Color::new(10, 200, 30, 77));
    }

    #[test]
    fn test_bilateral_zero_sigma_passes_through() {
        let src = gradient_bitmap(6, 6);
        let params = BilateralParams { kernel_size: 1, spatial_weight: 0.0, intensity_weight: 10.0 };
        assert_eq!(bilateral(&src, &params), src);
    }

    #[test]
    fn test_bilateral_flat_image_stays_flat() {
        let src = Grid::new_with(8, 8, Color::new(90, 90, 90, 255));
        let out = bilateral(&src, &BilateralParams::default());
        assert!(out.as_slice().iter().all(|c| c.r == 90 && c.g == 90 && c.b == 90));
    }

    #[test]
    fn test_bilateral_preserves_hard_edge() {
        let src = Grid::par_from_fn(10, 4, |_, x, _| if x < 5 { Color::gray(0) } else { Color::gray(255) });
        let params = BilateralParams { kernel_size: 2, spatial_weight: 2.0, intensity_weight: 5.0 };
        let out = bilateral(&src, &params);
        assert_eq!(out.get(4, 2).r, 0);
        assert_eq!(out.get(5, 2).r, 255);
    }

    #[test]
    fn test_bilateral_is_gray_and_keeps_alpha() {
        let out = bilateral(&gradient_bitmap(7, 5), &BilateralParams::default());
        assert!(out.as_slice().iter().all(|c| c.r == c.g && c.g == c.b && c.a == 200));
    }

    #[test]
    fn test_average_brightness() {
        assert_eq!(average_brightness(&Grid::new(0, 0)), 0.0);

        let mut src = Grid::new_with(2, 1, Color::gray(0));
        src.set(1, 0, Color::gray(255));
        assert!((average_brightness(&src) - 127.5).abs() < 1e-3);
    }

    #[test]
    fn test_contrast_amount_is_clamped() {
        assert_eq!(clamp_adjustment(1000.0), 254.99);
        assert_eq!(clamp_adjustment(-1000.0), -254.99);
        assert_eq!(clamp_adjustment(12.5), 12.5);
    }

    #[test]
    fn test_adjustments_stay_in_channel_range() {
        let src = gradient_bitmap(16, 16);
        for amount in [-1000.0, -254.0, -10.0, 0.0, 10.0, 254.0, 1000.0] {
            let c = contrast(&src, amount);
            let s = saturation(&src, amount);
            let b = brightness(&src, amount);
            assert!(c.as_slice().iter().chain(s.as_slice()).chain(b.as_slice()).all(|px| px.a == 200));
        }

        let b = brightness(&src, 1000.0);
        assert!(b.as_slice().iter().all(|px| px.r == 255 && px.g == 255 && px.b == 255));
        let b = brightness(&src, -1000.0);
        assert!(b.as_slice().iter().all(|px| px.r == 0 && px.g == 0 && px.b == 0));
    }

    #[test]
    fn test_max_contrast_splits_around_mean() {
        let mut src = Grid::new_with(2, 1, Color::gray(100));
        src.set(1, 0, Color::gray(150));
        let out = contrast(&src, 1000.0);
        assert_eq!(out.get(0, 0).r, 0);
        assert_eq!(out.get(1, 0).r, 255);
    }

    #[test]
    fn test_saturation_leaves_grays_alone() {
        let src = Grid::par_from_fn(4, 4, |idx, _, _| Color::gray((idx * 16) as u8));
        assert_eq!(saturation(&src, 200.0), src);
        assert_eq!(saturation(&src, -200.0), src);
    }

    #[test]
    fn test_full_desaturation_goes_gray() {
        let src = Grid::new_with(1, 1, Color::rgb(200, 100, 0));
        let out = saturation(&src, -1000.0);
        let c = out.get(0, 0);
        assert!((c.r as i32 - 100).abs() <= 1);
        assert!((c.g as i32 - 100).abs() <= 1);
        assert!((c.b as i32 - 100).abs() <= 1);
    }

    #[test]
    fn test_gamma() {
        let src = gradient_bitmap(8, 8);
        assert_eq!(gamma(&src, 1.0), src);

        let out = gamma(&Grid::new_with(1, 1, Color::gray(64)), 5.0);
        // clamped to 2: 255 * (64/255)^2 = 16.06
        assert_eq!(out.get(0, 0).r, 16);

        let out = gamma(&Grid::new_with(1, 1, Color::gray(64)), -1.0);
        assert_eq!(out.get(0, 0).r, 255);
    }
}
