//! Multi-octave simplex noise fields.
//!
//! A field is produced in three passes:
//! 1. Per-pixel octave sum (parallel, no cross-pixel dependency)
//! 2. Global min/max reduction
//! 3. Linear remap of every sample into [0, 1]
//!
//! The seed only chooses a random offset per octave; the simplex permutation
//! table is fixed and shared read-only by every worker, so a given seed,
//! size and parameter set always reproduces the same field.

use noise::{NoiseFn, Simplex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::color::{Bitmap, Color};
use crate::export::ExportTarget;
use crate::filters::BilateralParams;
use crate::grid::Grid;

/// Permutation table shared by every field.
const PERMUTATION_SEED: u32 = 0;

/// Octave offsets are drawn from this half-open integer range on both axes.
const OCTAVE_OFFSET_RANGE: std::ops::Range<i32> = -100_000..100_000;

/// Parameters for one noise field and the filters applied to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParameters {
    pub seed: u64,
    /// Frequency multiplier per octave
    pub lacunarity: f64,
    /// Feature size in pixels (higher = larger features)
    pub scale: f64,
    /// Amplitude multiplier per octave, expected in (0, 1]
    pub persistence: f64,

    /// Contrast adjustment in (-255, 255); 0 disables it
    pub contrast: f32,
    /// Brightness delta added to every channel; 0 disables it
    pub brightness: f32,

    pub apply_bilateral_filter: bool,
    pub bilateral: BilateralParams,

    /// Write the (filtered) field to disk after generation
    pub save_texture: bool,
    pub export: ExportTarget,
}

impl Default for NoiseParameters {
    fn default() -> Self {
        Self {
            seed: 0,
            lacunarity: 2.0,
            scale: 64.0,
            persistence: 0.5,
            contrast: 0.0,
            brightness: 0.0,
            apply_bilateral_filter: false,
            bilateral: BilateralParams::default(),
            save_texture: false,
            export: ExportTarget::default(),
        }
    }
}

impl NoiseParameters {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Default::default() }
    }
}

/// Minimum and maximum of a raw field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRange {
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    pub const EMPTY: FieldRange = FieldRange { min: f64::MAX, max: f64::MIN };

    fn include(self, v: f64) -> Self {
        Self { min: self.min.min(v), max: self.max.max(v) }
    }

    fn merge(self, other: Self) -> Self {
        Self { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Number of octaves for a field: log2 of the longest side rounded up to a
/// power of two.
pub fn octave_count(width: usize, height: usize) -> u32 {
    width.max(height).max(1).next_power_of_two().trailing_zeros()
}

/// Per-octave sample offsets drawn from the seeded stream.
fn octave_offsets(seed: u64, octaves: u32) -> Vec<[f64; 2]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..octaves)
        .map(|_| {
            let x = rng.gen_range(OCTAVE_OFFSET_RANGE) as f64;
            let y = rng.gen_range(OCTAVE_OFFSET_RANGE) as f64;
            [x, y]
        })
        .collect()
}

/// Sum all octaves at every pixel without normalising.
pub fn generate_raw(width: usize, height: usize, params: &NoiseParameters, offset: [f64; 2]) -> Grid<f64> {
    let octaves = octave_offsets(params.seed, octave_count(width, height));
    let simplex = Simplex::new(PERMUTATION_SEED);

    let scale = if params.scale.abs() < f64::EPSILON {
        warn!(scale = params.scale, "noise scale is zero, sampling at scale 1");
        1.0
    } else {
        params.scale
    };
    let half_w = width as f64 / 2.0;
    let half_h = height as f64 / 2.0;

    Grid::par_from_fn(width, height, |_, x, y| {
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut total = 0.0;

        for octave in &octaves {
            let sx = (x as f64 + offset[0] - half_w) / scale * frequency + octave[0];
            let sy = (y as f64 + offset[1] - half_h) / scale * frequency + octave[1];
            total += simplex.get([sx, sy]) * amplitude;

            frequency *= params.lacunarity;
            amplitude *= params.persistence;
        }

        total
    })
}

/// Global min/max over a raw field.
pub fn field_range(raw: &Grid<f64>) -> FieldRange {
    raw.as_slice()
        .par_iter()
        .fold(|| FieldRange::EMPTY, |range, &v| range.include(v))
        .reduce(|| FieldRange::EMPTY, FieldRange::merge)
}

/// Remap a raw field into [0, 1]. A flat field maps to all zeros.
pub fn normalize(raw: &Grid<f64>, range: FieldRange) -> Grid<f64> {
    let span = range.span();
    if !(span > 0.0 && span.is_finite()) {
        return raw.par_map(|_| 0.0);
    }
    raw.par_map(|&v| (v - range.min) / span)
}

/// Generate a normalized field centred on the origin.
pub fn generate(width: usize, height: usize, params: &NoiseParameters) -> Grid<f64> {
    generate_with_offset(width, height, params, [0.0, 0.0])
}

/// Generate a normalized field with the sample window shifted by `offset` pixels.
pub fn generate_with_offset(
    width: usize,
    height: usize,
    params: &NoiseParameters,
    offset: [f64; 2],
) -> Grid<f64> {
    let raw = generate_raw(width, height, params, offset);
    let range = field_range(&raw);
    debug!(
        width,
        height,
        seed = params.seed,
        octaves = octave_count(width, height),
        min = range.min,
        max = range.max,
        "noise field sampled"
    );
    normalize(&raw, range)
}

/// Rasterise a normalized field to an opaque grayscale bitmap.
pub fn to_bitmap(field: &Grid<f64>) -> Bitmap {
    field.par_map(|&v| Color::gray((v.clamp(0.0, 1.0) * 255.0).round() as u8))
}

/// Generate a field and rasterise it in one call.
pub fn generate_bitmap(width: usize, height: usize, params: &NoiseParameters) -> Bitmap {
    to_bitmap(&generate(width, height, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extremes(field: &Grid<f64>) -> (f64, f64) {
        field.as_slice().iter().fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    #[test]
    fn test_octave_count() {
        assert_eq!(octave_count(1, 1), 0);
        assert_eq!(octave_count(2, 1), 1);
        assert_eq!(octave_count(100, 50), 7);
        assert_eq!(octave_count(64, 128), 7);
        assert_eq!(octave_count(129, 3), 8);
    }

    #[test]
    fn test_field_is_normalized() {
        for seed in [1, 42, 9001] {
            let field = generate(48, 32, &NoiseParameters::with_seed(seed));
            let (lo, hi) = extremes(&field);
            assert!(lo.abs() < 1e-9, "min was {lo}");
            assert!((hi - 1.0).abs() < 1e-9, "max was {hi}");
        }
    }

    #[test]
    fn test_same_seed_same_field() {
        let params = NoiseParameters::with_seed(7);
        assert_eq!(generate(40, 40, &params), generate(40, 40, &params));
    }

    #[test]
    fn test_different_seed_different_field() {
        let a = generate(32, 32, &NoiseParameters::with_seed(1));
        let b = generate(32, 32, &NoiseParameters::with_seed(2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_offset_shifts_window() {
        let params = NoiseParameters::with_seed(3);
        let raw = generate_raw(16, 16, &params, [0.0, 0.0]);
        let shifted = generate_raw(16, 16, &params, [4.0, 0.0]);
        for y in 0..16 {
            for x in 0..12 {
                assert!((raw.get(x + 4, y) - shifted.get(x, y)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_single_pixel_is_degenerate_not_nan() {
        let field = generate(1, 1, &NoiseParameters::default());
        assert_eq!(field.as_slice(), &[0.0]);
    }

    #[test]
    fn test_bitmap_is_gray_and_opaque() {
        let bitmap = generate_bitmap(16, 8, &NoiseParameters::with_seed(5));
        assert!(bitmap.as_slice().iter().all(|c| c.r == c.g && c.g == c.b && c.a == 255));
        assert!(bitmap.as_slice().iter().any(|c| c.r == 0));
        assert!(bitmap.as_slice().iter().any(|c| c.r == 255));
    }
}
