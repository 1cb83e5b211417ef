//! Island composition: two noise fields, a square falloff and a biome lookup.
//!
//! Pipeline:
//! 1. Height and moisture bitmaps from their own [`NoiseParameters`], each
//!    optionally adjusted (contrast, brightness, bilateral)
//! 2. Square gradient that is dark in the middle and bright at the edges
//! 3. Classification: moisture picks the graph column, height minus gradient
//!    picks the row
//! 4. Height bitmap rewritten in place as height minus gradient
//! 5. Optional majority smoothing of biome boundaries

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::automata::COMPASS;
use crate::color::{Bitmap, Color};
use crate::export::try_export;
use crate::filters;
use crate::grid::Grid;
use crate::noise_field::{self, NoiseParameters};
use crate::seeds::IslandSeeds;

/// A pixel with more same-colored cells than this in its 3×3 block is left alone.
pub const SMOOTH_UPPER_THRESHOLD: usize = 4;
/// A pixel with fewer same-colored cells than this in its 3×3 block may be recolored.
pub const SMOOTH_LOWER_THRESHOLD: usize = 4;

/// Everything needed to compose an island apart from the classification graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IslandSettings {
    pub width: usize,
    pub height: usize,
    pub smooth_biomes: bool,
    pub height_map: NoiseParameters,
    pub moisture_map: NoiseParameters,
}

impl Default for IslandSettings {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            smooth_biomes: true,
            height_map: NoiseParameters::with_seed(1),
            moisture_map: NoiseParameters::with_seed(2),
        }
    }
}

impl IslandSettings {
    /// Take the height and moisture seeds from a seed set.
    pub fn with_seeds(mut self, seeds: &IslandSeeds) -> Self {
        self.height_map.seed = seeds.height;
        self.moisture_map.seed = seeds.moisture;
        self
    }

    pub fn compose(&self, graph: &Bitmap) -> IslandLayers {
        compose_layers(
            &self.moisture_map,
            &self.height_map,
            graph,
            (self.width, self.height),
            self.smooth_biomes,
        )
    }
}

/// Output of a composition together with the layers it was built from.
#[derive(Clone, Debug)]
pub struct IslandLayers {
    pub biomes: Bitmap,
    /// Height after the gradient has been subtracted
    pub height: Bitmap,
    pub moisture: Bitmap,
    pub gradient: Bitmap,
}

/// Generate a noise bitmap and apply the adjustments its parameters ask for,
/// in order: contrast, brightness, bilateral.
pub fn filtered_field(width: usize, height: usize, params: &NoiseParameters) -> Bitmap {
    let mut bitmap = noise_field::generate_bitmap(width, height, params);
    if params.contrast != 0.0 {
        bitmap = filters::contrast(&bitmap, params.contrast);
    }
    if params.brightness != 0.0 {
        bitmap = filters::brightness(&bitmap, params.brightness);
    }
    if params.apply_bilateral_filter {
        bitmap = filters::bilateral(&bitmap, &params.bilateral);
    }
    bitmap
}

/// Square falloff: 0 at the centre, 255 along the edges, cubic in between.
pub fn radial_gradient(width: usize, height: usize) -> Bitmap {
    let half = (width / 2).min(height / 2);

    Grid::par_from_fn(width, height, |_, x, y| {
        if half == 0 {
            return Color::WHITE;
        }
        let fx = x.min(width - x);
        let fy = y.min(height - y);
        let g = 1.0 - fx.min(fy) as f32 / half as f32;
        Color::gray((255.0 * g * g * g).clamp(0.0, 255.0) as u8)
    })
}

/// Subtract the gradient from the height bitmap channel by channel,
/// saturating at 0. Rewritten pixels are opaque.
pub fn subtract_gradient_in_place(height: &mut Bitmap, gradient: &Bitmap) {
    if height.width() != gradient.width() || height.height() != gradient.height() {
        warn!(
            height = ?(height.width(), height.height()),
            gradient = ?(gradient.width(), gradient.height()),
            "gradient does not match height map, leaving it unchanged"
        );
        return;
    }

    height
        .as_mut_slice()
        .par_iter_mut()
        .zip(gradient.as_slice().par_iter())
        .for_each(|(h, g)| {
            *h = Color::new(h.r.saturating_sub(g.r), h.g.saturating_sub(g.g), h.b.saturating_sub(g.b), 255);
        });
}

/// Graph cell for one pixel. Intensities are in [0, 1]; the result is always
/// inside a non-empty `graph_width × graph_height` graph.
pub fn graph_cell(
    moisture: f32,
    height: f32,
    gradient: f32,
    graph_width: usize,
    graph_height: usize,
) -> (usize, usize) {
    let gx = (graph_width as f32 * moisture).round().max(0.0) as usize;
    let gy = (graph_height as f32 * (height - gradient)).round().max(0.0) as usize;
    (gx.min(graph_width.saturating_sub(1)), gy.min(graph_height.saturating_sub(1)))
}

/// Look every pixel up in the classification graph.
///
/// `height` is the height bitmap before the gradient is subtracted. All three
/// layers must share a size; the graph may be any non-empty size.
pub fn classify(height: &Bitmap, moisture: &Bitmap, gradient: &Bitmap, graph: &Bitmap) -> Bitmap {
    let (width, h) = (height.width(), height.height());
    if graph.is_empty() {
        error!("classification graph is empty, island left blank");
        return Grid::new(width, h);
    }
    let same_size = |b: &Bitmap| b.width() == width && b.height() == h;
    if !same_size(moisture) || !same_size(gradient) {
        error!(
            height = ?(width, h),
            moisture = ?(moisture.width(), moisture.height()),
            gradient = ?(gradient.width(), gradient.height()),
            "island layers differ in size, island left blank"
        );
        return Grid::new(width, h);
    }

    Grid::par_from_fn(width, h, |idx, _, _| {
        let (gx, gy) = graph_cell(
            moisture.as_slice()[idx].unit_intensity(),
            height.as_slice()[idx].unit_intensity(),
            gradient.as_slice()[idx].unit_intensity(),
            graph.width(),
            graph.height(),
        );
        *graph.get(gx, gy)
    })
}

/// Majority smoothing of biome boundaries, in place and in row-major order.
///
/// A pixel with fewer than [`SMOOTH_LOWER_THRESHOLD`] same-colored cells in
/// its 3×3 block (itself included) tallies its neighbours' colors, picks the
/// most frequent one among its compass neighbours, and takes that color only
/// if its frequency exceeds the same-color count. Later pixels see earlier
/// rewrites.
pub fn smooth_biomes(bitmap: &mut Bitmap) {
    let (width, height) = (bitmap.width(), bitmap.height());
    let mut tally: HashMap<u32, usize> = HashMap::with_capacity(8);
    let mut changed = 0usize;

    for idx in 0..bitmap.len() {
        let (x, y) = (idx % width, idx / width);
        let (x, y) = (x as i64, y as i64);
        let centre = bitmap.as_slice()[idx];

        let mut same = 0;
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if bitmap.get_checked(nx, ny).is_some_and(|c| c.same_rgb(&centre)) {
                    same += 1;
                }
            }
        }

        // Dominant in its block
        if same > SMOOTH_UPPER_THRESHOLD {
            continue;
        }
        // Not a minority either
        if same >= SMOOTH_LOWER_THRESHOLD {
            continue;
        }

        tally.clear();
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx == x && ny == y {
                    continue;
                }
                if let Some(c) = bitmap.get_checked(nx, ny) {
                    *tally.entry(c.rgb_key()).or_insert(0) += 1;
                }
            }
        }

        let mut best: Option<(u32, usize)> = None;
        for &(dx, dy) in &COMPASS {
            let Some(c) = bitmap.get_checked(x + dx, y + dy) else {
                continue;
            };
            let key = c.rgb_key();
            if let Some(&freq) = tally.get(&key) {
                if best.map_or(true, |(_, f)| freq > f) {
                    best = Some((key, freq));
                }
            }
        }

        if let Some((key, freq)) = best {
            if freq > same {
                bitmap.as_mut_slice()[idx] = Color::from_rgb_key(key);
                changed += 1;
            }
        }
    }

    debug!(width, height, changed, "biome boundaries smoothed");
}

/// Compose an island and return the biome bitmap.
pub fn compose(
    moisture_params: &NoiseParameters,
    height_params: &NoiseParameters,
    graph: &Bitmap,
    dimensions: (usize, usize),
    smooth: bool,
) -> Bitmap {
    compose_layers(moisture_params, height_params, graph, dimensions, smooth).biomes
}

/// Compose an island and keep the intermediate layers.
///
/// The moisture bitmap is exported (if asked for) before classification, the
/// height bitmap after the gradient has been subtracted from it.
pub fn compose_layers(
    moisture_params: &NoiseParameters,
    height_params: &NoiseParameters,
    graph: &Bitmap,
    dimensions: (usize, usize),
    smooth: bool,
) -> IslandLayers {
    let (width, height) = dimensions;

    let mut height_map = filtered_field(width, height, height_params);
    let moisture = filtered_field(width, height, moisture_params);
    if moisture_params.save_texture {
        try_export(&moisture, &moisture_params.export);
    }

    let gradient = radial_gradient(width, height);
    let mut biomes = classify(&height_map, &moisture, &gradient, graph);

    subtract_gradient_in_place(&mut height_map, &gradient);
    if height_params.save_texture {
        try_export(&height_map, &height_params.export);
    }

    if smooth {
        smooth_biomes(&mut biomes);
    }

    debug!(
        width,
        height,
        graph = ?(graph.width(), graph.height()),
        smooth,
        "island composed"
    );

    IslandLayers {
        biomes,
        height: height_map,
        moisture,
        gradient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportTarget;

    const SAND: Color = Color::rgb(240, 220, 130);
    const GRASS: Color = Color::rgb(60, 160, 60);
    const WATER: Color = Color::rgb(20, 60, 200);
    const SNOW: Color = Color::rgb(250, 250, 250);

    fn graph() -> Bitmap {
        let mut g = Grid::new_with(2, 2, WATER);
        g.set(1, 0, SAND);
        g.set(0, 1, GRASS);
        g.set(1, 1, SNOW);
        g
    }

    #[test]
    fn test_gradient_shape() {
        let g = radial_gradient(10, 10);
        assert_eq!(g.get(0, 0).r, 255);
        assert_eq!(g.get(5, 5).r, 0);
        // d = 2, half = 5: (1 - 0.4)^3 * 255 = 55.08
        assert_eq!(g.get(2, 5).r, 55);
        assert!(g.as_slice().iter().all(|c| c.r == c.g && c.g == c.b && c.a == 255));
        for x in 1..=5 {
            assert!(g.get(x, 5).r <= g.get(x - 1, 5).r);
        }
    }

    #[test]
    fn test_gradient_of_tiny_image() {
        assert_eq!(*radial_gradient(1, 1).get(0, 0), Color::WHITE);
        assert!(radial_gradient(1, 9).as_slice().iter().all(|&c| c == Color::WHITE));
    }

    #[test]
    fn test_graph_cell_stays_in_bounds() {
        let steps = [0.0, 0.1, 0.5, 0.99, 1.0];
        for (gw, gh) in [(1, 1), (2, 3), (7, 5), (256, 256)] {
            for &m in &steps {
                for &h in &steps {
                    for &g in &steps {
                        let (gx, gy) = graph_cell(m, h, g, gw, gh);
                        assert!(gx < gw && gy < gh, "({m}, {h}, {g}) -> ({gx}, {gy}) in {gw}x{gh}");
                    }
                }
            }
        }
        assert_eq!(graph_cell(1.0, 1.0, 0.0, 4, 4), (3, 3));
        assert_eq!(graph_cell(0.0, 0.0, 1.0, 4, 4), (0, 0));
    }

    #[test]
    fn test_classify_lookup() {
        let height = Grid::new_with(1, 1, Color::WHITE);
        let moisture = Grid::new_with(1, 1, Color::BLACK);
        let gradient = Grid::new_with(1, 1, Color::BLACK);
        let out = classify(&height, &moisture, &gradient, &graph());
        assert_eq!(*out.get(0, 0), GRASS);

        let out = classify(&height, &Grid::new_with(1, 1, Color::WHITE), &gradient, &graph());
        assert_eq!(*out.get(0, 0), SNOW);

        let out = classify(&height, &moisture, &Grid::new_with(1, 1, Color::WHITE), &graph());
        assert_eq!(*out.get(0, 0), WATER);
    }

    #[test]
    fn test_empty_graph_leaves_island_blank() {
        let layer = Grid::new_with(3, 2, Color::gray(100));
        let out = classify(&layer, &layer, &layer, &Grid::new(0, 0));
        assert_eq!((out.width(), out.height()), (3, 2));
        assert!(out.as_slice().iter().all(|&c| c == Color::default()));
    }

    #[test]
    fn test_subtract_gradient_in_place() {
        let mut height = Grid::new_with(2, 1, Color::new(200, 200, 200, 10));
        height.set(1, 0, Color::gray(10));
        let gradient = Grid::new_with(2, 1, Color::gray(50));

        subtract_gradient_in_place(&mut height, &gradient);
        assert_eq!(*height.get(0, 0), Color::gray(150));
        assert_eq!(*height.get(1, 0), Color::gray(0));
    }

    #[test]
    fn test_smoothing_absorbs_lone_pixel() {
        let mut bitmap = Grid::new_with(5, 5, SAND);
        bitmap.set(2, 2, WATER);
        smooth_biomes(&mut bitmap);
        assert!(bitmap.as_slice().iter().all(|c| c.same_rgb(&SAND)));
    }

    #[test]
    fn test_smoothing_sees_earlier_rewrites() {
        let mut bitmap = Grid::from_vec(3, 1, vec![SAND, WATER, SAND]).unwrap();
        smooth_biomes(&mut bitmap);
        assert_eq!(bitmap.as_slice(), &[SAND, SAND, SAND]);
    }

    #[test]
    fn test_smoothing_leaves_pixel_at_threshold() {
        // Centre has exactly SMOOTH_LOWER_THRESHOLD sand cells and five water
        // neighbours; it is not below the threshold, so it stays sand.
        #[rustfmt::skip]
        let mut bitmap = Grid::from_vec(3, 3, vec![
            WATER, WATER, WATER,
            SAND,  SAND,  SAND,
            SAND,  WATER, WATER,
        ])
        .unwrap();
        smooth_biomes(&mut bitmap);
        assert_eq!(*bitmap.get(1, 1), SAND);
    }

    #[test]
    fn test_smoothing_needs_frequency_above_count() {
        // Each color appears twice; the best rival frequency (2) never exceeds
        // the pixel's own count (2), so nothing changes.
        let mut bitmap = Grid::from_vec(2, 2, vec![SAND, WATER, WATER, SAND]).unwrap();
        let before = bitmap.clone();
        smooth_biomes(&mut bitmap);
        assert_eq!(bitmap, before);
    }

    #[test]
    fn test_compose_is_deterministic_and_uses_graph_colors() {
        let settings = IslandSettings {
            width: 48,
            height: 40,
            ..Default::default()
        };
        let a = settings.compose(&graph());
        let b = settings.compose(&graph());
        assert_eq!(a.biomes, b.biomes);
        assert_eq!((a.biomes.width(), a.biomes.height()), (48, 40));

        let palette = [SAND, GRASS, WATER, SNOW];
        assert!(a.biomes.as_slice().iter().all(|c| palette.contains(c)));
        // The corner is fully masked by the gradient, so it lands on the lowest row.
        assert!(matches!(*a.biomes.get(0, 0), WATER | SAND));
    }

    #[test]
    fn test_compose_matches_layers() {
        let settings = IslandSettings {
            width: 24,
            height: 24,
            smooth_biomes: false,
            ..Default::default()
        };
        let layers = settings.compose(&graph());
        let biomes = compose(&settings.moisture_map, &settings.height_map, &graph(), (24, 24), false);
        assert_eq!(layers.biomes, biomes);
        assert_eq!(layers.gradient, radial_gradient(24, 24));
    }

    #[test]
    fn test_compose_exports_layers() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = IslandSettings {
            width: 16,
            height: 12,
            ..Default::default()
        };
        settings.height_map.save_texture = true;
        settings.height_map.export = ExportTarget::new(dir.path(), "height");
        settings.moisture_map.save_texture = true;
        settings.moisture_map.export = ExportTarget::new(dir.path(), "moisture");

        let layers = settings.compose(&graph());

        let saved = image::open(dir.path().join("height.png")).unwrap().to_rgba8();
        for (x, y, &c) in layers.height.iter() {
            assert_eq!(Color::from(*saved.get_pixel(x as u32, y as u32)), c);
        }
        assert!(dir.path().join("moisture.png").exists());
    }

    #[test]
    fn test_filtered_field_applies_adjustments() {
        let params = NoiseParameters {
            brightness: 300.0,
            ..NoiseParameters::with_seed(4)
        };
        let bright = filtered_field(8, 8, &params);
        assert!(bright.as_slice().iter().all(|&c| c == Color::WHITE));
    }
}
