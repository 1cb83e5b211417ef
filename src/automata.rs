//! Cellular automata masks.
//!
//! A mask goes through a fixed sequence of stages:
//! 1. Randomized: every cell filled with probability `fill_percent`
//!    (border cells may be pinned by the [`BorderRule`])
//! 2. Smoothed: `iteration_count` neighbour-threshold passes, each one
//!    reading only the fully computed previous pass
//! 3. Cleaned: isolated diagonal "pseudo-square" corners and orphan cells
//!    are erased
//! 4. Rotated (optional): affine rotation about the grid centre
//!
//! Seeded masks consume a single random stream in index order, so the same
//! phrase always gives the same mask. Unseeded masks draw every cell from its
//! own stream and are filled in parallel.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::Grid;
use crate::seeds::seed_from_phrase;

/// Policy for the outermost ring of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BorderRule {
    /// Border cells are always filled
    AddBorder,
    /// Border cells are always empty
    StripBorder,
    /// Border cells are treated like any other cell
    #[default]
    Nothing,
}

impl BorderRule {
    /// Value the border is pinned to, if any.
    pub fn pinned(self) -> Option<bool> {
        match self {
            BorderRule::AddBorder => Some(true),
            BorderRule::StripBorder => Some(false),
            BorderRule::Nothing => None,
        }
    }
}

/// Rules for generating an automata mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomataRules {
    /// Phrase seeding the fill; empty means a fresh random fill every call
    pub seed: String,
    pub iteration_count: usize,
    /// Fill probability in percent, clamped to [0, 100]
    pub fill_percent: i32,
    /// A cell whose 3×3 count (self included) is below this becomes empty
    pub lower_bound_rule: usize,
    /// A cell whose 3×3 count (self included) is above this becomes filled
    pub upper_bound_rule: usize,
    pub border_rule: BorderRule,
}

impl Default for AutomataRules {
    fn default() -> Self {
        Self {
            seed: String::new(),
            iteration_count: 5,
            fill_percent: 45,
            lower_bound_rule: 4,
            upper_bound_rule: 4,
            border_rule: BorderRule::StripBorder,
        }
    }
}

impl AutomataRules {
    fn clamped_fill(&self) -> i32 {
        let fill = self.fill_percent.clamp(0, 100);
        if fill != self.fill_percent {
            warn!(fill_percent = self.fill_percent, clamped = fill, "fill percent outside [0, 100], clamping");
        }
        fill
    }
}

/// Where a mask is in its generation sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutomataStage {
    Randomized,
    /// Number of smoothing passes applied so far
    Smoothed(usize),
    Cleaned,
    Rotated,
}

/// A boolean mask together with the stage it has reached.
#[derive(Clone, Debug)]
pub struct AutomataGrid {
    cells: Grid<bool>,
    stage: AutomataStage,
}

impl AutomataGrid {
    /// Random fill according to the rules' seed, fill percent and border rule.
    pub fn randomized(width: usize, height: usize, rules: &AutomataRules) -> Self {
        Self {
            cells: randomize(width, height, rules),
            stage: AutomataStage::Randomized,
        }
    }

    /// Apply every smoothing pass the rules ask for.
    pub fn smoothed(mut self, rules: &AutomataRules) -> Self {
        let done = match self.stage {
            AutomataStage::Smoothed(n) => n,
            _ => 0,
        };
        self.cells = smooth(&self.cells, rules);
        self.stage = AutomataStage::Smoothed(done + rules.iteration_count);
        self
    }

    /// Erase pseudo-square corners and orphan cells.
    pub fn cleaned(mut self) -> Self {
        self.cells = cleanup(&self.cells);
        self.stage = AutomataStage::Cleaned;
        self
    }

    /// Rotate about the centre by `angle` degrees.
    pub fn rotated(mut self, angle: f64) -> Self {
        self.cells = rotate(&self.cells, angle);
        self.stage = AutomataStage::Rotated;
        self
    }

    pub fn stage(&self) -> AutomataStage {
        self.stage
    }

    pub fn cells(&self) -> &Grid<bool> {
        &self.cells
    }

    pub fn into_cells(self) -> Grid<bool> {
        self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        *self.cells.get(x, y)
    }
}

/// Randomize, smooth and clean a mask.
pub fn generate(width: usize, height: usize, rules: &AutomataRules) -> Grid<bool> {
    let mask = AutomataGrid::randomized(width, height, rules)
        .smoothed(rules)
        .cleaned()
        .into_cells();
    debug!(
        width,
        height,
        iterations = rules.iteration_count,
        filled = mask.as_slice().iter().filter(|&&c| c).count(),
        "automata mask generated"
    );
    mask
}

fn is_border(x: usize, y: usize, width: usize, height: usize) -> bool {
    x == 0 || y == 0 || x == width - 1 || y == height - 1
}

/// Random initial fill.
///
/// With a seed phrase the random stream is consumed strictly in index order;
/// pinned border cells do not consume a draw. Without one, every cell draws
/// from its own stream derived from a fresh base seed.
pub fn randomize(width: usize, height: usize, rules: &AutomataRules) -> Grid<bool> {
    let fill = rules.clamped_fill();
    let pinned = rules.border_rule.pinned();

    if rules.seed.is_empty() {
        let base_seed: u64 = rand::random();
        return Grid::par_from_fn(width, height, |idx, x, y| {
            if let (true, Some(v)) = (is_border(x, y, width, height), pinned) {
                return v;
            }
            let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(idx as u64));
            rng.gen_range(0..100) < fill
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed_from_phrase(&rules.seed));
    let mut cells = Grid::new_with(width, height, false);
    for (idx, cell) in cells.as_mut_slice().iter_mut().enumerate() {
        let (x, y) = (idx % width, idx / width);
        *cell = match (is_border(x, y, width, height), pinned) {
            (true, Some(v)) => v,
            _ => rng.gen_range(0..100) < fill,
        };
    }
    cells
}

/// Number of filled cells in the 3×3 block centred on `(x, y)`, self included.
fn block_count(cells: &Grid<bool>, x: usize, y: usize) -> usize {
    let (x, y) = (x as i64, y as i64);
    let mut count = 0;
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if cells.get_checked(nx, ny) == Some(&true) {
                count += 1;
            }
        }
    }
    count
}

/// One smoothing pass. Every cell reads the previous pass only.
pub fn smooth_step(prev: &Grid<bool>, rules: &AutomataRules) -> Grid<bool> {
    let (width, height) = (prev.width(), prev.height());
    let pinned = rules.border_rule.pinned();

    Grid::par_from_fn(width, height, |idx, x, y| {
        if let (true, Some(v)) = (is_border(x, y, width, height), pinned) {
            return v;
        }

        let count = block_count(prev, x, y);
        let mut value = prev.as_slice()[idx];
        if count > rules.upper_bound_rule {
            value = true;
        }
        if count < rules.lower_bound_rule {
            value = false;
        }
        value
    })
}

/// Run `rules.iteration_count` smoothing passes.
pub fn smooth(cells: &Grid<bool>, rules: &AutomataRules) -> Grid<bool> {
    let mut current = cells.clone();
    for _ in 0..rules.iteration_count {
        current = smooth_step(&current, rules);
    }
    current
}

// =============================================================================
// CLEANUP
// =============================================================================

/// The eight compass neighbours in neighbour-mask bit order: counter-clockwise
/// from east in 45° steps, with +y as north. Bit `i` of a mask is set when
/// `COMPASS[i]` is filled.
pub const COMPASS: [(i64, i64); 8] = [
    (1, 0),   // E
    (1, 1),   // NE
    (0, 1),   // N
    (-1, 1),  // NW
    (-1, 0),  // W
    (-1, -1), // SW
    (0, -1),  // S
    (1, -1),  // SE
];

/// An L-shaped run of exactly three filled compass neighbours. Left alone,
/// these leave diagonal staircase corners after smoothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PseudoSquareCorner {
    /// E, NE and N filled
    NorthEast,
    /// N, NW and W filled
    NorthWest,
    /// W, SW and S filled
    SouthWest,
    /// S, SE and E filled
    SouthEast,
}

impl PseudoSquareCorner {
    pub const ALL: [PseudoSquareCorner; 4] = [
        PseudoSquareCorner::NorthEast,
        PseudoSquareCorner::NorthWest,
        PseudoSquareCorner::SouthWest,
        PseudoSquareCorner::SouthEast,
    ];

    /// Neighbour mask of the corner.
    pub const fn mask(self) -> u8 {
        match self {
            PseudoSquareCorner::NorthEast => 0b0000_0111,
            PseudoSquareCorner::NorthWest => 0b0001_1100,
            PseudoSquareCorner::SouthWest => 0b0111_0000,
            PseudoSquareCorner::SouthEast => 0b1100_0001,
        }
    }

    /// Match a full neighbour mask against the four corners.
    pub fn from_mask(mask: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|corner| corner.mask() == mask)
    }
}

/// Pack the eight compass neighbours of `(x, y)` into a mask. Out-of-range
/// neighbours count as empty.
pub fn neighbour_mask(cells: &Grid<bool>, x: usize, y: usize) -> u8 {
    let (x, y) = (x as i64, y as i64);
    COMPASS.iter().enumerate().fold(0u8, |mask, (bit, &(dx, dy))| {
        if cells.get_checked(x + dx, y + dy) == Some(&true) {
            mask | (1 << bit)
        } else {
            mask
        }
    })
}

/// True when every in-range cell at Chebyshev distance exactly 2 is empty.
fn outer_ring_empty(cells: &Grid<bool>, x: usize, y: usize) -> bool {
    let (x, y) = (x as i64, y as i64);
    for dy in -2i64..=2 {
        for dx in -2i64..=2 {
            if dx.abs() != 2 && dy.abs() != 2 {
                continue;
            }
            if cells.get_checked(x + dx, y + dy) == Some(&true) {
                return false;
            }
        }
    }
    true
}

/// Erase isolated pseudo-square corners.
///
/// A cell whose neighbour mask is one of the [`PseudoSquareCorner`]s and
/// whose outer 5×5 ring is empty is cleared together with its eight
/// neighbours. Detection reads the input only; every other cell passes
/// through.
pub fn remove_squares(cells: &Grid<bool>) -> Grid<bool> {
    let hits: Vec<(usize, usize)> = (0..cells.len())
        .into_par_iter()
        .filter_map(|idx| {
            let (x, y) = cells.coords(idx);
            PseudoSquareCorner::from_mask(neighbour_mask(cells, x, y))
                .filter(|_| outer_ring_empty(cells, x, y))
                .map(|_| (x, y))
        })
        .collect();

    let mut out = cells.clone();
    for &(x, y) in &hits {
        out.set(x, y, false);
        for &(dx, dy) in &COMPASS {
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if out.in_bounds(nx, ny) {
                out.set(nx as usize, ny as usize, false);
            }
        }
    }

    if !hits.is_empty() {
        debug!(count = hits.len(), "pseudo-square corners removed");
    }
    out
}

/// Clear filled cells with no filled orthogonal (N/E/S/W) neighbour.
pub fn remove_orphans(cells: &Grid<bool>) -> Grid<bool> {
    Grid::par_from_fn(cells.width(), cells.height(), |idx, x, y| {
        if !cells.as_slice()[idx] {
            return false;
        }
        let (x, y) = (x as i64, y as i64);
        COMPASS
            .iter()
            .step_by(2)
            .any(|&(dx, dy)| cells.get_checked(x + dx, y + dy) == Some(&true))
    })
}

/// Square removal followed by orphan removal.
pub fn cleanup(cells: &Grid<bool>) -> Grid<bool> {
    remove_orphans(&remove_squares(cells))
}

// =============================================================================
// ROTATION
// =============================================================================

/// Rotate a mask by `angle` degrees about its centre into a same-sized grid.
///
/// Each destination pixel centre is mapped back through the inverse rotation
/// and takes the nearest source pixel; sources outside the grid are empty.
pub fn rotate(cells: &Grid<bool>, angle: f64) -> Grid<bool> {
    let (width, height) = (cells.width(), cells.height());
    let (ss, cs) = (-angle).to_radians().sin_cos();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    Grid::par_from_fn(width, height, |_, x, y| {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        let sx = (cx + dx * cs + dy * ss - 0.5).round() as i64;
        let sy = (cy - dx * ss + dy * cs - 0.5).round() as i64;
        cells.get_checked(sx, sy).copied().unwrap_or(false)
    })
}

/// Size of the bounding box that would hold the whole rotated grid.
pub fn rotated_extent(width: usize, height: usize, angle: f64) -> (usize, usize) {
    let (sin, cos) = angle.to_radians().sin_cos();
    let (w, h) = (width as f64, height as f64);
    let new_width = (w * cos).abs() + (h * sin).abs();
    let new_height = (h * cos).abs() + (w * sin).abs();
    (new_width.round() as usize + 1, new_height.round() as usize + 1)
}

// =============================================================================
// REGIONS
// =============================================================================

/// Flat indices of every 8-connected region of filled cells, in scan order
/// of each region's first cell.
pub fn regions(cells: &Grid<bool>) -> Vec<Vec<usize>> {
    let mut visited = vec![false; cells.len()];
    let mut found = Vec::new();

    for start in 0..cells.len() {
        if visited[start] || !cells.as_slice()[start] {
            continue;
        }

        let mut region = Vec::new();
        let mut queue = VecDeque::new();
        visited[start] = true;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            region.push(idx);
            let (x, y) = cells.coords(idx);
            for &(dx, dy) in &COMPASS {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if cells.get_checked(nx, ny) != Some(&true) {
                    continue;
                }
                let n = cells.index(nx as usize, ny as usize);
                if !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        found.push(region);
    }

    found
}

/// Clear every region whose cells carry more than one distinct label.
///
/// Cells labelled `None` don't count towards either side. A layer of a
/// different size is ignored and the mask returned as is.
pub fn prune_mixed_regions<L: PartialEq>(cells: &Grid<bool>, layer: &Grid<Option<L>>) -> Grid<bool> {
    if cells.width() != layer.width() || cells.height() != layer.height() {
        warn!(
            mask = ?(cells.width(), cells.height()),
            layer = ?(layer.width(), layer.height()),
            "label layer does not match mask size, skipping region pruning"
        );
        return cells.clone();
    }

    let mut out = cells.clone();
    let mut pruned = 0;
    for region in regions(cells) {
        let mut labels = region.iter().filter_map(|&idx| layer.as_slice()[idx].as_ref());
        let mixed = match labels.next() {
            Some(first) => labels.any(|label| label != first),
            None => false,
        };
        if mixed {
            pruned += 1;
            for idx in region {
                out.as_mut_slice()[idx] = false;
            }
        }
    }

    if pruned > 0 {
        debug!(pruned, "regions straddling several labels cleared");
    }
    out
}
