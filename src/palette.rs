//! Biome palette: maps classified pixel colors to biome identifiers.
//!
//! The composer only produces colors. Anything that places tiles or scatters
//! objects reads the biome bitmap through a palette.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::color::{Bitmap, Color};
use crate::grid::Grid;

/// Name of a biome as used by downstream consumers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiomeId(pub String);

impl BiomeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BiomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One color → biome association.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub color: Color,
    pub biome: BiomeId,
}

/// Color → biome lookup with an optional fallback.
///
/// Colors are matched on R, G and B; alpha is ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PaletteFile", into = "PaletteFile")]
pub struct BiomePalette {
    entries: Vec<PaletteEntry>,
    default_biome: Option<BiomeId>,
    lookup: HashMap<u32, usize>,
}

/// On-disk shape of a palette.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PaletteFile {
    entries: Vec<PaletteEntry>,
    default_biome: Option<BiomeId>,
}

impl From<PaletteFile> for BiomePalette {
    fn from(file: PaletteFile) -> Self {
        let mut palette = BiomePalette::new(file.default_biome);
        for entry in file.entries {
            palette.insert(entry.color, entry.biome);
        }
        palette
    }
}

impl From<BiomePalette> for PaletteFile {
    fn from(palette: BiomePalette) -> Self {
        Self {
            entries: palette.entries,
            default_biome: palette.default_biome,
        }
    }
}

impl BiomePalette {
    pub fn new(default_biome: Option<BiomeId>) -> Self {
        Self {
            default_biome,
            ..Default::default()
        }
    }

    /// Associate a color with a biome. The first mapping of a color wins;
    /// later duplicates are ignored with a warning.
    pub fn insert(&mut self, color: Color, biome: BiomeId) {
        let key = color.rgb_key();
        if let Some(&existing) = self.lookup.get(&key) {
            warn!(
                %color,
                kept = %self.entries[existing].biome,
                ignored = %biome,
                "duplicate palette color"
            );
            return;
        }
        self.lookup.insert(key, self.entries.len());
        self.entries.push(PaletteEntry { color, biome });
    }

    pub fn with(mut self, color: Color, biome: impl Into<String>) -> Self {
        self.insert(color, BiomeId::new(biome));
        self
    }

    pub fn default_biome(&self) -> Option<&BiomeId> {
        self.default_biome.as_ref()
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    /// Biome for a color, falling back to the default biome.
    pub fn resolve(&self, color: Color) -> Option<&BiomeId> {
        self.lookup
            .get(&color.rgb_key())
            .map(|&i| &self.entries[i].biome)
            .or(self.default_biome.as_ref())
    }

    /// Resolve every pixel of a biome bitmap.
    pub fn layout(&self, bitmap: &Bitmap) -> Grid<Option<BiomeId>> {
        let layout = bitmap.par_map(|&c| self.resolve(c).cloned());
        let unmapped = layout.as_slice().iter().filter(|b| b.is_none()).count();
        if unmapped > 0 {
            warn!(unmapped, "pixels with no biome and no default biome");
        }
        layout
    }

    /// Distinct biomes in declaration order, default biome excluded.
    pub fn biomes(&self) -> Vec<&BiomeId> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&&entry.biome) {
                seen.push(&entry.biome);
            }
        }
        seen
    }
}

/// Built-in classification graph and its palette, for runs that don't
/// supply their own. Columns go from dry to wet, rows from low to high.
pub fn builtin_graph() -> (Bitmap, BiomePalette) {
    const OCEAN: Color = Color::rgb(28, 74, 156);
    const SHALLOWS: Color = Color::rgb(64, 140, 200);
    const BEACH: Color = Color::rgb(238, 214, 150);
    const MARSH: Color = Color::rgb(96, 128, 80);
    const DESERT: Color = Color::rgb(222, 190, 110);
    const GRASSLAND: Color = Color::rgb(128, 184, 84);
    const FOREST: Color = Color::rgb(46, 120, 52);
    const JUNGLE: Color = Color::rgb(20, 92, 40);
    const ROCK: Color = Color::rgb(130, 124, 118);
    const SNOW: Color = Color::rgb(245, 248, 250);

    let rows: [[Color; 4]; 5] = [
        [OCEAN, OCEAN, OCEAN, OCEAN],
        [SHALLOWS, SHALLOWS, SHALLOWS, SHALLOWS],
        [BEACH, BEACH, BEACH, MARSH],
        [DESERT, GRASSLAND, FOREST, JUNGLE],
        [ROCK, ROCK, SNOW, SNOW],
    ];
    let graph = Grid::par_from_fn(4, rows.len(), |_, x, y| rows[y][x]);

    let palette = BiomePalette::new(Some(BiomeId::new("ocean")))
        .with(OCEAN, "ocean")
        .with(SHALLOWS, "shallows")
        .with(BEACH, "beach")
        .with(MARSH, "marsh")
        .with(DESERT, "desert")
        .with(GRASSLAND, "grassland")
        .with(FOREST, "forest")
        .with(JUNGLE, "jungle")
        .with(ROCK, "rock")
        .with(SNOW, "snow");

    (graph, palette)
}
