//! JSON run configuration and classification-graph loading.
//!
//! Every struct is `#[serde(default)]`, so a config file only needs the
//! fields it wants to change. Parameter ranges are clamped by the operations
//! themselves, not here; loading only rejects zero-sized outputs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::automata::AutomataRules;
use crate::color::{Bitmap, Color};
use crate::grid::Grid;
use crate::island::IslandSettings;
use crate::palette::BiomePalette;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid {what} dimensions {width}x{height}")]
    InvalidDimensions {
        what: &'static str,
        width: usize,
        height: usize,
    },
}

/// Automata mask settings for a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomataConfig {
    pub width: usize,
    pub height: usize,
    pub rules: AutomataRules,
    /// Rotation in degrees applied after cleanup; 0 skips it
    pub rotation: f64,
}

impl Default for AutomataConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            rules: AutomataRules::default(),
            rotation: 0.0,
        }
    }
}

/// Everything a CLI run needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Master seed; when set, it overrides the per-layer seeds
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
    pub island: IslandSettings,
    /// PNG used as the classification graph; the built-in graph when absent
    pub classification_graph: Option<PathBuf>,
    /// Palette for biome statistics; the built-in palette when absent
    pub palette: Option<BiomePalette>,
    pub automata: AutomataConfig,
}

impl RunConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_dimensions("island", self.island.width, self.island.height)?;
        check_dimensions("automata", self.automata.width, self.automata.height)
    }
}

fn check_dimensions(what: &'static str, width: usize, height: usize) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::InvalidDimensions { what, width, height });
    }
    Ok(())
}

/// Load any image the `image` crate can decode as an RGBA bitmap.
pub fn load_bitmap(path: &Path) -> Result<Bitmap, ConfigError> {
    let img = image::open(path)
        .map_err(|source| ConfigError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    check_dimensions("image", width, height)?;

    let data = img.pixels().map(|&px| Color::from(px)).collect();
    Grid::from_vec(width, height, data).map_err(|_| ConfigError::InvalidDimensions {
        what: "image",
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::BorderRule;
    use crate::export::{export_png, ExportTarget};

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "seed": 99,
            "island": { "width": 64, "height_map": { "scale": 32.0 } },
            "automata": { "rules": { "seed": "caves", "border_rule": "AddBorder" } }
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.seed, Some(99));
        assert_eq!(config.island.width, 64);
        assert_eq!(config.island.height, IslandSettings::default().height);
        assert_eq!(config.island.height_map.scale, 32.0);
        assert_eq!(config.island.height_map.lacunarity, 2.0);
        assert_eq!(config.automata.rules.seed, "caves");
        assert_eq!(config.automata.rules.border_rule, BorderRule::AddBorder);
        assert_eq!(config.automata.rules.fill_percent, AutomataRules::default().fill_percent);
        assert!(config.classification_graph.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = RunConfig::default();
        config.seed = Some(5);
        config.automata.rotation = 30.0;

        config.save(&path).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "island": { "width": 0 } }"#).unwrap();

        let err = RunConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDimensions { what: "island", width: 0, .. }));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(RunConfig::load(&dir.path().join("nope.json")), Err(ConfigError::Io { .. })));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RunConfig::load(&path), Err(ConfigError::Json { .. })));
        assert!(matches!(load_bitmap(&path), Err(ConfigError::Image { .. })));
    }

    #[test]
    fn test_load_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Grid::new_with(3, 2, Color::rgb(1, 2, 3));
        graph.set(2, 1, Color::rgb(200, 100, 50));
        let path = export_png(&graph, &ExportTarget::new(dir.path(), "graph")).unwrap();

        assert_eq!(load_bitmap(&path).unwrap(), graph);
    }
}
