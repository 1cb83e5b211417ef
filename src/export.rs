//! PNG export of generated bitmaps and masks.

use std::path::PathBuf;

use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::color::{Bitmap, Color};
use crate::grid::Grid;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("no export directory configured")]
    MissingDirectory,
    #[error("export directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Where a bitmap is written: `directory/filename.png`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportTarget {
    pub directory: PathBuf,
    /// File stem; `.png` is appended
    pub filename: String,
}

impl ExportTarget {
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }

    /// Full output path.
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.png", self.filename))
    }

    fn check(&self) -> Result<PathBuf, ExportError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ExportError::MissingDirectory);
        }
        if !self.directory.is_dir() {
            return Err(ExportError::DirectoryNotFound(self.directory.clone()));
        }
        Ok(self.path())
    }
}

/// Convert a bitmap into an RGBA image buffer.
pub fn to_image(bitmap: &Bitmap) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::new(bitmap.width() as u32, bitmap.height() as u32);
    for (x, y, &c) in bitmap.iter() {
        img.put_pixel(x as u32, y as u32, Rgba::from(c));
    }
    img
}

/// Render a mask as opaque white (filled) on black (empty).
pub fn mask_bitmap(mask: &Grid<bool>) -> Bitmap {
    mask.par_map(|&filled| if filled { Color::WHITE } else { Color::BLACK })
}

/// Write a bitmap as `directory/filename.png`. The directory must exist.
pub fn export_png(bitmap: &Bitmap, target: &ExportTarget) -> Result<PathBuf, ExportError> {
    let path = target.check()?;
    to_image(bitmap).save(&path)?;
    Ok(path)
}

/// Write a bitmap and log instead of failing. Returns whether a file was written.
pub fn try_export(bitmap: &Bitmap, target: &ExportTarget) -> bool {
    match export_png(bitmap, target) {
        Ok(path) => {
            info!(path = %path.display(), "exported {}x{} bitmap", bitmap.width(), bitmap.height());
            true
        }
        Err(e) => {
            error!(filename = %target.filename, "export skipped: {e}");
            false
        }
    }
}
