/// Engine configuration
///
/// Stored as JSON in the user's config directory:
/// - Linux: ~/.config/media-catalogue/config.json
/// - macOS: ~/Library/Application Support/media-catalogue/config.json
/// - Windows: %APPDATA%\media-catalogue\config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::media::Size;

/// Default grid cell at 100% scale
pub const DEFAULT_THUMBNAIL_SIZE: Size = Size::new(285, 150);

/// Size slider bounds, in percent of `thumbnail_size`
pub const SIZE_SCALE_RANGE: std::ops::RangeInclusive<u32> = 1..=300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read or write config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("malformed config {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Decode slots. 0 = one per available CPU
    pub max_concurrent_decodes: usize,
    /// Async runtime threads; decoding itself runs on the blocking pool
    pub worker_threads: usize,
    /// Target box for new thumbnails at 100% scale
    pub thumbnail_size: Size,
    /// Size slider value (1..=300)
    pub size_scale_percent: u32,
    /// Grid spacing in pixels, passed through to the display
    pub item_spacing: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_concurrent_decodes: 0,
            worker_threads: 2,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            size_scale_percent: 100,
            item_spacing: 5,
        }
    }
}

impl CatalogConfig {
    /// Get the path where the config should be stored
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("media-catalogue");
        path.push("config.json");
        Some(path)
    }

    /// Load from the default location, falling back to defaults when no file exists
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)
    }

    /// Resolve the 0 sentinel to the machine's parallelism
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrent_decodes > 0 {
            return self.max_concurrent_decodes;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// `thumbnail_size` scaled by the size slider
    pub fn scaled_thumbnail_size(&self) -> Size {
        let percent = self
            .size_scale_percent
            .clamp(*SIZE_SCALE_RANGE.start(), *SIZE_SCALE_RANGE.end());
        self.thumbnail_size.scaled_percent(percent)
    }
}
