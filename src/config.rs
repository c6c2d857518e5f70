//! Pipeline configuration.
//!
//! Loads settings from captcha_config.json. Every geometric constant of the
//! pipeline (composite size, digit regions, tile size, class count, split
//! boundary) lives here so it can be overridden without rebuilding.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, DatasetResult};
use crate::extract::{DigitRegion, TileGeometry};

/// Default config file name, looked up in the data root.
pub const CONFIG_FILE_NAME: &str = "captcha_config.json";

/// Where the digits sit inside a composite image.
///
/// All regions share `top`, `width` and `height`; only the left edge varies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionLayout {
    /// Left edge of each digit region, in reading order
    pub left_offsets: Vec<u32>,
    /// Top edge shared by all regions
    pub top: u32,
    /// Actual width of a digit inside the composite image
    pub width: u32,
    /// Rows scanned per region
    pub height: u32,
}

impl Default for RegionLayout {
    fn default() -> Self {
        Self {
            left_offsets: vec![20, 32, 44, 56, 68],
            top: 6,
            width: 14,
            height: 20,
        }
    }
}

impl RegionLayout {
    /// Expands the layout into one rectangle per digit, in reading order.
    pub fn regions(&self) -> Vec<DigitRegion> {
        self.left_offsets
            .iter()
            .map(|&left| DigitRegion {
                left,
                top: self.top,
                width: self.width,
                height: self.height,
            })
            .collect()
    }
}

/// Size of the normalized cell every digit is padded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
        }
    }
}

/// File names of the persisted dataset, relative to the data root.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Set to false to always recompute from raw images
    pub enabled: bool,
    /// Little-endian f32 blob holding every tile
    pub images_file: PathBuf,
    /// u8 blob holding one one-hot row per tile
    pub labels_file: PathBuf,
    pub manifest_file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            images_file: PathBuf::from("dataset_images.bin"),
            labels_file: PathBuf::from("dataset_labels.bin"),
            manifest_file: PathBuf::from("dataset_manifest.json"),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Width of a composite captcha image
    pub image_width: u32,
    /// Height of a composite captcha image
    pub image_height: u32,
    pub regions: RegionLayout,
    pub tile: TileConfig,
    /// Number of label classes (one-hot width)
    pub num_classes: usize,
    /// Split boundary in tiles: tiles before it train, tiles after it test
    pub train_tiles: usize,
    /// Seed for the shuffle indices. None draws fresh randomness per load.
    pub seed: Option<u64>,
    /// Decode worker threads. None uses one per core.
    pub workers: Option<usize>,
    /// Directory holding the composite images
    pub image_dir: PathBuf,
    /// Extension of composite image files (without the dot)
    pub image_extension: String,
    /// JSON list of label strings, in dataset order
    pub label_file: PathBuf,
    pub cache: CacheConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: 100,
            image_height: 32,
            regions: RegionLayout::default(),
            tile: TileConfig::default(),
            num_classes: 10,
            // 850 training images of 5 digits each
            train_tiles: 850 * 5,
            seed: None,
            workers: None,
            image_dir: PathBuf::from("captchas/1"),
            image_extension: "jpg".to_string(),
            label_file: PathBuf::from("labels.json"),
            cache: CacheConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load config from file, or return defaults if the file is missing or broken.
    pub fn load(config_path: &Path) -> Self {
        if config_path.exists() {
            match Self::load_strict(config_path) {
                Ok(config) => {
                    crate::log(&format!("Loaded config from {}", config_path.display()));
                    return config;
                }
                Err(e) => {
                    crate::log(&format!("{}. Using defaults.", e));
                }
            }
        } else {
            crate::log(&format!(
                "{} not found. Using default config.",
                config_path.display()
            ));
        }
        Self::default()
    }

    /// Load config from file, failing if it cannot be read or parsed.
    pub fn load_strict(config_path: &Path) -> DatasetResult<Self> {
        let contents =
            fs::read_to_string(config_path).map_err(|e| DatasetError::io(config_path, e))?;
        serde_json::from_str(&contents).map_err(|source| DatasetError::Json {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Save default config to file (for reference).
    pub fn save_default(config_path: &Path) -> DatasetResult<()> {
        let json = serde_json::to_string_pretty(&Self::default()).map_err(|source| {
            DatasetError::Json {
                path: config_path.to_path_buf(),
                source,
            }
        })?;
        fs::write(config_path, json).map_err(|e| DatasetError::io(config_path, e))
    }

    /// Number of digits per composite image.
    pub fn digits_per_image(&self) -> usize {
        self.regions.left_offsets.len()
    }

    /// Number of values in one tile.
    pub fn tile_size(&self) -> usize {
        self.tile.width as usize * self.tile.height as usize
    }

    /// Checks the configuration and derives the extraction geometry from it.
    pub fn geometry(&self) -> DatasetResult<TileGeometry> {
        self.validate()?;
        TileGeometry::new(self.regions.regions(), self.tile.width, self.tile.height)
    }

    pub fn validate(&self) -> DatasetResult<()> {
        if self.regions.left_offsets.is_empty() {
            return Err(DatasetError::Config("no digit regions configured".into()));
        }
        if self.num_classes == 0 || self.num_classes > 10 {
            return Err(DatasetError::Config(format!(
                "num_classes must be between 1 and 10 for decimal labels, got {}",
                self.num_classes
            )));
        }
        if self.tile.width == 0 || self.tile.height == 0 {
            return Err(DatasetError::Config("tile dimensions must be non-zero".into()));
        }
        for region in self.regions.regions() {
            region.check_bounds()?;
            if region.right() > self.image_width || region.bottom() > self.image_height {
                return Err(DatasetError::Config(format!(
                    "region at left={} top={} ({}x{}) falls outside the {}x{} composite image",
                    region.left,
                    region.top,
                    region.width,
                    region.height,
                    self.image_width,
                    self.image_height
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_captcha_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.digits_per_image(), 5);
        assert_eq!(config.tile_size(), 400);
        assert_eq!(config.train_tiles, 4250);

        let regions = config.regions.regions();
        assert_eq!(regions[0].left, 20);
        assert_eq!(regions[4].left, 68);
        assert!(regions.iter().all(|r| r.top == 6 && r.width == 14));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        let geometry = config.geometry().unwrap();
        assert_eq!(geometry.pad_left(), 3);
        assert_eq!(geometry.pad_right(), 3);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "train_tiles": 100, "tile": { "width": 16 } }"#).unwrap();

        let config = PipelineConfig::load_strict(&path).unwrap();
        assert_eq!(config.train_tiles, 100);
        assert_eq!(config.tile.width, 16);
        assert_eq!(config.tile.height, 20);
        assert_eq!(config.regions, RegionLayout::default());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config.num_classes, 10);
    }

    #[test]
    fn test_load_strict_rejects_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::load_strict(&path),
            Err(DatasetError::Json { .. })
        ));
    }

    #[test]
    fn test_save_default_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        PipelineConfig::save_default(&path).unwrap();

        let loaded = PipelineConfig::load_strict(&path).unwrap();
        assert_eq!(loaded.regions, RegionLayout::default());
        assert_eq!(loaded.image_extension, "jpg");
    }

    #[test]
    fn test_validate_rejects_region_outside_image() {
        let mut config = PipelineConfig::default();
        config.regions.left_offsets.push(90);
        assert!(matches!(config.validate(), Err(DatasetError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_overflowing_offset() {
        let mut config = PipelineConfig::default();
        config.regions.top = u32::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_validate_rejects_region_wider_than_tile() {
        let mut config = PipelineConfig::default();
        config.tile.width = 10;
        assert!(matches!(config.geometry(), Err(DatasetError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_too_many_classes() {
        let mut config = PipelineConfig::default();
        config.num_classes = 11;
        assert!(config.validate().is_err());
    }
}
