use std::path::{Path, PathBuf};

use crate::config::{PipelineConfig, CONFIG_FILE_NAME};

/// Locations of every file the pipeline reads or writes.
///
/// Relative paths in the config are resolved against `root`; absolute paths
/// are used as they are.
#[derive(Clone, Debug)]
pub struct DataPaths {
    root: PathBuf,
}

/// The three files making up a persisted dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePaths {
    pub images: PathBuf,
    pub labels: PathBuf,
    pub manifest: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Returns the config file: `<root>/captcha_config.json`
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn image_dir(&self, config: &PipelineConfig) -> PathBuf {
        self.resolve(&config.image_dir)
    }

    pub fn label_file(&self, config: &PipelineConfig) -> PathBuf {
        self.resolve(&config.label_file)
    }

    pub fn cache(&self, config: &PipelineConfig) -> CachePaths {
        CachePaths {
            images: self.resolve(&config.cache.images_file),
            labels: self.resolve(&config.cache.labels_file),
            manifest: self.resolve(&config.cache.manifest_file),
        }
    }

    /// Returns the logs directory: `<root>/logs/`
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("captcha_digits.log")
    }

    /// Ensures all output directories exist. Call at startup.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.logs_dir())
    }
}
