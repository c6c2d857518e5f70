//! Error types for dataset building, caching and sampling.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// The raster decoded fine but does not cover every configured region.
    #[error(
        "image {path} is {width}x{height}, regions require at least {required_width}x{required_height}"
    )]
    ImageTooSmall {
        path: PathBuf,
        width: u32,
        height: u32,
        required_width: u32,
        required_height: u32,
    },
    #[error("label {label:?} rejected: {msg}")]
    LabelMismatch { label: String, msg: String },
    #[error("cache file {path} holds {actual} bytes, expected {expected}")]
    CacheSizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    /// The cache blobs have the right size but were built for another layout.
    #[error("cache at {path} is stale: {msg}")]
    StaleCache { path: PathBuf, msg: String },
    #[error("split boundary {boundary} exceeds {total} tiles")]
    IndexOutOfRange { boundary: usize, total: usize },
    #[error("{split} split is empty, nothing to sample")]
    EmptyRange { split: &'static str },
    /// A shuffle index was paired with a range of a different size.
    #[error("shuffle index over {index_len} tiles cannot sample the {range_len}-tile {split} split")]
    ShuffleMismatch {
        split: &'static str,
        index_len: usize,
        range_len: usize,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that mean "the cache on disk cannot be used", as opposed
    /// to errors in the raw inputs or configuration.
    pub fn is_cache_rejection(&self) -> bool {
        matches!(
            self,
            DatasetError::CacheSizeMismatch { .. }
                | DatasetError::StaleCache { .. }
                | DatasetError::Io { .. }
                | DatasetError::Json { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_rejection_kinds() {
        let size = DatasetError::CacheSizeMismatch {
            path: PathBuf::from("dataset_images.bin"),
            expected: 8000,
            actual: 7996,
        };
        assert!(size.is_cache_rejection());

        let label = DatasetError::LabelMismatch {
            label: "12a45".to_string(),
            msg: "non-digit".to_string(),
        };
        assert!(!label.is_cache_rejection());
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = DatasetError::IndexOutOfRange {
            boundary: 30,
            total: 25,
        };
        assert_eq!(err.to_string(), "split boundary 30 exceeds 25 tiles");

        let err = DatasetError::EmptyRange { split: "test" };
        assert!(err.to_string().starts_with("test split"));
    }
}
