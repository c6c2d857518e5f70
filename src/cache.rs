//! Persisted dataset cache.
//!
//! A built dataset is stored as two raw blobs plus a small JSON manifest:
//! - images: every tile intensity as a little-endian f32
//! - labels: every one-hot row as bytes
//! - manifest: the shape the blobs were built with and a fingerprint of the
//!   label list they were built from
//!
//! Blob sizes are checked against the expected tile count before anything is
//! read, so a cache from a different label list is never truncated or padded.
//! A cache without a manifest, or built from other images or labels, is stale.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::config::PipelineConfig;
use crate::dataset::{build, Dataset, DatasetShape};
use crate::error::{DatasetError, DatasetResult};
use crate::labels::{LabelEntry, LabelSource};
use crate::paths::CachePaths;

/// Metadata written next to the blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub shape: DatasetShape,
    /// Hex SHA-256 of the label list, see [`fingerprint`]
    pub fingerprint: String,
    pub created_at: DateTime<Local>,
}

/// Hashes every entry's image path, label, file size and modification time.
///
/// Relabeling an image, reordering the list or replacing an image file all
/// change the fingerprint. An image that cannot be stat'ed hashes as size and
/// time 0; the build reports it.
pub fn fingerprint(entries: &[LabelEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        let path = entry.image.to_string_lossy();
        let (len, modified_ms) = fs::metadata(&entry.image)
            .map(|meta| {
                let modified_ms = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_millis() as u64);
                (meta.len(), modified_ms)
            })
            .unwrap_or((0, 0));

        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        hasher.update((path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update((entry.label.len() as u64).to_le_bytes());
        hasher.update(entry.label.as_bytes());
        hasher.update(len.to_le_bytes());
        hasher.update(modified_ms.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Writes the dataset buffers and manifest.
pub fn save(dataset: &Dataset, fingerprint: &str, paths: &CachePaths) -> DatasetResult<()> {
    let file = File::create(&paths.images).map_err(|e| DatasetError::io(&paths.images, e))?;
    let mut writer = BufWriter::new(file);
    for value in dataset.images() {
        writer
            .write_all(&value.to_le_bytes())
            .map_err(|e| DatasetError::io(&paths.images, e))?;
    }
    writer
        .flush()
        .map_err(|e| DatasetError::io(&paths.images, e))?;

    fs::write(&paths.labels, dataset.labels()).map_err(|e| DatasetError::io(&paths.labels, e))?;

    let manifest = CacheManifest {
        shape: *dataset.shape(),
        fingerprint: fingerprint.to_string(),
        created_at: Local::now(),
    };
    let json = serde_json::to_string_pretty(&manifest).map_err(|source| DatasetError::Json {
        path: paths.manifest.clone(),
        source,
    })?;
    fs::write(&paths.manifest, json).map_err(|e| DatasetError::io(&paths.manifest, e))?;

    crate::log(&format!(
        "Saved dataset cache: {} tiles to {}",
        dataset.num_tiles(),
        paths.images.display()
    ));
    Ok(())
}

/// Loads a cached dataset, requiring it to match `expected` and `fingerprint` exactly.
pub fn load(paths: &CachePaths, expected: &DatasetShape, fingerprint: &str) -> DatasetResult<Dataset> {
    let image_bytes = read_exact_size(&paths.images, expected.images_len() as u64 * 4)?;
    let labels = read_exact_size(&paths.labels, expected.labels_len() as u64)?;
    check_manifest(paths, expected, fingerprint)?;

    let images = image_bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Dataset::from_parts(*expected, images, labels)
}

/// Loads the cache if it is usable, otherwise builds from raw images and
/// refreshes the cache.
pub fn load_or_build(
    source: &dyn LabelSource,
    config: &PipelineConfig,
    paths: &CachePaths,
) -> DatasetResult<Dataset> {
    let entries = source.entries()?;
    let expected = DatasetShape::from_config(config, entries.len());
    let fingerprint = fingerprint(&entries);

    if config.cache.enabled {
        match load(paths, &expected, &fingerprint) {
            Ok(dataset) => {
                crate::log(&format!(
                    "Loaded {} tiles from cache {}",
                    dataset.num_tiles(),
                    paths.images.display()
                ));
                return Ok(dataset);
            }
            Err(e) if e.is_cache_rejection() => {
                crate::log(&format!("Cache not usable ({}). Rebuilding from images.", e));
            }
            Err(e) => return Err(e),
        }
    }

    let dataset = build(&entries, config)?;

    if config.cache.enabled {
        // The dataset is valid without the cache; a failed write only costs the next load.
        if let Err(e) = save(&dataset, &fingerprint, paths) {
            crate::log(&format!("Failed to save dataset cache: {}", e));
        }
    }

    Ok(dataset)
}

fn check_manifest(paths: &CachePaths, expected: &DatasetShape, fingerprint: &str) -> DatasetResult<()> {
    if !paths.manifest.exists() {
        return Err(DatasetError::StaleCache {
            path: paths.manifest.clone(),
            msg: "manifest is missing, cannot tell what the blobs were built from".into(),
        });
    }

    let contents =
        fs::read_to_string(&paths.manifest).map_err(|e| DatasetError::io(&paths.manifest, e))?;
    let manifest: CacheManifest =
        serde_json::from_str(&contents).map_err(|source| DatasetError::Json {
            path: paths.manifest.clone(),
            source,
        })?;

    if manifest.shape != *expected {
        return Err(DatasetError::StaleCache {
            path: paths.manifest.clone(),
            msg: format!(
                "built for {:?}, current layout is {:?}",
                manifest.shape, expected
            ),
        });
    }
    if manifest.fingerprint != fingerprint {
        return Err(DatasetError::StaleCache {
            path: paths.manifest.clone(),
            msg: "built from a different label list or different image files".into(),
        });
    }
    Ok(())
}

fn read_exact_size(path: &Path, expected: u64) -> DatasetResult<Vec<u8>> {
    let actual = fs::metadata(path)
        .map_err(|e| DatasetError::io(path, e))?
        .len();
    if actual != expected {
        return Err(DatasetError::CacheSizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    fs::read(path).map_err(|e| DatasetError::io(path, e))
}
