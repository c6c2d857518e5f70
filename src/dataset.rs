//! Flat image/label buffers built from labeled composite images.
//!
//! Tile `i` comes from image `i / digits_per_image`, region
//! `i % digits_per_image`. Its intensities occupy
//! `images[i * tile_size..(i + 1) * tile_size]` and its one-hot label occupies
//! `labels[i * num_classes..(i + 1) * num_classes]`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::{DatasetError, DatasetResult};
use crate::extract::{extract_file, DigitTile};
use crate::labels::{decode_one_hot, parse_label, push_one_hot, LabelSource};

/// Everything needed to interpret the flat buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub num_images: usize,
    pub digits_per_image: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    pub num_classes: usize,
}

impl DatasetShape {
    pub fn from_config(config: &PipelineConfig, num_images: usize) -> Self {
        Self {
            num_images,
            digits_per_image: config.digits_per_image(),
            tile_width: config.tile.width,
            tile_height: config.tile.height,
            num_classes: config.num_classes,
        }
    }

    pub fn num_tiles(&self) -> usize {
        self.num_images * self.digits_per_image
    }

    pub fn tile_size(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize
    }

    /// Expected length of the images buffer, in values.
    pub fn images_len(&self) -> usize {
        self.num_tiles() * self.tile_size()
    }

    /// Expected length of the labels buffer, in bytes.
    pub fn labels_len(&self) -> usize {
        self.num_tiles() * self.num_classes
    }
}

/// Immutable labeled digit dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    shape: DatasetShape,
    images: Vec<f32>,
    labels: Vec<u8>,
}

impl Dataset {
    /// Wraps existing buffers, checking that they match `shape` exactly.
    pub fn from_parts(shape: DatasetShape, images: Vec<f32>, labels: Vec<u8>) -> DatasetResult<Self> {
        if images.len() != shape.images_len() || labels.len() != shape.labels_len() {
            return Err(DatasetError::Config(format!(
                "buffers hold {} values and {} label bytes, shape needs {} and {}",
                images.len(),
                labels.len(),
                shape.images_len(),
                shape.labels_len()
            )));
        }
        Ok(Self {
            shape,
            images,
            labels,
        })
    }

    pub fn shape(&self) -> &DatasetShape {
        &self.shape
    }

    pub fn images(&self) -> &[f32] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn num_tiles(&self) -> usize {
        self.shape.num_tiles()
    }

    pub fn tile_size(&self) -> usize {
        self.shape.tile_size()
    }

    pub fn num_classes(&self) -> usize {
        self.shape.num_classes
    }

    /// Intensities of tile `index`.
    pub fn tile(&self, index: usize) -> &[f32] {
        let size = self.tile_size();
        &self.images[index * size..(index + 1) * size]
    }

    /// One-hot row of tile `index`.
    pub fn label_row(&self, index: usize) -> &[u8] {
        let n = self.num_classes();
        &self.labels[index * n..(index + 1) * n]
    }

    /// Class of tile `index`.
    pub fn label_of(&self, index: usize) -> Option<u8> {
        decode_one_hot(self.label_row(index))
    }

    /// (image index, region index) a tile was extracted from.
    pub fn source_of(&self, index: usize) -> (usize, usize) {
        let per_image = self.shape.digits_per_image;
        (index / per_image, index % per_image)
    }
}

/// Decodes every composite image listed by `source` and packs the tiles.
///
/// Images are decoded on a worker pool; the buffers are assembled in list
/// order afterwards. Any bad image or label fails the whole build.
pub fn build(source: &dyn LabelSource, config: &PipelineConfig) -> DatasetResult<Dataset> {
    let geometry = config.geometry()?;
    let entries = source.entries()?;
    let shape = DatasetShape::from_config(config, entries.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.unwrap_or(0))
        .build()
        .map_err(|e| DatasetError::Config(format!("failed to start decode workers: {}", e)))?;

    crate::log(&format!(
        "Building dataset from {} images on {} workers",
        entries.len(),
        pool.current_num_threads()
    ));
    let started = Instant::now();

    let decoded: Vec<(Vec<DigitTile>, Vec<u8>)> = pool.install(|| {
        entries
            .par_iter()
            .map(|entry| -> DatasetResult<(Vec<DigitTile>, Vec<u8>)> {
                let classes = parse_label(&entry.label, shape.digits_per_image, shape.num_classes)?;
                let tiles = extract_file(&entry.image, &geometry)?;
                Ok((tiles, classes))
            })
            .collect::<DatasetResult<Vec<_>>>()
    })?;

    let mut images = Vec::with_capacity(shape.images_len());
    let mut labels = Vec::with_capacity(shape.labels_len());
    for (tiles, classes) in decoded {
        for (tile, class) in tiles.iter().zip(classes) {
            images.extend_from_slice(&tile.pixels);
            push_one_hot(&mut labels, class, shape.num_classes);
        }
    }

    crate::log(&format!(
        "Built {} tiles in {:.2?}",
        shape.num_tiles(),
        started.elapsed()
    ));

    Dataset::from_parts(shape, images, labels)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::labels::LabelEntry;
    use image::{ImageBuffer, Rgba, RgbaImage};
    use std::path::Path;
    use tempfile::tempdir;

    /// Draws a 100x32 captcha whose digit `d` region is filled with gray level `d`.
    ///
    /// Each region gets a distinct ink level so tiles can be told apart.
    pub(crate) fn synthetic_captcha(label: &str) -> RgbaImage {
        let config = PipelineConfig::default();
        let regions = config.regions.regions();
        let digits: Vec<u32> = label.chars().filter_map(|c| c.to_digit(10)).collect();

        ImageBuffer::from_fn(100, 32, |x, y| {
            for (region, &d) in regions.iter().zip(&digits) {
                if (region.left..region.right()).contains(&x) && (region.top..region.bottom()).contains(&y) {
                    let level = 250 - 25 * d as u8;
                    return Rgba([level, level, level, 255]);
                }
            }
            Rgba([255, 255, 255, 0])
        })
    }

    /// Writes one synthetic PNG per label and returns the label entries.
    pub(crate) fn write_captchas(dir: &Path, labels: &[&str]) -> Vec<LabelEntry> {
        labels
            .iter()
            .map(|label| {
                let path = dir.join(format!("{}.png", label));
                synthetic_captcha(label).save(&path).unwrap();
                LabelEntry {
                    image: path,
                    label: label.to_string(),
                }
            })
            .collect()
    }

    #[test]
    fn test_single_captcha_end_to_end() {
        let dir = tempdir().unwrap();
        let entries = write_captchas(dir.path(), &["01234"]);

        let dataset = build(&entries, &PipelineConfig::default()).unwrap();
        assert_eq!(dataset.num_tiles(), 5);
        assert_eq!(dataset.images().len(), 5 * 400);
        assert_eq!(dataset.labels().len(), 5 * 10);

        let classes: Vec<Option<u8>> = (0..5).map(|i| dataset.label_of(i)).collect();
        assert_eq!(classes, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert!(dataset.images().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_tiles_follow_image_then_region_order() {
        let dir = tempdir().unwrap();
        let entries = write_captchas(dir.path(), &["01234", "98765", "55555"]);
        let dataset = build(&entries, &PipelineConfig::default()).unwrap();

        assert_eq!(dataset.num_tiles(), 15);
        assert_eq!(dataset.source_of(7), (1, 2));
        assert_eq!(dataset.label_of(7), Some(7));
        assert_eq!(dataset.label_of(14), Some(5));

        // Ink level grows with the digit, so the tile centre does too
        let centre = |i: usize| dataset.tile(i)[10 * 20 + 10];
        assert!(centre(5) > centre(6), "9 is darker than 8");
        assert_eq!(centre(10), centre(14), "same digit, same ink");
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = tempdir().unwrap();
        let entries = write_captchas(dir.path(), &["13579", "24680", "11223"]);
        let mut config = PipelineConfig::default();
        config.workers = Some(3);

        let first = build(&entries, &config).unwrap();
        let second = build(&entries, &config).unwrap();
        assert_eq!(first.images(), second.images());
        assert_eq!(first.labels(), second.labels());
    }

    #[test]
    fn test_bad_label_fails_build() {
        let dir = tempdir().unwrap();
        let mut entries = write_captchas(dir.path(), &["01234", "56789"]);
        entries[1].label = "567".to_string();

        let err = build(&entries, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, DatasetError::LabelMismatch { .. }));
    }

    #[test]
    fn test_missing_image_fails_build() {
        let dir = tempdir().unwrap();
        let mut entries = write_captchas(dir.path(), &["01234"]);
        entries.push(LabelEntry {
            image: dir.path().join("missing.png"),
            label: "00000".to_string(),
        });

        let err = build(&entries, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, DatasetError::Decode { .. }));
    }

    #[test]
    fn test_from_parts_rejects_wrong_lengths() {
        let shape = DatasetShape {
            num_images: 1,
            digits_per_image: 5,
            tile_width: 20,
            tile_height: 20,
            num_classes: 10,
        };
        assert!(Dataset::from_parts(shape, vec![0.0; 1999], vec![0; 50]).is_err());
        assert!(Dataset::from_parts(shape, vec![0.0; 2000], vec![0; 50]).is_ok());
    }
}
