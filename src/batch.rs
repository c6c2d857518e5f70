//! Batch sampling over the train and test splits.
//!
//! Batches are drawn through a [`ShuffleIndex`], so consecutive batches walk
//! the same permutation and wrap around forever. Each batch keeps the dataset
//! index of every row so a sample can be traced back to its source image.

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};
use crate::labels::decode_one_hot;
use crate::split::{make_split, ShuffleIndex, Split, SplitRange};

/// A batch of tiles ready for a trainer.
///
/// `xs` reshapes row-major to `(size, tile_height, tile_width, 1)` and `ys`
/// to `(size, num_classes)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub xs: Vec<f32>,
    pub ys: Vec<u8>,
    /// Dataset tile index of each row
    pub indices: Vec<usize>,
    pub tile_size: usize,
    pub num_classes: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Intensities of row `i`.
    pub fn tile(&self, i: usize) -> &[f32] {
        &self.xs[i * self.tile_size..(i + 1) * self.tile_size]
    }

    /// Class of row `i`.
    pub fn class_of(&self, i: usize) -> Option<u8> {
        decode_one_hot(&self.ys[i * self.num_classes..(i + 1) * self.num_classes])
    }
}

/// Draws `batch_size` tiles from `range` in the order given by `index`.
///
/// `batch_size` may exceed the range; rows then repeat. `index` must have been
/// created for a range of the same size.
pub fn next_batch(
    batch_size: usize,
    range: &SplitRange<'_>,
    index: &mut ShuffleIndex,
) -> DatasetResult<Batch> {
    if index.len() != range.num_tiles() {
        return Err(DatasetError::ShuffleMismatch {
            split: range.name,
            index_len: index.len(),
            range_len: range.num_tiles(),
        });
    }

    let tile_size = range.tile_size;
    let num_classes = range.num_classes;

    let mut xs = Vec::with_capacity(batch_size * tile_size);
    let mut ys = Vec::with_capacity(batch_size * num_classes);
    let mut indices = Vec::with_capacity(batch_size);

    for _ in 0..batch_size {
        let idx = index
            .next()
            .ok_or(DatasetError::EmptyRange { split: range.name })?;
        xs.extend_from_slice(&range.images[idx * tile_size..(idx + 1) * tile_size]);
        ys.extend_from_slice(&range.labels[idx * num_classes..(idx + 1) * num_classes]);
        indices.push(range.offset + idx);
    }

    Ok(Batch {
        xs,
        ys,
        indices,
        tile_size,
        num_classes,
    })
}

/// A loaded dataset with its split and one sampling order per side.
pub struct DigitData {
    dataset: Dataset,
    train_tiles: usize,
    train_index: ShuffleIndex,
    test_index: ShuffleIndex,
}

impl DigitData {
    /// Splits `dataset` after `train_tiles` tiles and shuffles both sides.
    ///
    /// With a seed both permutations are reproducible; the test side uses
    /// `seed + 1` so the two orders differ.
    pub fn new(dataset: Dataset, train_tiles: usize, seed: Option<u64>) -> DatasetResult<Self> {
        let (train_len, test_len) = {
            let split = make_split(&dataset, train_tiles)?;
            (split.train.num_tiles(), split.test.num_tiles())
        };

        let (train_index, test_index) = match seed {
            Some(seed) => (
                ShuffleIndex::seeded(train_len, seed),
                ShuffleIndex::seeded(test_len, seed.wrapping_add(1)),
            ),
            None => (ShuffleIndex::new(train_len), ShuffleIndex::new(test_len)),
        };

        crate::log(&format!(
            "Split {} tiles into {} train / {} test",
            dataset.num_tiles(),
            train_len,
            test_len
        ));

        Ok(Self {
            dataset,
            train_tiles,
            train_index,
            test_index,
        })
    }

    pub fn from_config(dataset: Dataset, config: &PipelineConfig) -> DatasetResult<Self> {
        Self::new(dataset, config.train_tiles, config.seed)
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn split(&self) -> DatasetResult<Split<'_>> {
        make_split(&self.dataset, self.train_tiles)
    }

    pub fn num_train(&self) -> usize {
        self.train_index.len()
    }

    pub fn num_test(&self) -> usize {
        self.test_index.len()
    }

    pub fn next_train_batch(&mut self, batch_size: usize) -> DatasetResult<Batch> {
        let split = make_split(&self.dataset, self.train_tiles)?;
        next_batch(batch_size, &split.train, &mut self.train_index)
    }

    pub fn next_test_batch(&mut self, batch_size: usize) -> DatasetResult<Batch> {
        let split = make_split(&self.dataset, self.train_tiles)?;
        next_batch(batch_size, &split.test, &mut self.test_index)
    }
}
