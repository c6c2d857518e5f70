//! Train/test split and cyclic shuffled sampling order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};

/// One side of a split: tile-aligned slices of the dataset buffers.
#[derive(Clone, Copy, Debug)]
pub struct SplitRange<'a> {
    /// "train" or "test"
    pub name: &'static str,
    pub images: &'a [f32],
    pub labels: &'a [u8],
    /// Dataset index of the first tile in this range
    pub offset: usize,
    pub tile_size: usize,
    pub num_classes: usize,
}

impl SplitRange<'_> {
    pub fn num_tiles(&self) -> usize {
        self.labels.len() / self.num_classes
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Dataset divided into a train prefix and a test suffix.
#[derive(Clone, Copy, Debug)]
pub struct Split<'a> {
    pub train: SplitRange<'a>,
    pub test: SplitRange<'a>,
}

/// Splits the dataset after `train_tiles` tiles.
pub fn make_split(dataset: &Dataset, train_tiles: usize) -> DatasetResult<Split<'_>> {
    let total = dataset.num_tiles();
    if train_tiles > total {
        return Err(DatasetError::IndexOutOfRange {
            boundary: train_tiles,
            total,
        });
    }

    let tile_size = dataset.tile_size();
    let num_classes = dataset.num_classes();
    let (train_images, test_images) = dataset.images().split_at(train_tiles * tile_size);
    let (train_labels, test_labels) = dataset.labels().split_at(train_tiles * num_classes);

    Ok(Split {
        train: SplitRange {
            name: "train",
            images: train_images,
            labels: train_labels,
            offset: 0,
            tile_size,
            num_classes,
        },
        test: SplitRange {
            name: "test",
            images: test_images,
            labels: test_labels,
            offset: train_tiles,
            tile_size,
            num_classes,
        },
    })
}

/// Fixed random permutation of `0..len` read through a wrapping cursor.
///
/// The permutation is drawn once and reused on every pass; the cursor is
/// never reset. Not synchronized: one sampler per index.
#[derive(Clone, Debug)]
pub struct ShuffleIndex {
    order: Vec<usize>,
    cursor: usize,
}

impl ShuffleIndex {
    /// Shuffles `0..len` with thread-local randomness.
    pub fn new(len: usize) -> Self {
        Self::with_rng(len, &mut rand::thread_rng())
    }

    /// Shuffles `0..len` deterministically from `seed`.
    pub fn seeded(len: usize, seed: u64) -> Self {
        Self::with_rng(len, &mut StdRng::seed_from_u64(seed))
    }

    /// Shuffles `0..len` with a uniform Fisher-Yates shuffle driven by `rng`.
    pub fn with_rng<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(rng);
        Self { order, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The permutation, in storage order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Advances the cursor (wrapping) and returns the value under it.
    ///
    /// Returns None only for an empty index.
    pub fn next(&mut self) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.order.len();
        Some(self.order[self.cursor])
    }
}
