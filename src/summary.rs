//! Class distribution of a split dataset, with JSON export.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::dataset::Dataset;
use crate::labels::decode_one_hot;
use crate::split::{Split, SplitRange};

/// Per-class tile counts for one side of the split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSummary {
    pub tiles: usize,
    /// Tiles per class, indexed by class
    pub class_counts: Vec<usize>,
    /// Rows that are not a valid one-hot vector (always 0 for a built dataset)
    pub invalid_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub num_images: usize,
    pub num_tiles: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    pub train: RangeSummary,
    pub test: RangeSummary,
}

impl DatasetSummary {
    pub fn from_split(dataset: &Dataset, split: &Split<'_>) -> Self {
        let shape = dataset.shape();
        DatasetSummary {
            num_images: shape.num_images,
            num_tiles: shape.num_tiles(),
            tile_width: shape.tile_width,
            tile_height: shape.tile_height,
            train: summarize_range(&split.train),
            test: summarize_range(&split.test),
        }
    }
}

fn summarize_range(range: &SplitRange<'_>) -> RangeSummary {
    let mut class_counts = vec![0; range.num_classes];
    let mut invalid_rows = 0;

    for row in range.labels.chunks_exact(range.num_classes) {
        match decode_one_hot(row) {
            Some(class) => class_counts[class as usize] += 1,
            None => invalid_rows += 1,
        }
    }

    RangeSummary {
        tiles: range.num_tiles(),
        class_counts,
        invalid_rows,
    }
}

/// Writes the summary as pretty-printed JSON.
pub fn export_to_json(summary: &DatasetSummary, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write summary to {}", output_path.display()))
}
