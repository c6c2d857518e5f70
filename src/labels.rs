//! Label sources and label encoding.
//!
//! A label source yields the composite images of a dataset in a fixed order,
//! each with a label string holding one digit per region. The order of that
//! list is the order of the dataset; nothing downstream re-reads a directory.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, DatasetResult};

/// One composite image and its label string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelEntry {
    pub image: PathBuf,
    pub label: String,
}

/// Supplies the ordered list of labeled composite images.
pub trait LabelSource {
    fn entries(&self) -> DatasetResult<Vec<LabelEntry>>;
}

impl LabelSource for Vec<LabelEntry> {
    fn entries(&self) -> DatasetResult<Vec<LabelEntry>> {
        Ok(self.clone())
    }
}

/// Item of a label list file: either a bare label whose image is
/// `<label>.<ext>`, or an explicit file name with its label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum ListItem {
    Label(String),
    Entry { image: PathBuf, label: String },
}

/// Label list stored as a JSON array, resolved against an image directory.
#[derive(Clone, Debug)]
pub struct LabelList {
    pub list_path: PathBuf,
    pub image_dir: PathBuf,
    pub image_extension: String,
}

impl LabelList {
    pub fn new(list_path: &Path, image_dir: &Path, image_extension: &str) -> Self {
        Self {
            list_path: list_path.to_path_buf(),
            image_dir: image_dir.to_path_buf(),
            image_extension: image_extension.to_string(),
        }
    }
}

impl LabelSource for LabelList {
    fn entries(&self) -> DatasetResult<Vec<LabelEntry>> {
        let contents = fs::read_to_string(&self.list_path)
            .map_err(|e| DatasetError::io(&self.list_path, e))?;
        let items: Vec<ListItem> =
            serde_json::from_str(&contents).map_err(|source| DatasetError::Json {
                path: self.list_path.clone(),
                source,
            })?;

        let entries = items
            .into_iter()
            .map(|item| match item {
                ListItem::Label(label) => LabelEntry {
                    image: self
                        .image_dir
                        .join(format!("{}.{}", label, self.image_extension)),
                    label,
                },
                ListItem::Entry { image, label } => LabelEntry {
                    image: self.image_dir.join(image),
                    label,
                },
            })
            .collect();

        Ok(entries)
    }
}

/// Derives labels from file names: the first `label_len` digits of each file stem.
///
/// Files are sorted by name so the resulting list is stable across runs. A
/// stem that does not start with `label_len` digits still yields an entry,
/// labeled with its leading characters, so building from the list fails on it
/// instead of silently leaving the image out.
#[derive(Clone, Debug)]
pub struct DirectoryLabels {
    pub image_dir: PathBuf,
    pub image_extension: String,
    pub label_len: usize,
}

impl LabelSource for DirectoryLabels {
    fn entries(&self) -> DatasetResult<Vec<LabelEntry>> {
        let pattern = Regex::new(&format!(r"^(\d{{{}}})", self.label_len))
            .map_err(|e| DatasetError::Config(format!("bad label pattern: {}", e)))?;

        let mut files: Vec<PathBuf> = fs::read_dir(&self.image_dir)
            .map_err(|e| DatasetError::io(&self.image_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.image_extension))
            })
            .collect();
        files.sort();

        let mut entries = Vec::with_capacity(files.len());
        for path in files {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let label = match pattern.captures(&stem) {
                Some(caps) => caps[1].to_string(),
                None => {
                    crate::log(&format!(
                        "Warning: {} does not start with {} digits, its label will be rejected",
                        path.display(),
                        self.label_len
                    ));
                    stem.chars().take(self.label_len).collect()
                }
            };
            entries.push(LabelEntry { label, image: path });
        }

        Ok(entries)
    }
}

/// Writes entries as a label list file readable by [`LabelList`].
///
/// Image paths are stored relative to `image_dir` when possible.
pub fn write_label_list(entries: &[LabelEntry], image_dir: &Path, path: &Path) -> DatasetResult<()> {
    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| ListItem::Entry {
            image: entry
                .image
                .strip_prefix(image_dir)
                .unwrap_or(&entry.image)
                .to_path_buf(),
            label: entry.label.clone(),
        })
        .collect();

    let json = serde_json::to_string_pretty(&items).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| DatasetError::io(path, e))
}

/// Splits a label string into one class index per region.
///
/// Characters past `num_regions` are ignored. A short label, a non-digit, or a
/// digit outside `num_classes` is rejected rather than replaced.
pub fn parse_label(label: &str, num_regions: usize, num_classes: usize) -> DatasetResult<Vec<u8>> {
    let mismatch = |msg: String| DatasetError::LabelMismatch {
        label: label.to_string(),
        msg,
    };

    let count = label.chars().count();
    if count < num_regions {
        return Err(mismatch(format!(
            "has {} characters, {} regions need a digit each",
            count, num_regions
        )));
    }

    label
        .chars()
        .take(num_regions)
        .enumerate()
        .map(|(pos, c)| -> DatasetResult<u8> {
            let digit = c
                .to_digit(10)
                .ok_or_else(|| mismatch(format!("{:?} at position {} is not a digit", c, pos)))?;
            if digit as usize >= num_classes {
                return Err(mismatch(format!(
                    "digit {} at position {} is outside {} classes",
                    digit, pos, num_classes
                )));
            }
            Ok(digit as u8)
        })
        .collect()
}

/// Appends the one-hot row for `class` to `out`.
pub fn push_one_hot(out: &mut Vec<u8>, class: u8, num_classes: usize) {
    let start = out.len();
    out.resize(start + num_classes, 0);
    out[start + class as usize] = 1;
}

pub fn one_hot(class: u8, num_classes: usize) -> Vec<u8> {
    let mut row = Vec::with_capacity(num_classes);
    push_one_hot(&mut row, class, num_classes);
    row
}

/// Class index of a one-hot row, or None if the row is not one-hot.
pub fn decode_one_hot(row: &[u8]) -> Option<u8> {
    let mut hot = None;
    for (i, &v) in row.iter().enumerate() {
        match v {
            0 => {}
            1 if hot.is_none() => hot = Some(i as u8),
            _ => return None,
        }
    }
    hot
}
