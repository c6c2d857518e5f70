//! Captcha Digits
//!
//! Turns sprited captcha images into a labeled digit dataset: every composite
//! image is cut into fixed-position digit tiles, normalized to ink intensity,
//! packed into flat buffers, and served as shuffled train/test batches.

pub mod batch;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod labels;
pub mod normalize;
pub mod paths;
pub mod preview;
pub mod split;
pub mod summary;

pub use batch::{next_batch, Batch, DigitData};
pub use config::PipelineConfig;
pub use dataset::{build, Dataset, DatasetShape};
pub use error::{DatasetError, DatasetResult};
pub use extract::{extract_tiles, DigitRegion, DigitTile, TileGeometry};
pub use labels::{LabelEntry, LabelSource};
pub use normalize::normalize;
pub use split::{make_split, ShuffleIndex, Split};

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Log file, set once at startup. Unset means stdout only.
static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

/// Sends log lines to `path` in addition to stdout. Only the first call wins.
pub fn init_log_file(path: PathBuf) {
    let _ = LOG_FILE.set(path);
}

pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    if let Some(log_path) = LOG_FILE.get() {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            let _ = file.write_all(line.as_bytes());
        }
    }
}
