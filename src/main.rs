//! Captcha Digits command line tool
//!
//! Regenerates label lists, builds (or reloads) the digit dataset cache, and
//! inspects the resulting train/test split.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use captcha_digits::cache::load_or_build;
use captcha_digits::labels::{write_label_list, DirectoryLabels, LabelList, LabelSource};
use captcha_digits::paths::DataPaths;
use captcha_digits::preview::save_contact_sheet;
use captcha_digits::summary::{export_to_json, DatasetSummary};
use captcha_digits::{log, Dataset, DigitData, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "captcha-digits", about = "Build a labeled digit dataset from captcha images")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Data root; relative paths in the config resolve against it.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (defaults to <root>/captcha_config.json, falling back to built-in defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the shuffle seed.
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Override the number of decode workers.
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Override the train/test boundary, in tiles.
    #[arg(long, global = true)]
    train_tiles: Option<usize>,
    /// Ignore and do not write the dataset cache.
    #[arg(long, global = true)]
    no_cache: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a label list from the file names in the image directory.
    Labels,
    /// Build the dataset from images (or load the cache) and report its size.
    Build,
    /// Print per-class tile counts of the train and test splits.
    Summary {
        /// Also write the summary as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Sample a batch and write its tiles as a PNG contact sheet.
    Preview {
        /// Number of tiles to sample.
        #[arg(long, default_value_t = 20)]
        count: usize,
        /// Sample from the train split instead of the test split.
        #[arg(long)]
        train: bool,
        /// Tiles per row in the sheet.
        #[arg(long, default_value_t = 10)]
        columns: u32,
        #[arg(long, default_value = "preview.png")]
        output: PathBuf,
    },
    /// Write the default config file for reference.
    InitConfig,
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        log(&format!("[PANIC]{} {}", location, msg));
    }));

    let cli = Cli::parse();
    let paths = DataPaths::new(&cli.common.root);
    paths
        .ensure_directories()
        .context("Failed to create output directories")?;
    captcha_digits::init_log_file(paths.log_file());

    if let Command::InitConfig = cli.command {
        let path = cli.common.config.clone().unwrap_or_else(|| paths.config_file());
        PipelineConfig::save_default(&path)?;
        log(&format!("Default config written to {}", path.display()));
        return Ok(());
    }

    let config = load_config(&cli.common, &paths)?;

    match cli.command {
        Command::Labels => run_labels(&config, &paths),
        Command::Build => {
            let dataset = load_dataset(&config, &paths)?;
            let shape = dataset.shape();
            log(&format!(
                "Dataset ready: {} images, {} tiles of {}x{}, {} classes",
                shape.num_images,
                shape.num_tiles(),
                shape.tile_width,
                shape.tile_height,
                shape.num_classes
            ));
            Ok(())
        }
        Command::Summary { json } => run_summary(&config, &paths, json),
        Command::Preview {
            count,
            train,
            columns,
            output,
        } => run_preview(&config, &paths, count, train, columns, output),
        Command::InitConfig => Ok(()),
    }
}

fn load_config(args: &CommonArgs, paths: &DataPaths) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_strict(path)
            .context(format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::load(&paths.config_file()),
    };

    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if let Some(train_tiles) = args.train_tiles {
        config.train_tiles = train_tiles;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn load_dataset(config: &PipelineConfig, paths: &DataPaths) -> Result<Dataset> {
    let source = LabelList::new(
        &paths.label_file(config),
        &paths.image_dir(config),
        &config.image_extension,
    );
    let dataset = load_or_build(&source, config, &paths.cache(config))
        .context("Failed to load dataset")?;
    Ok(dataset)
}

fn run_labels(config: &PipelineConfig, paths: &DataPaths) -> Result<()> {
    let image_dir = paths.image_dir(config);
    let source = DirectoryLabels {
        image_dir: image_dir.clone(),
        image_extension: config.image_extension.clone(),
        label_len: config.digits_per_image(),
    };
    let entries = source.entries()?;

    let label_file = paths.label_file(config);
    write_label_list(&entries, &image_dir, &label_file)?;
    log(&format!(
        "Wrote {} labels from {} to {}",
        entries.len(),
        image_dir.display(),
        label_file.display()
    ));
    Ok(())
}

fn run_summary(config: &PipelineConfig, paths: &DataPaths, json: Option<PathBuf>) -> Result<()> {
    let dataset = load_dataset(config, paths)?;
    let data = DigitData::from_config(dataset, config)?;
    let summary = DatasetSummary::from_split(data.dataset(), &data.split()?);

    log(&format!(
        "{} images, {} tiles ({} train / {} test)",
        summary.num_images, summary.num_tiles, summary.train.tiles, summary.test.tiles
    ));
    for class in 0..config.num_classes {
        log(&format!(
            "  class {}: train {:>6}  test {:>6}",
            class, summary.train.class_counts[class], summary.test.class_counts[class]
        ));
    }

    if let Some(path) = json {
        export_to_json(&summary, &path)?;
        log(&format!("Summary JSON saved: {}", path.display()));
    }
    Ok(())
}

fn run_preview(
    config: &PipelineConfig,
    paths: &DataPaths,
    count: usize,
    train: bool,
    columns: u32,
    output: PathBuf,
) -> Result<()> {
    let dataset = load_dataset(config, paths)?;
    let mut data = DigitData::from_config(dataset, config)?;
    let batch = if train {
        data.next_train_batch(count)?
    } else {
        data.next_test_batch(count)?
    };

    for (row, &index) in batch.indices.iter().enumerate() {
        let (image, region) = data.dataset().source_of(index);
        let class = batch
            .class_of(row)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        log(&format!(
            "  #{:<3} tile {:>6} (image {}, digit {}) label {}",
            row, index, image, region, class
        ));
    }

    save_contact_sheet(&batch, config.tile.width, config.tile.height, columns, &output)?;
    log(&format!("Preview saved: {}", output.display()));
    Ok(())
}
