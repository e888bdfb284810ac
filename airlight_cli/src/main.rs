//! airlight CLI: estimate the global airlight of a hazy image.
//!
//! # Usage
//!
//! ```bash
//! airlight --input hazy.png
//! airlight --input hazy.png --config constants.yaml --all-patches --json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::UNIX_EPOCH;

use airlight::{AirlightPipeline, AirlightResult, CacheKey, CacheStore, Config, ExtractionMode};
use anyhow::Context;
use clap::Parser;

/// Exit status for a run that completed but could not produce an estimate.
const EXIT_NO_ESTIMATE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "airlight")]
#[command(about = "Estimate the global airlight of a hazy image from recurring patches")]
#[command(version)]
struct Cli {
    /// Path to the input image (PNG, JPEG or TIFF).
    #[arg(long)]
    input: PathBuf,

    /// YAML or JSON constants file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for cached patches and candidate pairs.
    #[arg(long, default_value = ".airlight_cache")]
    cache_dir: PathBuf,

    /// Always recompute; neither read nor write the cache.
    #[arg(long)]
    no_cache: bool,

    /// Extract a patch at every grid position (skips smoothing).
    #[arg(long)]
    all_patches: bool,

    /// Keep every candidate pair regardless of correlation.
    #[arg(long)]
    all_pairs: bool,

    /// Drop self-pairs and symmetric duplicates before filtering.
    #[arg(long)]
    dedup: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily-rolling log files into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the result and its diagnostics as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = common::log_setup::setup_logging(&cli.log_level, cli.log_dir.as_deref()) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(result) => match print_result(&result, cli.json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            let no_estimate = e
                .downcast_ref::<airlight::Error>()
                .is_some_and(airlight::Error::is_recoverable);
            if no_estimate {
                eprintln!("no airlight estimate: {e:#}");
                ExitCode::from(EXIT_NO_ESTIMATE)
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<AirlightResult> {
    let config = build_config(cli)?;
    let pipeline = AirlightPipeline::new(config)?;

    let image = airlight::RgbImage::from_file(&cli.input)?;
    tracing::info!(
        input = %cli.input.display(),
        width = image.width(),
        height = image.height(),
        "Loaded image"
    );

    if cli.no_cache {
        return Ok(pipeline.estimate(&image)?);
    }

    std::fs::create_dir_all(&cli.cache_dir).with_context(|| {
        format!("Failed to create cache directory {}", cli.cache_dir.display())
    })?;
    let cache = CacheStore::new(&cli.cache_dir);
    let key = CacheKey::new(&cache_identity(&cli.input), pipeline.config())?;
    Ok(pipeline.estimate_with_cache(&image, &cache, &key)?)
}

/// File config (or defaults) with the command-line switches applied on top.
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if cli.all_patches {
        config.extraction = ExtractionMode::Dense;
    }
    if cli.all_pairs {
        config.bypass_pair_filter = true;
    }
    if cli.dedup {
        config.remove_duplicates = true;
    }
    Ok(config)
}

/// Canonical input path plus the file's length and modification time, so the
/// same file reached through different relative paths shares one cache entry
/// and rewriting the file in place invalidates it.
fn cache_identity(input: &Path) -> String {
    let path = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());
    let stamp = match std::fs::metadata(&path) {
        Ok(meta) => {
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            format!("{}:{modified}", meta.len())
        }
        Err(_) => String::new(),
    };
    format!("{}|{stamp}", path.display())
}

fn print_result(result: &AirlightResult, json: bool) -> anyhow::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
        println!("{text}");
    } else {
        let [r, g, b] = result.airlight;
        println!("{r:.6} {g:.6} {b:.6}");
    }
    Ok(())
}
