//! bsum: parallel per-block digests of standard input
//!
//! Usage:
//!   bsum [OPTIONS] [BLOCK_SIZE] < input
//!
//! Standard input is split into BLOCK_SIZE-byte blocks (default 1 MiB, the
//! last one zero-padded), each block is digested on a worker pool, and one
//! lowercase hex digest per block is printed in block order. Diagnostics go
//! to stderr; stdout carries digests only.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use bsum_core::config::{BsumConfig, PipelineConfig};
use bsum_pipeline::StreamDispatcher;

#[derive(Parser, Debug)]
#[command(
    name = "bsum",
    version,
    about = "Parallel per-block digests of standard input",
    long_about = "bsum: split stdin into fixed-size blocks and print one digest per block, in order"
)]
struct Cli {
    /// Block size in bytes; an invalid value falls back to the default
    #[arg(allow_negative_numbers = true)]
    block_size: Option<String>,

    /// Digest algorithm (md5, sha224, sha256, sha384, sha512, blake3)
    #[arg(long, short = 'a', env = "BSUM_ALGORITHM")]
    algorithm: Option<String>,

    /// Worker threads (0 = one per logical processor)
    #[arg(long, short = 'j', env = "BSUM_WORKERS")]
    workers: Option<usize>,

    /// Path to bsum.toml configuration file
    #[arg(long, short = 'c', env = "BSUM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BSUM_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "BSUM_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, missing_config) = load_config(cli.config.as_deref())?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .or_else(|| LogFormat::from_str(&config.log.format, true).ok())
        .unwrap_or(LogFormat::Text);
    init_logging(&level, &format);

    if let Some(path) = missing_config {
        warn!("config file not found: {}  (using defaults)", path.display());
    }

    apply_overrides(&mut config.pipeline, &cli);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        algorithm = %config.pipeline.algorithm,
        block_size = config.pipeline.block_size,
        "bsum starting"
    );

    let dispatcher = StreamDispatcher::new(&config.pipeline).context("configuring pipeline")?;

    let input = io::stdin().lock();
    let output = BufWriter::new(io::stdout().lock());
    dispatcher.run(input, output)?;
    Ok(())
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Returns the config plus the path that was requested but not found, if any.
fn load_config(path: Option<&Path>) -> Result<(BsumConfig, Option<PathBuf>)> {
    match path {
        Some(path) if path.exists() => {
            let config = BsumConfig::load(path)
                .with_context(|| format!("loading config: {}", path.display()))?;
            Ok((config, None))
        }
        Some(path) => Ok((BsumConfig::default(), Some(path.to_path_buf()))),
        None => Ok((BsumConfig::default(), None)),
    }
}

/// CLI flags win over the config file.
fn apply_overrides(pipeline: &mut PipelineConfig, cli: &Cli) {
    if let Some(algorithm) = &cli.algorithm {
        pipeline.algorithm = algorithm.clone();
    }
    if let Some(workers) = cli.workers {
        pipeline.workers = workers;
    }
    if let Some(arg) = &cli.block_size {
        match parse_block_size(arg) {
            Some(size) => pipeline.block_size = size,
            None => warn!(
                "block size {arg} is not valid. default {} will be used",
                pipeline.block_size
            ),
        }
    }
}

fn parse_block_size(arg: &str) -> Option<usize> {
    arg.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr).with_target(false))
                .init();
        }
    }
}
