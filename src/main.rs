//! EPG Slim
//! Builds one filtered, time-shifted XMLTV guide from several EPG sources,
//! keeping only the channels their M3U playlists reference.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod epg;
mod errors;
mod loader;
mod m3u_parser;
mod merge;


use config::AppConfig;
use epg::GeneratorInfo;
use loader::HttpLoader;

#[derive(Parser)]
#[command(name = "epg_slim")]
#[command(version)]
#[command(about = "Build a filtered, time-shifted XMLTV guide from EPG sources and M3U playlists")]
struct Cli {
    /// Configuration file path (defaults to <config dir>/epg_slim/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output file, overrides `output_path` from the config
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Print the default configuration as JSON and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        println!("{}", AppConfig::default().to_json()?);
        return Ok(());
    }

    init_logging(&cli.log_level);
    info!("Starting epg_slim v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = load_config(&config_path);

    let output = cli.output.unwrap_or_else(|| config.output_path.clone());
    let generator = GeneratorInfo {
        name: config.generator_name.clone(),
        url: config.generator_url.clone(),
    };

    let loader = HttpLoader::new(&config.download);
    let report = merge::run_sources(&config.sources, &loader);

    merge::persist(&report.guide, &output, &generator)
        .with_context(|| format!("Failed to persist guide to {}", output.display()))?;

    Ok(())
}

fn init_logging(level: &str) {
    let log_filter = format!("epg_slim={}", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Broken or missing config degrades to the defaults, which have no sources
fn load_config(path: &Path) -> AppConfig {
    match AppConfig::load_from(path) {
        Ok(Some(config)) => {
            info!(
                "Configuration loaded from {} ({} sources)",
                path.display(),
                config.sources.len()
            );
            config
        }
        Ok(None) => {
            warn!(
                "Config file {} not found; using defaults (see --print-default-config)",
                path.display()
            );
            AppConfig::default()
        }
        Err(e) => {
            error!("{}; using defaults", e);
            AppConfig::default()
        }
    }
}
