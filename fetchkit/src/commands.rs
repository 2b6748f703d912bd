//! Command implementations for the CLI.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use fetchkit_core::{replace, FetchConfig, FetchStatus, Fetcher};
use owo_colors::OwoColorize;

use crate::formatting::{format_bytes, format_duration, print_info, print_key_value, print_success};

/// Options for `fetchkit get` that override the config file.
pub struct GetOptions {
    pub output: Option<PathBuf>,
    pub force: bool,
    pub preserve_mtime: bool,
    pub json: bool,
}

fn load_config(config: Option<PathBuf>) -> Result<FetchConfig> {
    match config {
        Some(path) => FetchConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(FetchConfig::default()),
    }
}

pub fn cmd_get(config: Option<PathBuf>, url: String, options: GetOptions) -> Result<()> {
    let mut config = load_config(config)?;
    if options.force {
        config = config.force(true);
    }
    if options.preserve_mtime {
        config = config.preserve_mtime(true);
    }

    let fetcher = Fetcher::new(config)?;
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;

    let start = Instant::now();
    let outcome = rt.block_on(fetcher.fetch_detailed(&url, options.output.as_deref()))?;
    let elapsed = start.elapsed().as_secs_f64();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let path = outcome.path.display().to_string();
    match outcome.status {
        FetchStatus::UpToDate => {
            print_info(&format!("{} is up to date", path.bold()));
        }
        FetchStatus::Downloaded { bytes } => {
            print_success(&format!("Downloaded {}", path));
            print_key_value("Size", &format_bytes(bytes));
            print_key_value("Time", &format_duration(elapsed));
        }
    }

    Ok(())
}

pub fn cmd_replace(sources: Vec<PathBuf>, destinations: Vec<PathBuf>) -> Result<()> {
    replace(&sources, &destinations)?;

    let noun = if destinations.len() == 1 { "file" } else { "files" };
    print_success(&format!("Replaced {} {}", destinations.len(), noun));
    for (src, dest) in sources.iter().zip(&destinations) {
        println!(
            "    {} {} {}",
            src.display().bright_black(),
            "→".cyan(),
            dest.display()
        );
    }

    Ok(())
}
