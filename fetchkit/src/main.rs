mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use commands::GetOptions;

#[derive(Parser)]
#[command(name = "fetchkit")]
#[command(about = "Mirror remote files locally without ever exposing a half-written copy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file with fetch settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short, long, action, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a resource unless the local copy is current
    Get {
        url: String,
        /// Explicit destination; ignores server-supplied file names
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, action)]
        force: bool,
        /// Stamp the file with the server's Last-Modified time
        #[arg(long, action)]
        preserve_mtime: bool,
        #[arg(long, action)]
        json: bool,
    },
    /// Move every source onto its destination, or change nothing
    Replace {
        #[arg(long = "src", required = true)]
        sources: Vec<PathBuf>,
        #[arg(long = "dest", required = true)]
        destinations: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Get {
            url,
            output,
            force,
            preserve_mtime,
            json,
        } => commands::cmd_get(
            cli.config,
            url,
            GetOptions {
                output,
                force,
                preserve_mtime,
                json,
            },
        )?,
        Commands::Replace {
            sources,
            destinations,
        } => commands::cmd_replace(sources, destinations)?,
    }

    Ok(())
}
