mod cmd;
mod config;
mod error;
mod names;
mod progress;
mod remove;
mod store;
mod verify;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::config::{AuditConfig, DEFAULT_DRIVER, DEFAULT_PLATFORM};
use crate::remove::FsRemover;

#[derive(Parser)]
#[command(name = "leakcheck")]
#[command(about = "Find layers leaked on disk by the Docker storage driver")]
#[command(version)]
struct Cli {
    /// Root of the Docker runtime (default: C:\ProgramData\docker on Windows, /var/lib/docker elsewhere)
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Storage driver directory name
    #[arg(long, default_value = DEFAULT_DRIVER)]
    driver: String,

    /// Only walk images built for this OS
    #[arg(long, default_value = DEFAULT_PLATFORM)]
    platform: String,

    /// Remove unreferenced layers
    #[arg(long)]
    remove: bool,

    /// Display extra info on valid layers
    #[arg(long)]
    verbose: bool,

    /// Output the report as JSON (optionally to a file)
    #[arg(long, num_args = 0..=1, default_missing_value = "-")]
    json: Option<String>,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let cfg = AuditConfig::from_cli(
        cli.folder,
        cli.driver,
        cli.platform,
        cli.remove,
        cli.verbose,
        cli.json,
    );

    cmd::check::run(&cfg, &FsRemover)
}
