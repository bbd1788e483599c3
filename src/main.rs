mod cache;
mod commands;
mod config;
mod error;
mod logging;
mod report;
mod source;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "climate-sync")]
#[command(about = "Fetch and cache climate and maritime-emissions datasets, refreshing on change")]
#[command(version)]
struct Args {
  /// Path to config file
  /// (default: ./climate-sync.yaml or $XDG_CONFIG_HOME/climate-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Only process this dataset (default: all configured datasets)
  #[arg(short, long, global = true)]
  dataset: Option<String>,

  /// Debug-level logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Only log errors
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Option<commands::Command>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = logging::init(
    logging::Verbosity::from_flags(args.verbose, args.quiet),
    config.log_file.as_deref(),
  )?;

  commands::run(
    args.command.unwrap_or_default(),
    &config,
    args.dataset.as_deref(),
  )
  .await
}
