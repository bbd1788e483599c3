//! Tracing subscriber setup.
//!
//! Filter priority, highest first:
//! 1. `CLIMATE_SYNC_LOG` env var
//! 2. `RUST_LOG` env var
//! 3. `-v` (debug) / `-q` (error) flags
//! 4. `warn`

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
  Quiet,
  Normal,
  Verbose,
}

impl Verbosity {
  pub fn from_flags(verbose: bool, quiet: bool) -> Self {
    if verbose {
      Self::Verbose
    } else if quiet {
      Self::Quiet
    } else {
      Self::Normal
    }
  }

  fn default_level(self) -> Level {
    match self {
      Self::Quiet => Level::ERROR,
      Self::Normal => Level::WARN,
      Self::Verbose => Level::DEBUG,
    }
  }
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
  for var in ["CLIMATE_SYNC_LOG", "RUST_LOG"] {
    if let Ok(directives) = std::env::var(var) {
      if let Ok(filter) = EnvFilter::try_new(&directives) {
        return filter;
      }
    }
  }
  EnvFilter::new(verbosity.default_level().as_str().to_ascii_lowercase())
}

/// Install the global subscriber: stderr always, plus a log file when configured.
///
/// The returned guard flushes the file writer on drop and must be held until exit.
pub fn init(verbosity: Verbosity, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer().with_writer(writer).with_ansi(false);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(build_env_filter(verbosity))
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
