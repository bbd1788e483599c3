//! Subcommands and their execution.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use tracing::error;

use crate::cache::{CacheLayer, CacheResult, CacheStorage, JsonFileStorage};
use crate::config::{Config, DatasetConfig};
use crate::report;
use crate::source::HttpFetcher;

#[derive(Subcommand, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
  /// Check for remote changes and refresh the cache when needed (default)
  #[default]
  Check,
  /// Fetch and overwrite the cache unconditionally
  Update,
  /// Print a preview of the cached data without touching the network
  Show {
    /// Number of rows or values to print
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,
  },
  /// List configured datasets and their cache files
  Datasets,
}

/// Run a command over the selected datasets.
pub async fn run(command: Command, config: &Config, dataset: Option<&str>) -> Result<()> {
  let datasets = config.select(dataset)?;

  match command {
    Command::Check => sync_all(config, &datasets, false).await,
    Command::Update => sync_all(config, &datasets, true).await,
    Command::Show { limit } => {
      for dataset in datasets {
        show(config, dataset, limit);
      }
      Ok(())
    }
    Command::Datasets => {
      for dataset in datasets {
        list(config, dataset);
      }
      Ok(())
    }
  }
}

async fn ensure_fresh(
  config: &Config,
  dataset: &DatasetConfig,
  force: bool,
) -> crate::error::Result<CacheResult> {
  let storage = JsonFileStorage::new(config.cache_path(dataset));
  let fetcher = HttpFetcher::new(config, dataset)?;
  let layer = CacheLayer::new(storage, fetcher).with_attempts(config.http.retries);
  layer.ensure_fresh(force).await
}

/// Datasets are processed one after another; a failure does not stop the rest.
async fn sync_all(config: &Config, datasets: &[&DatasetConfig], force: bool) -> Result<()> {
  let mut failed = Vec::new();

  for dataset in datasets {
    match ensure_fresh(config, dataset, force).await {
      Ok(result) => {
        print!("{}", report::freshness(&dataset.name, &result, &config.cache_path(dataset)));
      }
      Err(e) => {
        error!(dataset = %dataset.name, error = %e, "update failed");
        println!("{}: failed\n  error:    {}", dataset.name, e);
        failed.push(dataset.name.as_str());
      }
    }
  }

  if failed.is_empty() {
    Ok(())
  } else {
    Err(eyre!(
      "{} of {} datasets failed: {}",
      failed.len(),
      datasets.len(),
      failed.join(", ")
    ))
  }
}

fn show(config: &Config, dataset: &DatasetConfig, limit: usize) {
  let path = config.cache_path(dataset);
  match JsonFileStorage::new(&path).load() {
    Some(record) => print!("{}", report::preview(&dataset.name, &record, &path, limit)),
    None => println!(
      "{}: no cached data at {} (run `climate-sync check`)",
      dataset.name,
      path.display()
    ),
  }
}

fn list(config: &Config, dataset: &DatasetConfig) {
  let path = config.cache_path(dataset);
  let cached = match JsonFileStorage::new(&path).load() {
    Some(record) => format!(
      "saved {}",
      record.local_save_timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ),
    None => "not cached".to_string(),
  };

  println!("{} [{:?}] {}", dataset.name, dataset.format, cached);
  if let Some(description) = &dataset.description {
    println!("  {}", description);
  }
  println!("  url:   {}", dataset.url);
  println!("  cache: {}", path.display());
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{DataFormat, HttpConfig};
  use crate::source::client::tests::{response, serve_once};
  use serde_json::json;
  use tempfile::TempDir;
  use tokio::net::TcpListener;

  fn dataset(name: &str, url: &str) -> DatasetConfig {
    DatasetConfig {
      name: name.to_string(),
      url: url.to_string(),
      description: None,
      format: DataFormat::Json,
      path: None,
      accept: None,
      timeout_secs: Some(5),
      group: None,
    }
  }

  fn config(dir: &TempDir, datasets: Vec<DatasetConfig>) -> Config {
    Config {
      cache_dir: Some(dir.path().to_path_buf()),
      log_file: None,
      http: HttpConfig {
        retries: 1,
        ..HttpConfig::default()
      },
      datasets,
    }
  }

  async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/data", addr)
  }

  #[tokio::test]
  async fn test_sync_all_continues_after_failure() {
    let dir = TempDir::new().unwrap();
    let refused = refused_url().await;
    let (url, server) = serve_once(response(
      "200 OK",
      &["Content-Type: application/json"],
      r#"{"USA": 1.2}"#,
    ))
    .await;
    let config = config(
      &dir,
      vec![dataset("unreachable", &refused), dataset("climate", &url)],
    );
    let datasets = config.select(None).unwrap();

    let err = sync_all(&config, &datasets, false).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("1 of 2 datasets failed"));
    assert!(message.contains("unreachable"));
    assert!(!message.contains("climate"));

    server.await.unwrap();
    let record = JsonFileStorage::new(dir.path().join("climate.json"))
      .load()
      .unwrap();
    assert_eq!(record.data.as_map()["USA"], json!(1.2));
    assert!(!dir.path().join("unreachable.json").exists());
  }

  #[tokio::test]
  async fn test_sync_all_succeeds_when_every_dataset_does() {
    let dir = TempDir::new().unwrap();
    let (url, server) = serve_once(response(
      "200 OK",
      &["Content-Type: application/json"],
      r#"{"USA": 1.2}"#,
    ))
    .await;
    let config = config(&dir, vec![dataset("climate", &url)]);
    let datasets = config.select(None).unwrap();

    assert!(sync_all(&config, &datasets, true).await.is_ok());
    server.await.unwrap();
    assert!(dir.path().join("climate.json").exists());
  }

  #[tokio::test]
  async fn test_run_rejects_unknown_dataset() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, vec![dataset("climate", "http://127.0.0.1:9/data")]);

    let err = run(Command::Check, &config, Some("sea-level")).await.unwrap_err();
    assert!(err.to_string().contains("Unknown dataset 'sea-level'"));
  }
}
