//! Error types for fetching, hashing and persisting datasets.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
  /// The fetch failed: timeout, DNS or connection failure, or a non-success status.
  #[error("Network error fetching {url}: {message}")]
  Network { url: String, message: String },

  /// The payload could not be decoded, hashed or serialized.
  #[error("Serialization error: {0}")]
  Serialization(String),

  /// Writing the cache file failed.
  #[error("IO error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl SyncError {
  pub fn network(url: &str, message: impl Into<String>) -> Self {
    Self::Network {
      url: url.to_string(),
      message: message.into(),
    }
  }

  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }

  /// Whether the cache layer may fall back to a previously cached record.
  pub fn is_network(&self) -> bool {
    matches!(self, Self::Network { .. })
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(err: serde_json::Error) -> Self {
    Self::Serialization(err.to_string())
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(err: reqwest::Error) -> Self {
    let url = err.url().map(|u| u.to_string()).unwrap_or_default();
    let message = if err.is_timeout() {
      "request timed out".to_string()
    } else if err.is_connect() {
      format!("connection failed: {}", err)
    } else {
      err.to_string()
    };
    Self::Network { url, message }
  }
}

pub type Result<T> = std::result::Result<T, SyncError>;
