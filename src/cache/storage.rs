//! Cache storage trait and single-file JSON implementation.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, SyncError};

use super::record::CacheRecord;

/// Trait for cache storage backends. Holds exactly one record per dataset.
pub trait CacheStorage: Send + Sync {
  /// Load the persisted record. Missing or corrupt data yields `None`.
  fn load(&self) -> Option<CacheRecord>;

  /// Persist a record, replacing whatever was stored before.
  fn save(&self, record: &CacheRecord) -> Result<()>;
}

/// Stores a dataset as one pretty-printed JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
  path: PathBuf,
}

impl JsonFileStorage {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Temp file next to the destination, unique per process so that
  /// overlapping runs never write into each other's temp file.
  fn temp_path(&self) -> PathBuf {
    let name = self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "cache".to_string());
    self
      .path
      .with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
  }
}

impl CacheStorage for JsonFileStorage {
  fn load(&self) -> Option<CacheRecord> {
    let contents = match fs::read_to_string(&self.path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "no cached data");
        return None;
      }
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "corrupt cache: unreadable file, ignoring");
        return None;
      }
    };

    match serde_json::from_str::<CacheRecord>(&contents) {
      Ok(record) => {
        debug!(
          path = %self.path.display(),
          saved = %record.local_save_timestamp,
          "loaded cached record"
        );
        Some(record)
      }
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "corrupt cache: invalid record, ignoring");
        None
      }
    }
  }

  fn save(&self, record: &CacheRecord) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(record)?;

    let temp_path = self.temp_path();
    let written = (|| {
      let mut file = fs::File::create(&temp_path)?;
      file.write_all(json.as_bytes())?;
      file.sync_all()?;
      fs::rename(&temp_path, &self.path)
    })();

    if let Err(e) = written {
      fs::remove_file(&temp_path).ok();
      return Err(SyncError::io(&self.path, e));
    }

    debug!(path = %self.path.display(), bytes = json.len(), "saved cache record");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::record::{FetchMetadata, Payload};
  use serde_json::json;
  use tempfile::TempDir;

  fn record(value: serde_json::Value) -> CacheRecord {
    CacheRecord::new(
      Payload::from_value(value).unwrap(),
      FetchMetadata::now("https://example.org/data", 200),
    )
  }

  #[test]
  fn test_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let storage = JsonFileStorage::new(temp_dir.path().join("nested/dir/climate.json"));

    let original = record(json!({"USA": 1.2}));
    storage.save(&original).unwrap();

    let loaded = storage.load().unwrap();
    assert_eq!(loaded, original);
  }

  #[test]
  fn test_load_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let storage = JsonFileStorage::new(temp_dir.path().join("missing.json"));
    assert!(storage.load().is_none());
  }

  #[test]
  fn test_load_malformed_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.json");
    fs::write(&path, "{not json").unwrap();

    assert!(JsonFileStorage::new(&path).load().is_none());
  }

  #[test]
  fn test_load_missing_metadata_key() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("partial.json");
    fs::write(
      &path,
      r#"{"data": {"USA": 1.2}, "local_save_timestamp": "2025-11-09T10:00:00Z"}"#,
    )
    .unwrap();

    assert!(JsonFileStorage::new(&path).load().is_none());
  }

  #[test]
  fn test_load_metadata_without_timestamp() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("partial.json");
    fs::write(
      &path,
      concat!(
        r#"{"data": {}, "metadata": {"status_code": 200}, "#,
        r#""local_save_timestamp": "2025-11-09T10:00:00Z"}"#,
      ),
    )
    .unwrap();

    assert!(JsonFileStorage::new(&path).load().is_none());
  }

  #[test]
  fn test_load_accepts_minimal_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("minimal.json");
    fs::write(
      &path,
      r#"{
        "data": {"USA": 1.2},
        "metadata": {"fetch_timestamp": "2025-11-09T10:00:00Z", "status_code": 200},
        "local_save_timestamp": "2025-11-09T10:00:01Z"
      }"#,
    )
    .unwrap();

    let loaded = JsonFileStorage::new(&path).load().unwrap();
    assert!(loaded.metadata.etag.is_none());
    assert_eq!(loaded.data.as_map()["USA"], json!(1.2));
  }

  #[test]
  fn test_save_overwrites_and_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let storage = JsonFileStorage::new(temp_dir.path().join("climate.json"));

    storage.save(&record(json!({"USA": 1.2}))).unwrap();
    storage.save(&record(json!({"USA": 1.3}))).unwrap();

    let loaded = storage.load().unwrap();
    assert_eq!(loaded.data.as_map()["USA"], json!(1.3));

    let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
  }

  #[test]
  fn test_save_into_missing_directory_that_cannot_be_created() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("file");
    fs::write(&blocker, "x").unwrap();

    let storage = JsonFileStorage::new(blocker.join("climate.json"));
    let err = storage.save(&record(json!({}))).unwrap_err();
    assert!(matches!(err, SyncError::Io { .. }));
  }
}
