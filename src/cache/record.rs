//! Persisted types: payload, fetch metadata and the cache record wrapping both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

use super::hash::{fingerprint, Fingerprint};

/// A fetched dataset body. Always a JSON object; its contents are opaque to the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
  pub fn new(map: Map<String, Value>) -> Self {
    Self(map)
  }

  /// Wrap an arbitrary JSON value. Objects are kept as-is, anything else is
  /// rejected since a payload must be a mapping.
  pub fn from_value(value: Value) -> Result<Self> {
    match value {
      Value::Object(map) => Ok(Self(map)),
      other => Err(SyncError::Serialization(format!(
        "expected a JSON object payload, got {}",
        json_kind(&other)
      ))),
    }
  }

  /// Tabular payload shape used for CSV and SDMX sources.
  pub fn from_rows(columns: Vec<String>, rows: Vec<Map<String, Value>>) -> Self {
    let mut map = Map::new();
    map.insert(
      "columns".to_string(),
      Value::Array(columns.into_iter().map(Value::String).collect()),
    );
    map.insert(
      "rows".to_string(),
      Value::Array(rows.into_iter().map(Value::Object).collect()),
    );
    Self(map)
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn fingerprint(&self) -> Result<Fingerprint> {
    fingerprint(&self.0)
  }
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// Response metadata captured once per fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
  pub last_modified: Option<String>,
  pub etag: Option<String>,
  pub fetch_timestamp: DateTime<Utc>,
  pub status_code: u16,
  #[serde(default)]
  pub url: String,
  #[serde(default)]
  pub content_type: Option<String>,
}

impl FetchMetadata {
  /// Metadata for a response received just now.
  pub fn now(url: &str, status_code: u16) -> Self {
    Self {
      last_modified: None,
      etag: None,
      fetch_timestamp: Utc::now(),
      status_code,
      url: url.to_string(),
      content_type: None,
    }
  }

  /// HTTP validators usable for a conditional request, if the server sent any.
  pub fn validators(&self) -> Option<Validators> {
    if self.etag.is_none() && self.last_modified.is_none() {
      return None;
    }
    Some(Validators {
      etag: self.etag.clone(),
      last_modified: self.last_modified.clone(),
    })
  }
}

/// Conditional-request headers taken from a previous response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
  pub etag: Option<String>,
  pub last_modified: Option<String>,
}

/// The unit persisted per dataset: payload, where it came from, and when it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
  pub data: Payload,
  pub metadata: FetchMetadata,
  pub local_save_timestamp: DateTime<Utc>,
}

impl CacheRecord {
  /// Build a record stamped now. The save timestamp never precedes the fetch.
  pub fn new(data: Payload, metadata: FetchMetadata) -> Self {
    let local_save_timestamp = Utc::now().max(metadata.fetch_timestamp);
    Self {
      data,
      metadata,
      local_save_timestamp,
    }
  }
}
