//! Content fingerprints over canonicalized JSON.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Hex-encoded SHA-256 of a canonicalized payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  /// First 12 hex characters, for reports.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Fingerprint any serializable value.
///
/// Object keys are sorted at every nesting level before hashing, so two
/// documents that differ only in key order produce the same fingerprint.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint> {
  let value = serde_json::to_value(value)?;
  let mut buf = Vec::new();
  write_canonical(&value, &mut buf)?;

  let mut hasher = Sha256::new();
  hasher.update(&buf);
  Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Compact JSON with byte-wise sorted object keys.
pub(crate) fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
  match value {
    Value::Null => out.extend_from_slice(b"null"),
    Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
    Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
    Value::String(s) => serde_json::to_writer(&mut *out, s)?,
    Value::Array(items) => {
      out.push(b'[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(b',');
        }
        write_canonical(item, out)?;
      }
      out.push(b']');
    }
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

      out.push(b'{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(b',');
        }
        serde_json::to_writer(&mut *out, key)?;
        out.push(b':');
        write_canonical(&map[key], out)?;
      }
      out.push(b'}');
    }
  }
  Ok(())
}
