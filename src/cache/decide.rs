//! Stale-cache decision between the persisted record and a fresh payload.

use std::fmt;

use crate::error::Result;

use super::hash::Fingerprint;
use super::record::{CacheRecord, Payload};

/// Outcome of comparing the cached payload with a freshly fetched one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  /// Nothing cached yet
  NoLocalData,
  /// Cached payload matches the remote one
  UpToDate,
  /// Remote payload differs from the cached one
  Changed,
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Self::NoLocalData => "no local data",
      Self::UpToDate => "up to date",
      Self::Changed => "changed",
    };
    f.write_str(label)
  }
}

/// A verdict plus the reason and any fingerprints computed to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateVerdict {
  pub verdict: Verdict,
  pub reason: String,
  pub previous: Option<Fingerprint>,
  pub fresh: Option<Fingerprint>,
}

impl UpdateVerdict {
  pub fn new(verdict: Verdict, reason: impl Into<String>) -> Self {
    Self {
      verdict,
      reason: reason.into(),
      previous: None,
      fresh: None,
    }
  }

  /// Whether the fresh payload should replace the cached record.
  pub fn needs_save(&self) -> bool {
    matches!(self.verdict, Verdict::NoLocalData | Verdict::Changed)
  }
}

/// Decide whether `fresh` should replace `previous`.
///
/// The verdict is always content based. HTTP validators only decide whether a
/// fetch happens at all, which is the cache layer's concern.
pub fn decide(previous: Option<&CacheRecord>, fresh: &Payload) -> Result<UpdateVerdict> {
  let Some(previous) = previous else {
    let mut verdict = UpdateVerdict::new(Verdict::NoLocalData, "no cached copy exists");
    verdict.fresh = Some(fresh.fingerprint()?);
    return Ok(verdict);
  };

  let old = previous.data.fingerprint()?;
  let new = fresh.fingerprint()?;

  let mut verdict = if old == new {
    UpdateVerdict::new(
      Verdict::UpToDate,
      format!("content unchanged since {}", previous.local_save_timestamp.to_rfc3339()),
    )
  } else {
    UpdateVerdict::new(
      Verdict::Changed,
      format!("content hash changed ({} -> {})", old.short(), new.short()),
    )
  };
  verdict.previous = Some(old);
  verdict.fresh = Some(new);
  Ok(verdict)
}
