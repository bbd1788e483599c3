//! Core traits and types for the caching system.

use crate::error::Result;

use super::decide::UpdateVerdict;
use super::record::{CacheRecord, FetchMetadata, Payload, Validators};

/// What a single fetch produced.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// A full response body, decoded into a payload
  Fetched(Payload, FetchMetadata),
  /// The server confirmed the validators still match (HTTP 304)
  NotModified(FetchMetadata),
}

/// Trait for remote data sources.
///
/// One call performs at most one outbound request; retrying is the caller's job.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
  /// Endpoint identifier used in logs and errors.
  fn endpoint(&self) -> &str;

  /// Fetch the dataset, sending conditional headers when `validators` is set.
  async fn fetch(&self, validators: Option<&Validators>) -> Result<FetchOutcome>;
}

/// Indicates where the returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// A full body was downloaded and compared
  Network,
  /// The server answered 304, nothing was downloaded
  NotModified,
  /// Offline mode - every attempt failed, serving the cached record
  Offline,
}

/// Result of an ensure-fresh run.
#[derive(Debug, Clone)]
pub struct CacheResult {
  /// The record now considered current
  pub record: CacheRecord,
  /// Whether the record was persisted during this run
  pub was_updated: bool,
  /// Whether the caller asked for an unconditional update
  pub forced: bool,
  /// How the verdict was reached; `None` when offline
  pub verdict: Option<UpdateVerdict>,
  pub source: CacheSource,
  /// Number of fetch attempts made
  pub attempts: u32,
  /// Last network error, when serving offline
  pub network_error: Option<String>,
}
