//! Cache layer that orchestrates caching logic with network fetching.

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

use super::decide::{decide, UpdateVerdict, Verdict};
use super::record::{CacheRecord, Validators};
use super::storage::CacheStorage;
use super::traits::{CacheResult, CacheSource, FetchOutcome, Fetcher};

/// Default number of fetch attempts per run.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Cache layer that keeps one dataset's local copy fresh.
///
/// This layer sits between the command line and the network client,
/// deciding when the local copy must be replaced and serving it offline.
pub struct CacheLayer<S: CacheStorage, F: Fetcher> {
  storage: S,
  fetcher: F,
  /// Attempts per run before giving up on the network
  attempts: u32,
}

impl<S: CacheStorage, F: Fetcher> CacheLayer<S, F> {
  /// Create a new cache layer with the given storage backend and fetcher.
  pub fn new(storage: S, fetcher: F) -> Self {
    Self {
      storage,
      fetcher,
      attempts: DEFAULT_ATTEMPTS,
    }
  }

  /// Set how many times a failing fetch is attempted. Zero is treated as one.
  pub fn with_attempts(mut self, attempts: u32) -> Self {
    self.attempts = attempts.max(1);
    self
  }

  /// Fetch with retries on network errors only. No backoff.
  async fn fetch_with_retries(
    &self,
    validators: Option<&Validators>,
  ) -> (Result<FetchOutcome>, u32) {
    let mut attempt = 0;
    loop {
      attempt += 1;
      debug!(
        endpoint = self.fetcher.endpoint(),
        attempt,
        conditional = validators.is_some(),
        "fetching"
      );

      match self.fetcher.fetch(validators).await {
        Err(e) if e.is_network() && attempt < self.attempts => {
          warn!(
            endpoint = self.fetcher.endpoint(),
            attempt,
            max = self.attempts,
            error = %e,
            "fetch failed, retrying"
          );
        }
        result => return (result, attempt),
      }
    }
  }

  /// Make sure the local copy reflects the remote dataset.
  ///
  /// 1. Load the cached record (missing or corrupt counts as absent)
  /// 2. Fetch, conditionally when the cached record carries validators
  /// 3. On 304, keep the cached record
  /// 4. Otherwise compare content hashes and persist when changed or new
  /// 5. On network failure, serve the cached record (offline mode)
  ///
  /// With `force`, the fetch is unconditional and the result is always persisted.
  pub async fn ensure_fresh(&self, force: bool) -> Result<CacheResult> {
    let previous = self.storage.load();

    if force {
      return self.force_update(previous).await;
    }

    let validators = previous.as_ref().and_then(|r| r.metadata.validators());
    let (fetched, attempts) = self.fetch_with_retries(validators.as_ref()).await;

    match fetched {
      Ok(FetchOutcome::NotModified(_)) => match previous {
        Some(record) if validators.is_some() => {
          info!(endpoint = self.fetcher.endpoint(), "server reports not modified");
          Ok(CacheResult {
            record,
            was_updated: false,
            forced: false,
            verdict: Some(UpdateVerdict::new(
              Verdict::UpToDate,
              "server reported not modified (HTTP 304)",
            )),
            source: CacheSource::NotModified,
            attempts,
            network_error: None,
          })
        }
        _ => Err(SyncError::network(
          self.fetcher.endpoint(),
          "server answered 304 to an unconditional request",
        )),
      },
      Ok(FetchOutcome::Fetched(payload, metadata)) => {
        let verdict = decide(previous.as_ref(), &payload)?;
        info!(
          endpoint = self.fetcher.endpoint(),
          verdict = %verdict.verdict,
          reason = %verdict.reason,
          "update check"
        );

        let (record, was_updated) = match previous {
          Some(record) if !verdict.needs_save() => (record, false),
          _ => {
            let record = CacheRecord::new(payload, metadata);
            self.storage.save(&record)?;
            (record, true)
          }
        };

        Ok(CacheResult {
          record,
          was_updated,
          forced: false,
          verdict: Some(verdict),
          source: CacheSource::Network,
          attempts,
          network_error: None,
        })
      }
      Err(e) if e.is_network() => match previous {
        Some(record) => {
          warn!(
            endpoint = self.fetcher.endpoint(),
            error = %e,
            "network unavailable, using cached data"
          );
          Ok(CacheResult {
            record,
            was_updated: false,
            forced: false,
            verdict: None,
            source: CacheSource::Offline,
            attempts,
            network_error: Some(e.to_string()),
          })
        }
        None => Err(e),
      },
      Err(e) => Err(e),
    }
  }

  async fn force_update(&self, previous: Option<CacheRecord>) -> Result<CacheResult> {
    let (fetched, attempts) = self.fetch_with_retries(None).await;

    let (payload, metadata) = match fetched? {
      FetchOutcome::Fetched(payload, metadata) => (payload, metadata),
      FetchOutcome::NotModified(_) => {
        return Err(SyncError::network(
          self.fetcher.endpoint(),
          "server answered 304 to an unconditional request",
        ))
      }
    };

    // Computed for the report only; a forced update always persists
    let verdict = decide(previous.as_ref(), &payload)?;
    info!(endpoint = self.fetcher.endpoint(), verdict = %verdict.verdict, "forced update");

    let record = CacheRecord::new(payload, metadata);
    self.storage.save(&record)?;

    Ok(CacheResult {
      record,
      was_updated: true,
      forced: true,
      verdict: Some(verdict),
      source: CacheSource::Network,
      attempts,
      network_error: None,
    })
  }
}
