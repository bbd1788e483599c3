//! Local caching of fetched datasets with content-based update detection.
//!
//! This module is source-agnostic:
//! - Stores one record per dataset as a single JSON document, written atomically
//! - Fingerprints payloads with SHA-256 over canonical (key-sorted) JSON
//! - Decides between no-local-data, up-to-date and changed
//! - Uses HTTP validators for conditional fetches, never for the verdict
//! - Provides basic offline mode (serve the cached record when the network is down)

mod decide;
mod hash;
mod layer;
mod record;
mod storage;
mod traits;

pub use decide::{UpdateVerdict, Verdict};
pub use layer::{CacheLayer, DEFAULT_ATTEMPTS};
pub use record::{CacheRecord, FetchMetadata, Payload, Validators};
pub use storage::{CacheStorage, JsonFileStorage};
pub use traits::{CacheResult, CacheSource, FetchOutcome, Fetcher};
