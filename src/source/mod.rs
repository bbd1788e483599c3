//! Remote dataset sources: the HTTP client and body decoders.

pub mod client;
pub mod decode;
pub mod sdmx;

pub use client::HttpFetcher;
