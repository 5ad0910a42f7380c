//! Collector Core Library
//!
//! This library provides a paginated API collection engine: given a
//! templated endpoint, a rate-limited async HTTP client, and optionally a
//! driving iterator of upstream records, it fetches all pages of a remote
//! resource concurrently and stages each page's raw records in a SQLite
//! table, keyed by the run's parameter fingerprint, with full provenance
//! (URL and driving input) for downstream parsers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`raw`] - Raw record staging store (open / prepare / purge / insert / read back)
//! - [`template`] - Compiled URL templates with per-request slots
//! - [`client`] - Rate-limited async API client with a quiescence barrier
//! - [`collector`] - The collection façade and its pagination strategies
//! - [`progress`] - Atomic run progress counters
//! - [`source`] - Run-parameter validation for git-repository sources

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod collector;
pub mod progress;
pub mod raw;
pub mod source;
pub mod template;

// Re-export commonly used types
pub use client::{
    ApiClient, ApiClientConfig, ApiRequest, ApiResponse, ClientError, DEFAULT_MAX_PARALLEL,
    DEFAULT_REQUESTS_PER_SECOND, RateLimiter, ResponseHandler,
};
pub use collector::{
    ApiCollector, ApiCollectorArgs, CollectError, DEFAULT_INPUT_RATE_LIMIT, InputSource, Pager,
    RequestContext, ResponseParser, VecInput,
};
pub use progress::Progress;
pub use raw::{NewRawRecord, RawRecord, RawStore, RawStoreError};
pub use source::{GitSourceOptions, SourceError};
pub use template::{TemplateError, UrlTemplate};
