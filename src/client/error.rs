//! Error types for the async API client.

use thiserror::Error;

/// Errors recorded while dispatching fetches or running their handlers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The rendered URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A completion handler failed (parse or persistence failure).
    #[error("handler failed for {url}: {error:#}")]
    Handler {
        /// The URL whose handler failed.
        url: String,
        /// The handler's error.
        error: anyhow::Error,
    },

    /// The client was shut down while a fetch was waiting for a worker slot.
    #[error("client shut down while fetching {url}")]
    Shutdown {
        /// The URL that was waiting.
        url: String,
    },
}

impl ClientError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a handler error.
    pub fn handler(url: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Handler {
            url: url.into(),
            error,
        }
    }

    /// Creates a shutdown error.
    pub fn shutdown(url: impl Into<String>) -> Self {
        Self::Shutdown { url: url.into() }
    }
}
