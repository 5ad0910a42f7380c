//! Error types for the collection façade.

use thiserror::Error;

use crate::client::ClientError;
use crate::raw::RawStoreError;
use crate::template::TemplateError;

/// Errors from constructing or executing a collector.
#[derive(Debug, Error)]
pub enum CollectError {
    /// No URL template was supplied.
    #[error("url template is required")]
    EmptyUrlTemplate,

    /// Template compilation or rendering failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The run params could not be serialized into a fingerprint.
    #[error("failed to serialize run params: {0}")]
    Params(#[source] serde_json::Error),

    /// Staging-store failure (prepare, purge, or insert).
    #[error(transparent)]
    Store(#[from] RawStoreError),

    /// Error surfaced by the async client's barrier.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The driving input iterator failed.
    #[error("input iterator failed: {error:#}")]
    Input {
        /// The iterator's error.
        error: anyhow::Error,
    },

    /// A per-request callback (query or header) failed.
    #[error("{name} callback failed: {error:#}")]
    Callback {
        /// Which callback failed.
        name: &'static str,
        /// The callback's error.
        error: anyhow::Error,
    },
}

impl CollectError {
    /// Creates an input-iterator error.
    pub fn input(error: anyhow::Error) -> Self {
        Self::Input { error }
    }

    /// Creates a callback error.
    pub fn callback(name: &'static str, error: anyhow::Error) -> Self {
        Self::Callback { name, error }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_names_the_callback() {
        let error = CollectError::callback("query", anyhow::anyhow!("bad state"));
        let msg = error.to_string();
        assert!(msg.contains("query"), "got: {msg}");
        assert!(msg.contains("bad state"), "got: {msg}");
    }

    #[test]
    fn test_template_error_is_transparent() {
        let template_error = crate::template::UrlTemplate::compile("t", "{{ broken").unwrap_err();
        let error = CollectError::from(template_error);
        assert!(error.to_string().contains("malformed slot"));
    }
}
