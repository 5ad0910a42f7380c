//! Response-body parsers.
//!
//! A parser turns one buffered response into a sequence of opaque JSON
//! payloads; the collector stages each payload as one row. Returning zero
//! payloads is not an error — the striped pagination strategy uses a short
//! page as its end-of-stream signal.

use std::fmt;
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::value::RawValue;

use crate::client::ApiResponse;

/// A user-supplied parser function.
pub type ParserFn =
    Arc<dyn Fn(&ApiResponse) -> anyhow::Result<Vec<Box<RawValue>>> + Send + Sync>;

/// How a response body maps to raw records.
#[derive(Clone)]
pub enum ResponseParser {
    /// The whole body is one record.
    Direct,
    /// The body is a JSON array; each element is one record.
    Array,
    /// Caller-supplied extraction (e.g. records nested under a `values` key).
    Custom(ParserFn),
}

impl ResponseParser {
    /// Wraps a closure as a custom parser.
    pub fn custom<F>(parse: F) -> Self
    where
        F: Fn(&ApiResponse) -> anyhow::Result<Vec<Box<RawValue>>> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(parse))
    }

    /// Extracts the opaque payloads from a response.
    ///
    /// # Errors
    ///
    /// Returns an error when the body does not have the expected shape.
    pub fn parse(&self, response: &ApiResponse) -> anyhow::Result<Vec<Box<RawValue>>> {
        match self {
            Self::Direct => {
                let record: Box<RawValue> = serde_json::from_slice(response.body())
                    .with_context(|| format!("response from {} is not valid JSON", response.url()))?;
                Ok(vec![record])
            }
            Self::Array => {
                let records: Vec<Box<RawValue>> = serde_json::from_slice(response.body())
                    .with_context(|| {
                        format!("response from {} is not a JSON array", response.url())
                    })?;
                Ok(records)
            }
            Self::Custom(parse) => parse(response),
        }
    }
}

impl fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("ResponseParser::Direct"),
            Self::Array => f.write_str("ResponseParser::Array"),
            Self::Custom(_) => f.write_str("ResponseParser::Custom(..)"),
        }
    }
}
