//! Driving input sources.
//!
//! Some collections are parameterized by previously collected data — e.g.
//! fetching a changelog per issue, where each issue id becomes part of the
//! URL. An [`InputSource`] is that upstream sequence: the collector pulls
//! one record at a time, runs a full pagination pass for it, and closes the
//! source on every exit path.

use async_trait::async_trait;
use serde_json::Value;

/// A finite, lazily consumed sequence of driving records.
///
/// `next` returning `Ok(None)` signals exhaustion. `close` releases
/// whatever the source holds (a cursor, a file, a connection) and is called
/// by the collector exactly once, on success and on failure alike.
#[async_trait]
pub trait InputSource: Send {
    /// Pulls the next record, or `None` when the sequence is exhausted.
    async fn next(&mut self) -> anyhow::Result<Option<Value>>;

    /// Releases the source's resources. Default: nothing to release.
    async fn close(&mut self) {}
}

/// An in-memory input source over a fixed set of records.
#[derive(Debug)]
pub struct VecInput {
    records: std::vec::IntoIter<Value>,
}

impl VecInput {
    /// Creates a source yielding `records` in order.
    #[must_use]
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

#[async_trait]
impl InputSource for VecInput {
    async fn next(&mut self) -> anyhow::Result<Option<Value>> {
        Ok(self.records.next())
    }
}
