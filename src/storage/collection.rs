//! Contract for the remote document database the ticket store talks to.
//!
//! Modeled on a hosted document store: a named collection of JSON documents
//! keyed by backend-assigned ids, with ordered reads, partial merges and a
//! live feed of ordered full snapshots.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::{domain::SortOrder, error::Result, error::SoportechError};

/// A stored document body
pub type Document = Map<String, Value>;

/// A document together with its backend-assigned id
pub type Keyed = (String, Document);

/// Live stream of full, ordered collection snapshots.
///
/// Snapshots arrive in the order the backend emitted them. The stream ends
/// when the backend drops the connection.
pub struct SnapshotFeed {
    rx: mpsc::UnboundedReceiver<Vec<Keyed>>,
}

impl SnapshotFeed {
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<Keyed>>) -> Self {
        Self { rx }
    }

    /// Waits for the next snapshot, `None` once the feed is closed
    pub async fn next(&mut self) -> Option<Vec<Keyed>> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name (e.g. `tickets`)
    fn name(&self) -> &str;

    /// Handshake used to decide whether the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Inserts a document and returns the id the backend assigned
    async fn add(&self, doc: Document) -> Result<String>;

    /// Fetches one document
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Lists every document ordered by `field`
    async fn list_ordered(&self, field: &str, order: SortOrder) -> Result<Vec<Keyed>>;

    /// Shallow-merges `fields` into an existing document.
    ///
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, id: &str, fields: Document) -> Result<()>;

    /// Whether [`DocumentCollection::append_to_array`] is available
    fn supports_atomic_append(&self) -> bool {
        false
    }

    /// Appends `value` to the array at `field` and merges `also` in a single
    /// server-side step, so concurrent appends cannot overwrite each other.
    async fn append_to_array(
        &self,
        _id: &str,
        _field: &str,
        _value: Value,
        _also: Document,
    ) -> Result<()> {
        Err(SoportechError::WriteError(format!(
            "collection '{}' does not support atomic array append",
            self.name()
        )))
    }

    /// Opens a live feed ordered by `field`; the current snapshot is
    /// delivered first
    async fn watch_ordered(&self, field: &str, order: SortOrder) -> Result<SnapshotFeed>;
}
