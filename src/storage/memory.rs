use async_trait::async_trait;
use serde_json::Value;
use std::{
    cmp::Ordering,
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    domain::SortOrder,
    error::{Result, SoportechError},
    storage::collection::{Document, DocumentCollection, Keyed, SnapshotFeed},
};

/// In-process document collection.
///
/// Behaves like a hosted document store: ids are assigned on insert, reads
/// can be ordered by any field and watchers receive a fresh ordered snapshot
/// after every change. Connectivity can be switched off to exercise the
/// fallback paths of the ticket store.
pub struct MemoryCollection {
    name: String,
    atomic_append: bool,
    handshake_delay: Option<Duration>,
    state: Mutex<CollectionState>,
}

#[derive(Default)]
struct CollectionState {
    docs: Vec<Keyed>,
    offline: bool,
    reject_writes: bool,
    watchers: Vec<Watcher>,
}

struct Watcher {
    field: String,
    order: SortOrder,
    tx: mpsc::UnboundedSender<Vec<Keyed>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atomic_append: true,
            handshake_delay: None,
            state: Mutex::new(CollectionState::default()),
        }
    }

    /// Disables server-side array append, forcing read-modify-write
    pub fn without_atomic_append(mut self) -> Self {
        self.atomic_append = false;
        self
    }

    /// Makes `ping` take this long before answering
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = Some(delay);
        self
    }

    /// Simulates losing or regaining the connection.
    ///
    /// Going offline closes every open feed.
    pub fn set_online(&self, online: bool) {
        let mut state = self.state();
        state.offline = !online;
        if !online {
            state.watchers.clear();
        }
        debug!(collection = %self.name, online, "connectivity changed");
    }

    /// Makes every write fail with `WriteError` while reads keep working
    pub fn set_reject_writes(&self, reject: bool) {
        self.state().reject_writes = reject;
    }

    /// Number of stored documents, ignoring connectivity
    pub fn len(&self) -> usize {
        self.state().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, CollectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self, state: &CollectionState) -> Result<()> {
        if state.offline {
            Err(SoportechError::BackendUnavailable(format!(
                "collection '{}' is unreachable",
                self.name
            )))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, state: &CollectionState) -> Result<()> {
        self.check_online(state)?;
        if state.reject_writes {
            Err(SoportechError::WriteError(format!(
                "write to '{}' rejected",
                self.name
            )))
        } else {
            Ok(())
        }
    }

    fn find_mut<'a>(state: &'a mut CollectionState, id: &str) -> Result<&'a mut Document> {
        state
            .docs
            .iter_mut()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, doc)| doc)
            .ok_or_else(|| SoportechError::NotFound(id.to_string()))
    }

    /// Pushes a fresh snapshot to every watcher, dropping closed ones
    fn notify(state: &mut CollectionState) {
        let docs = &state.docs;
        state
            .watchers
            .retain(|w| w.tx.send(ordered(docs, &w.field, w.order)).is_ok());
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        if let Some(delay) = self.handshake_delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        self.check_online(&state)
    }

    async fn add(&self, doc: Document) -> Result<String> {
        let mut state = self.state();
        self.check_writable(&state)?;

        let id = Uuid::new_v4().simple().to_string();
        state.docs.push((id.clone(), doc));
        Self::notify(&mut state);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let state = self.state();
        self.check_online(&state)?;
        Ok(state
            .docs
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, doc)| doc.clone()))
    }

    async fn list_ordered(&self, field: &str, order: SortOrder) -> Result<Vec<Keyed>> {
        let state = self.state();
        self.check_online(&state)?;
        Ok(ordered(&state.docs, field, order))
    }

    async fn update(&self, id: &str, fields: Document) -> Result<()> {
        let mut state = self.state();
        self.check_writable(&state)?;

        let doc = Self::find_mut(&mut state, id)?;
        doc.extend(fields);
        Self::notify(&mut state);
        Ok(())
    }

    fn supports_atomic_append(&self) -> bool {
        self.atomic_append
    }

    async fn append_to_array(
        &self,
        id: &str,
        field: &str,
        value: Value,
        also: Document,
    ) -> Result<()> {
        if !self.atomic_append {
            return Err(SoportechError::WriteError(format!(
                "collection '{}' does not support atomic array append",
                self.name
            )));
        }

        let mut state = self.state();
        self.check_writable(&state)?;

        let doc = Self::find_mut(&mut state, id)?;
        match doc
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
        doc.extend(also);
        Self::notify(&mut state);
        Ok(())
    }

    async fn watch_ordered(&self, field: &str, order: SortOrder) -> Result<SnapshotFeed> {
        let mut state = self.state();
        self.check_online(&state)?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot; the receiver is alive so this cannot fail
        let _ = tx.send(ordered(&state.docs, field, order));
        state.watchers.push(Watcher {
            field: field.to_string(),
            order,
            tx,
        });
        Ok(SnapshotFeed::new(rx))
    }
}

/// Stable sort by `field`; documents missing the field sort lowest
fn ordered(docs: &[Keyed], field: &str, order: SortOrder) -> Vec<Keyed> {
    let mut out = docs.to_vec();
    out.sort_by(|(_, a), (_, b)| {
        let cmp = compare_values(a.get(field), b.get(field));
        match order {
            SortOrder::Ascending => cmp,
            SortOrder::Descending => cmp.reverse(),
        }
    });
    out
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_add_assigns_unique_ids() {
        let col = MemoryCollection::new("tickets");
        let a = col.add(doc(json!({"n": 1}))).await.unwrap();
        let b = col.add(doc(json!({"n": 2}))).await.unwrap();

        assert_ne!(a, b);
        assert!(!a.is_empty());
        assert_eq!(col.len(), 2);
    }

    #[tokio::test]
    async fn test_list_ordered_descending() {
        let col = MemoryCollection::new("tickets");
        col.add(doc(json!({"createdAt": 10}))).await.unwrap();
        col.add(doc(json!({"createdAt": 30}))).await.unwrap();
        col.add(doc(json!({"createdAt": 20}))).await.unwrap();

        let docs = col.list_ordered("createdAt", SortOrder::Descending).await.unwrap();
        let values: Vec<_> = docs.iter().map(|(_, d)| d["createdAt"].clone()).collect();
        assert_eq!(values, vec![json!(30), json!(20), json!(10)]);
    }

    #[tokio::test]
    async fn test_update_merges_and_reports_missing() {
        let col = MemoryCollection::new("tickets");
        let id = col.add(doc(json!({"estado": "Abierto", "asunto": "x"}))).await.unwrap();

        col.update(&id, doc(json!({"estado": "Cerrado"}))).await.unwrap();
        let stored = col.get(&id).await.unwrap().unwrap();
        assert_eq!(stored["estado"], json!("Cerrado"));
        assert_eq!(stored["asunto"], json!("x"));

        let err = col.update("missing", Document::new()).await.unwrap_err();
        assert!(matches!(err, SoportechError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_offline_and_rejected_writes() {
        let col = MemoryCollection::new("tickets");

        col.set_reject_writes(true);
        assert!(matches!(
            col.add(Document::new()).await,
            Err(SoportechError::WriteError(_))
        ));
        assert!(col.list_ordered("createdAt", SortOrder::Ascending).await.is_ok());

        col.set_online(false);
        assert!(matches!(col.ping().await, Err(SoportechError::BackendUnavailable(_))));
        assert!(matches!(
            col.get("x").await,
            Err(SoportechError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_append_to_array() {
        let col = MemoryCollection::new("tickets");
        let id = col.add(Document::new()).await.unwrap();

        col.append_to_array(&id, "comentarios", json!("a"), doc(json!({"updatedAt": 5})))
            .await
            .unwrap();
        col.append_to_array(&id, "comentarios", json!("b"), Document::new())
            .await
            .unwrap();

        let stored = col.get(&id).await.unwrap().unwrap();
        assert_eq!(stored["comentarios"], json!(["a", "b"]));
        assert_eq!(stored["updatedAt"], json!(5));

        let plain = MemoryCollection::new("tickets").without_atomic_append();
        assert!(!plain.supports_atomic_append());
    }

    #[tokio::test]
    async fn test_watch_delivers_initial_and_change_snapshots() {
        let col = MemoryCollection::new("tickets");
        col.add(doc(json!({"updatedAt": 1}))).await.unwrap();

        let mut feed = col.watch_ordered("updatedAt", SortOrder::Descending).await.unwrap();
        assert_eq!(feed.next().await.unwrap().len(), 1);

        col.add(doc(json!({"updatedAt": 2}))).await.unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].1["updatedAt"], json!(2));

        col.set_online(false);
        assert!(feed.next().await.is_none());
    }

    #[test]
    fn test_compare_values_missing_sorts_lowest() {
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(2))), Ordering::Less);
    }
}
