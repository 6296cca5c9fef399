use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    domain::{
        Assignee, Backend, Comment, CommentKind, NewTicket, Priority, Requester, SortOrder,
        Ticket, TicketId, TicketPatch, TicketStatus,
    },
    error::{Result, SoportechError},
    storage::{
        collection::{Document, DocumentCollection, Keyed, SnapshotFeed},
        Clock, TicketBackend,
    },
};

const FIELD_COMMENTS: &str = "comentarios";
const FIELD_CREATED_AT: &str = "createdAt";
const FIELD_UPDATED_AT: &str = "updatedAt";
const UNASSIGNED_WIRE: &str = "Sin Asignar";

/// Ticket store backed by a remote document collection
///
/// Documents use the collection's historical field names (`asunto`,
/// `estado`, `comentarios`, ...). Timestamps are integer microseconds since
/// the epoch and are always written by this adapter.
pub struct RemoteStore {
    collection: Arc<dyn DocumentCollection>,
    clock: Arc<Clock>,
}

impl RemoteStore {
    pub fn new(collection: Arc<dyn DocumentCollection>, clock: Arc<Clock>) -> Self {
        Self { collection, clock }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Handshake with the backend
    pub async fn probe(&self) -> Result<()> {
        self.collection.ping().await
    }

    /// Opens a live feed of tickets ordered by `updatedAt`, newest first
    pub async fn subscribe(&self) -> Result<TicketFeed> {
        let feed = self
            .collection
            .watch_ordered(FIELD_UPDATED_AT, SortOrder::Descending)
            .await?;
        debug!(collection = %self.collection.name(), "realtime feed opened");
        Ok(TicketFeed { inner: feed })
    }

    fn stamp(&self) -> Value {
        Value::from(self.clock.now().timestamp_micros())
    }

    /// Read current comments, append, write the whole array back together
    /// with `also`.
    ///
    /// Not atomic: two writers interleaving between the read and the write
    /// lose one comment (last write wins on the whole array). Only used when
    /// the collection lacks server-side append.
    async fn append_comment_rmw(
        &self,
        id: &TicketId,
        comment: CommentDocument,
        mut also: Document,
    ) -> Result<bool> {
        let Some(doc) = self.collection.get(id.as_str()).await? else {
            return Ok(false);
        };
        let mut comments = match doc.get(FIELD_COMMENTS) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        comments.push(serde_json::to_value(comment)?);

        also.insert(FIELD_COMMENTS.to_string(), Value::Array(comments));
        not_found_as_false(self.collection.update(id.as_str(), also).await)
    }
}

#[async_trait]
impl TicketBackend for RemoteStore {
    fn kind(&self) -> Backend {
        Backend::Remote
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<TicketId> {
        let now = self.clock.now();
        let doc = TicketDocument::from_new(new, now);
        let id = self.collection.add(to_document(&doc)?).await?;

        debug!(ticket_id = %id, collection = %self.collection.name(), "ticket created remotely");
        Ok(TicketId::remote(id))
    }

    async fn get_all_tickets(&self) -> Result<Vec<Ticket>> {
        let docs = self
            .collection
            .list_ordered(FIELD_CREATED_AT, SortOrder::Descending)
            .await?;
        Ok(decode_all(docs))
    }

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        match self.collection.get(id.as_str()).await? {
            Some(doc) => Ok(Some(decode(id.as_str().to_string(), doc)?)),
            None => Ok(None),
        }
    }

    async fn update_ticket(&self, id: &TicketId, patch: TicketPatch) -> Result<bool> {
        let mut fields = patch_document(patch)?;
        fields.insert(FIELD_UPDATED_AT.to_string(), self.stamp());
        not_found_as_false(self.collection.update(id.as_str(), fields).await)
    }

    async fn add_comment(&self, id: &TicketId, comment: Comment) -> Result<bool> {
        self.update_with_comment(id, TicketPatch::default(), comment)
            .await
    }

    async fn update_with_comment(
        &self,
        id: &TicketId,
        patch: TicketPatch,
        comment: Comment,
    ) -> Result<bool> {
        let comment = CommentDocument::from(comment);
        let mut also = patch_document(patch)?;
        also.insert(FIELD_UPDATED_AT.to_string(), self.stamp());

        if !self.collection.supports_atomic_append() {
            return self.append_comment_rmw(id, comment, also).await;
        }
        not_found_as_false(
            self.collection
                .append_to_array(id.as_str(), FIELD_COMMENTS, serde_json::to_value(comment)?, also)
                .await,
        )
    }
}

/// Remote snapshot feed decoded into tickets
pub struct TicketFeed {
    inner: SnapshotFeed,
}

impl TicketFeed {
    /// Next full snapshot, `None` once the backend closes the feed
    pub async fn next(&mut self) -> Option<Vec<Ticket>> {
        self.inner.next().await.map(decode_all)
    }
}

fn not_found_as_false(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(SoportechError::NotFound(id)) => {
            debug!(ticket_id = %id, "ticket not found remotely");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Decodes a snapshot, skipping documents that do not parse
fn decode_all(docs: Vec<Keyed>) -> Vec<Ticket> {
    docs.into_iter()
        .filter_map(|(id, doc)| match decode(id.clone(), doc) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                warn!(ticket_id = %id, error = %e, "skipping malformed ticket document");
                None
            }
        })
        .collect()
}

fn decode(id: String, doc: Document) -> Result<Ticket> {
    let doc: TicketDocument = serde_json::from_value(Value::Object(doc))?;
    Ok(doc.into_ticket(TicketId::remote(id)))
}

fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SoportechError::Storage(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn patch_document(patch: TicketPatch) -> Result<Document> {
    let mut fields = Document::new();
    if let Some(status) = patch.status {
        fields.insert("estado".into(), Value::from(status_to_wire(status)));
    }
    if let Some(priority) = patch.priority {
        fields.insert("prioridad".into(), Value::from(priority_to_wire(priority)));
    }
    if let Some(assignee) = patch.assignee {
        let (name, email) = assignee_to_wire(assignee);
        fields.insert("tecnico".into(), Value::from(name));
        fields.insert("tecnico_email".into(), email.map(Value::from).unwrap_or(Value::Null));
    }
    if let Some(subject) = patch.subject {
        fields.insert("asunto".into(), Value::from(subject));
    }
    if let Some(body) = patch.body {
        fields.insert("mensaje".into(), Value::from(body));
    }
    if let Some(attachments) = patch.attachments {
        fields.insert("adjuntos".into(), serde_json::to_value(attachments)?);
    }
    Ok(fields)
}

#[derive(Debug, Serialize, Deserialize)]
struct TicketDocument {
    nombre: String,
    email: String,
    asunto: String,
    mensaje: String,
    estado: String,
    #[serde(default)]
    prioridad: Option<String>,
    #[serde(default)]
    tecnico: Option<String>,
    #[serde(default)]
    tecnico_email: Option<String>,
    #[serde(default)]
    comentarios: Vec<CommentDocument>,
    #[serde(default)]
    adjuntos: Vec<String>,
    #[serde(rename = "createdAt", with = "chrono::serde::ts_microseconds")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "chrono::serde::ts_microseconds")]
    updated_at: DateTime<Utc>,
}

impl TicketDocument {
    fn from_new(new: NewTicket, now: DateTime<Utc>) -> Self {
        let (tecnico, tecnico_email) = assignee_to_wire(new.assignee);
        Self {
            nombre: new.requester.name,
            email: new.requester.email,
            asunto: new.subject,
            mensaje: new.body,
            estado: status_to_wire(TicketStatus::Open).to_string(),
            prioridad: Some(priority_to_wire(new.priority).to_string()),
            tecnico: Some(tecnico),
            tecnico_email,
            comentarios: new.comments.into_iter().map(CommentDocument::from).collect(),
            adjuntos: new.attachments,
            created_at: now,
            updated_at: now,
        }
    }

    fn into_ticket(self, id: TicketId) -> Ticket {
        let assignee = self
            .tecnico
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case(UNASSIGNED_WIRE))
            .map(|name| Assignee {
                name,
                email: self.tecnico_email,
            });
        Ticket {
            id,
            requester: Requester {
                name: self.nombre,
                email: self.email,
            },
            subject: self.asunto,
            body: self.mensaje,
            status: status_from_wire(&self.estado),
            priority: self
                .prioridad
                .as_deref()
                .map(priority_from_wire)
                .unwrap_or_default(),
            assignee,
            created_at: self.created_at,
            updated_at: self.updated_at,
            comments: self.comentarios.into_iter().map(Comment::from).collect(),
            attachments: self.adjuntos,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CommentDocument {
    autor: String,
    texto: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    fecha: DateTime<Utc>,
    tipo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

impl From<Comment> for CommentDocument {
    fn from(c: Comment) -> Self {
        Self {
            autor: c.author,
            texto: c.text,
            fecha: c.created_at,
            tipo: kind_to_wire(c.kind).to_string(),
            email: c.email,
        }
    }
}

impl From<CommentDocument> for Comment {
    fn from(c: CommentDocument) -> Self {
        Self {
            author: c.autor,
            text: c.texto,
            created_at: c.fecha,
            kind: kind_from_wire(&c.tipo),
            email: c.email,
        }
    }
}

fn status_to_wire(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "Abierto",
        TicketStatus::Closed => "Cerrado",
    }
}

fn status_from_wire(s: &str) -> TicketStatus {
    match s {
        "Cerrado" => TicketStatus::Closed,
        _ => TicketStatus::Open,
    }
}

fn priority_to_wire(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "Baja",
        Priority::Medium => "Media",
        Priority::High => "Alta",
    }
}

fn priority_from_wire(s: &str) -> Priority {
    match s {
        "Baja" => Priority::Low,
        "Alta" => Priority::High,
        _ => Priority::Medium,
    }
}

fn kind_to_wire(kind: CommentKind) -> &'static str {
    match kind {
        CommentKind::FromRequester => "usuario",
        CommentKind::FromTechnician => "tecnico",
        CommentKind::Internal => "interno",
        CommentKind::System => "sistema",
    }
}

fn kind_from_wire(s: &str) -> CommentKind {
    match s {
        "usuario" => CommentKind::FromRequester,
        "tecnico" => CommentKind::FromTechnician,
        "interno" => CommentKind::Internal,
        _ => CommentKind::System,
    }
}

fn assignee_to_wire(assignee: Option<Assignee>) -> (String, Option<String>) {
    match assignee {
        Some(a) => (a.name, a.email),
        None => (UNASSIGNED_WIRE.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sorting::is_newest_first;
    use crate::storage::MemoryCollection;
    use serde_json::json;
    use tokio::sync::Barrier;

    fn remote(collection: Arc<dyn DocumentCollection>) -> RemoteStore {
        RemoteStore::new(collection, Arc::new(Clock::new()))
    }

    fn ana() -> NewTicket {
        NewTicket::new("Ana", "ana@x.com", "Login fails", "Cannot log in")
    }

    #[tokio::test]
    async fn test_create_writes_wire_fields() {
        let col = Arc::new(MemoryCollection::new("tickets"));
        let store = remote(col.clone());

        let id = store.create_ticket(ana()).await.unwrap();
        assert_eq!(id.origin(), Backend::Remote);

        let doc = col.get(id.as_str()).await.unwrap().unwrap();
        assert_eq!(doc["asunto"], json!("Login fails"));
        assert_eq!(doc["estado"], json!("Abierto"));
        assert_eq!(doc["prioridad"], json!("Media"));
        assert_eq!(doc["tecnico"], json!("Sin Asignar"));
        assert_eq!(doc["comentarios"], json!([]));
        assert_eq!(doc["adjuntos"], json!([]));
        assert!(doc["createdAt"].is_i64());
        assert_eq!(doc["createdAt"], doc["updatedAt"]);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let store = remote(Arc::new(MemoryCollection::new("tickets")));
        let new = ana()
            .with_priority(Priority::High)
            .with_comment(Comment::system("Ticket created successfully.", Utc::now()));

        let id = store.create_ticket(new.clone()).await.unwrap();
        let ticket = store.get_ticket(&id).await.unwrap().unwrap();

        assert_eq!(ticket.requester, new.requester);
        assert_eq!(ticket.subject, new.subject);
        assert_eq!(ticket.body, new.body);
        assert_eq!(ticket.priority, Priority::High);
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(ticket.assignee.is_none());
        assert_eq!(ticket.comments.len(), 1);
        assert_eq!(ticket.comments[0].kind, CommentKind::System);
    }

    #[tokio::test]
    async fn test_get_all_newest_first() {
        let store = remote(Arc::new(MemoryCollection::new("tickets")));
        for n in 0..5 {
            store
                .create_ticket(NewTicket::new("Ana", "ana@x.com", format!("t{n}"), "b"))
                .await
                .unwrap();
        }

        let tickets = store.get_all_tickets().await.unwrap();
        assert_eq!(tickets.len(), 5);
        assert!(is_newest_first(&tickets));
        assert_eq!(tickets[0].subject, "t4");

        // Idempotent without intervening writes
        assert_eq!(store.get_all_tickets().await.unwrap(), tickets);
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let store = remote(Arc::new(MemoryCollection::new("tickets")));
        let id = store.create_ticket(ana()).await.unwrap();

        let patch = TicketPatch {
            status: Some(TicketStatus::Closed),
            assignee: Some(Some(
                Assignee::new("Rodrigo Tapia").with_email("rodrigo.tapia@soporte.com"),
            )),
            ..TicketPatch::default()
        };
        assert!(store.update_ticket(&id, patch).await.unwrap());

        let ticket = store.get_ticket(&id).await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Closed);
        assert_eq!(ticket.assignee_name(), "Rodrigo Tapia");
        assert!(ticket.updated_at > ticket.created_at);
    }

    #[tokio::test]
    async fn test_unknown_id_returns_false() {
        let store = remote(Arc::new(MemoryCollection::new("tickets")));
        store.create_ticket(ana()).await.unwrap();
        let before = store.get_all_tickets().await.unwrap();

        let missing = TicketId::remote("nope");
        assert!(!store
            .update_ticket(&missing, TicketPatch::status(TicketStatus::Closed))
            .await
            .unwrap());
        assert!(!store
            .add_comment(&missing, Comment::system("x", Utc::now()))
            .await
            .unwrap());

        let rmw = remote(Arc::new(MemoryCollection::new("tickets").without_atomic_append()));
        assert!(!rmw
            .add_comment(&missing, Comment::system("x", Utc::now()))
            .await
            .unwrap());

        assert_eq!(store.get_all_tickets().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_sequential_comments_kept_in_order() {
        for col in [
            MemoryCollection::new("tickets"),
            MemoryCollection::new("tickets").without_atomic_append(),
        ] {
            let store = remote(Arc::new(col));
            let id = store.create_ticket(ana()).await.unwrap();

            let now = Utc::now();
            for text in ["first", "second"] {
                let comment = Comment::new("Ana", text, CommentKind::FromRequester, now);
                assert!(store.add_comment(&id, comment).await.unwrap());
            }

            let ticket = store.get_ticket(&id).await.unwrap().unwrap();
            let texts: Vec<_> = ticket.comments.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(texts, vec!["first", "second"]);
        }
    }

    #[tokio::test]
    async fn test_update_with_comment_lands_in_one_write() {
        for col in [
            MemoryCollection::new("tickets"),
            MemoryCollection::new("tickets").without_atomic_append(),
        ] {
            let col = Arc::new(col);
            let store = remote(col.clone());
            let id = store.create_ticket(ana()).await.unwrap();

            let note = Comment::system("Estado cambiado a Cerrado", Utc::now());
            let updated = store
                .update_with_comment(&id, TicketPatch::status(TicketStatus::Closed), note)
                .await
                .unwrap();
            assert!(updated);

            let doc = col.get(id.as_str()).await.unwrap().unwrap();
            assert_eq!(doc["estado"], json!("Cerrado"));
            assert_eq!(doc["comentarios"].as_array().map(Vec::len), Some(1));
            assert!(doc["updatedAt"].as_i64() > doc["createdAt"].as_i64());
        }
    }

    /// Collection whose reads wait until two readers have arrived, forcing
    /// two comment writers to interleave between read and write.
    struct InterleavingCollection {
        inner: MemoryCollection,
        barrier: Barrier,
    }

    #[async_trait]
    impl DocumentCollection for InterleavingCollection {
        fn name(&self) -> &str {
            self.inner.name()
        }
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn add(&self, doc: Document) -> Result<String> {
            self.inner.add(doc).await
        }
        async fn get(&self, id: &str) -> Result<Option<Document>> {
            let doc = self.inner.get(id).await;
            self.barrier.wait().await;
            doc
        }
        async fn list_ordered(&self, field: &str, order: SortOrder) -> Result<Vec<Keyed>> {
            self.inner.list_ordered(field, order).await
        }
        async fn update(&self, id: &str, fields: Document) -> Result<()> {
            self.inner.update(id, fields).await
        }
        fn supports_atomic_append(&self) -> bool {
            self.inner.supports_atomic_append()
        }
        async fn append_to_array(
            &self,
            id: &str,
            field: &str,
            value: Value,
            also: Document,
        ) -> Result<()> {
            self.inner.append_to_array(id, field, value, also).await
        }
        async fn watch_ordered(&self, field: &str, order: SortOrder) -> Result<SnapshotFeed> {
            self.inner.watch_ordered(field, order).await
        }
    }

    async fn concurrent_comment_count(inner: MemoryCollection) -> usize {
        let col = Arc::new(InterleavingCollection {
            inner,
            barrier: Barrier::new(2),
        });
        let store = Arc::new(remote(col.clone()));
        let id = store.create_ticket(ana()).await.unwrap();

        let now = Utc::now();
        let a = {
            let (store, id) = (store.clone(), id.clone());
            tokio::spawn(async move {
                store
                    .add_comment(&id, Comment::new("Naobi", "a", CommentKind::FromTechnician, now))
                    .await
            })
        };
        let b = {
            let (store, id) = (store.clone(), id.clone());
            tokio::spawn(async move {
                store
                    .add_comment(&id, Comment::new("Rafael", "b", CommentKind::FromTechnician, now))
                    .await
            })
        };
        assert!(a.await.unwrap().unwrap());
        assert!(b.await.unwrap().unwrap());

        let doc = col.inner.get(id.as_str()).await.unwrap().unwrap();
        doc["comentarios"].as_array().map(Vec::len).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_read_modify_write_loses_concurrent_comment() {
        // Both writers read an empty array, so the second write clobbers the first
        let kept = concurrent_comment_count(MemoryCollection::new("tickets").without_atomic_append()).await;
        assert_eq!(kept, 1);
    }

    #[tokio::test]
    async fn test_atomic_append_keeps_concurrent_comments() {
        let kept = concurrent_comment_count(MemoryCollection::new("tickets")).await;
        assert_eq!(kept, 2);
    }

    #[tokio::test]
    async fn test_malformed_documents_are_skipped() {
        let col = Arc::new(MemoryCollection::new("tickets"));
        let store = remote(col.clone());
        store.create_ticket(ana()).await.unwrap();

        let mut junk = Document::new();
        junk.insert("createdAt".into(), json!(i64::MAX));
        col.add(junk).await.unwrap();

        let tickets = store.get_all_tickets().await.unwrap();
        assert_eq!(tickets.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_surfaces_backend_unavailable() {
        let col = Arc::new(MemoryCollection::new("tickets"));
        let store = remote(col.clone());
        col.set_online(false);

        assert!(matches!(
            store.create_ticket(ana()).await,
            Err(SoportechError::BackendUnavailable(_))
        ));
        assert!(matches!(
            store.get_all_tickets().await,
            Err(SoportechError::BackendUnavailable(_))
        ));
        assert!(store.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_feed_ordered_by_updated_at() {
        let col = Arc::new(MemoryCollection::new("tickets"));
        let store = remote(col.clone());
        let first = store.create_ticket(ana()).await.unwrap();
        store.create_ticket(ana()).await.unwrap();

        let mut feed = store.subscribe().await.unwrap();
        let initial = feed.next().await.unwrap();
        assert_eq!(initial.len(), 2);
        assert_ne!(initial[0].id, first);

        store
            .update_ticket(&first, TicketPatch::status(TicketStatus::Closed))
            .await
            .unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot[0].id, first);
        assert_eq!(snapshot[0].status, TicketStatus::Closed);
    }
}
