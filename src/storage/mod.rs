use crate::{
    domain::{Backend, Comment, NewTicket, Ticket, TicketId, TicketPatch},
    error::Result,
};
use async_trait::async_trait;

pub mod clock;
pub mod collection;
pub mod facade;
pub mod kv;
pub mod local;
pub mod memory;
pub mod remote;

pub use clock::Clock;
pub use collection::{Document, DocumentCollection, SnapshotFeed};
pub use facade::{BackendHealth, FallbackNotice, RemoteOutcome, Stored, TicketStore};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use local::LocalStore;
pub use memory::MemoryCollection;
pub use remote::RemoteStore;

/// CRUD surface shared by the remote and local ticket stores
#[async_trait]
pub trait TicketBackend: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> Backend;

    /// Persists a new ticket and returns its assigned id
    async fn create_ticket(&self, new: NewTicket) -> Result<TicketId>;

    /// Lists every ticket in the backend's canonical order
    async fn get_all_tickets(&self) -> Result<Vec<Ticket>>;

    /// Loads a single ticket, `None` when the id is unknown
    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// Merges `patch` into the ticket; `false` when the id is unknown
    async fn update_ticket(&self, id: &TicketId, patch: TicketPatch) -> Result<bool>;

    /// Appends a comment; `false` when the id is unknown
    async fn add_comment(&self, id: &TicketId, comment: Comment) -> Result<bool>;

    /// Merges `patch` and appends `comment` in a single write, so neither
    /// can land without the other
    async fn update_with_comment(
        &self,
        id: &TicketId,
        patch: TicketPatch,
        comment: Comment,
    ) -> Result<bool>;
}
