//! # Soportech Core
//!
//! Persistence core for the Soportech help desk.
//!
//! Support tickets are stored in a remote document collection when it is
//! reachable and in a local key-value store otherwise. [`TicketStore`] hides
//! which backend served a call, [`realtime`] pushes ordered snapshots to
//! subscribers, and [`TicketService`] implements the form and dashboard
//! workflows on top.

pub mod config;
pub mod domain;
pub mod error;
pub mod realtime;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use config::{load_config, load_config_from_path, load_config_from_str, StoreConfig};
pub use domain::{
    Backend, Comment, CommentKind, NewTicket, Priority, Ticket, TicketId, TicketPatch,
    TicketStats, TicketStatus,
};
pub use error::{Result, SoportechError};
pub use realtime::{LiveView, Subscription};
pub use service::{TicketForm, TicketService};
pub use storage::{BackendHealth, DocumentCollection, MemoryCollection, Stored, TicketStore};
