//! Ticket workflows used by the request form and the technician dashboard.
//!
//! Thin layer over [`TicketStore`]: it builds tickets and comments with the
//! right author, kind and timestamps, and writes a system comment for every
//! status change.

use chrono::Utc;
use tracing::info;

use crate::{
    config::StoreConfig,
    domain::{
        Assignee, Comment, CommentKind, NewTicket, Priority, Ticket, TicketId, TicketPatch,
        TicketStats, TicketStatus,
    },
    error::{Result, SoportechError},
    storage::{Stored, TicketStore},
};

const CREATED_MESSAGE: &str = "Ticket created successfully.";
const EMAIL_DOMAIN: &str = "soporte.com";

/// Raw input from the public request form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub priority: Option<Priority>,
}

impl TicketForm {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            subject: subject.into(),
            message: message.into(),
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    fn into_new_ticket(self) -> NewTicket {
        NewTicket::new(
            self.name.trim(),
            self.email.trim(),
            self.subject.trim(),
            self.message.trim(),
        )
        .with_priority(self.priority.unwrap_or_default())
    }
}

/// Technician address derived from a display name (`Rodrigo Tapia` →
/// `rodrigo.tapia@soporte.com`)
pub fn technician_email(name: &str) -> String {
    let local = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(".");
    format!("{}@{}", local, EMAIL_DOMAIN)
}

#[derive(Clone)]
pub struct TicketService {
    store: TicketStore,
    technicians: Vec<String>,
}

impl TicketService {
    pub fn new(store: TicketStore, config: &StoreConfig) -> Self {
        Self {
            store,
            technicians: config.technicians.clone(),
        }
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Configured technician roster
    pub fn technicians(&self) -> &[String] {
        &self.technicians
    }

    /// Files a new ticket from the request form
    pub async fn submit(&self, form: TicketForm) -> Result<Stored<TicketId>> {
        let new = form.into_new_ticket();
        new.validate()?;

        let new = new.with_comment(Comment::system(CREATED_MESSAGE, Utc::now()));
        let stored = self.store.create_ticket(new).await?;
        info!(ticket_id = %stored.value, backend = %stored.backend, "ticket submitted");
        Ok(stored)
    }

    pub async fn list(&self) -> Result<Stored<Vec<Ticket>>> {
        self.store.get_all_tickets().await
    }

    pub async fn get(&self, id: &TicketId) -> Result<Stored<Option<Ticket>>> {
        self.store.get_ticket(id).await
    }

    pub async fn stats(&self) -> Result<Stored<TicketStats>> {
        Ok(self
            .list()
            .await?
            .map(|tickets| TicketStats::from_tickets(&tickets)))
    }

    /// Flips Open ↔ Closed; `None` when the ticket does not exist
    pub async fn toggle_status(&self, id: &TicketId) -> Result<Stored<Option<TicketStatus>>> {
        let current = self.get(id).await?;
        let Some(ticket) = current.value else {
            return Ok(Stored {
                value: None,
                backend: current.backend,
                notice: current.notice,
            });
        };

        let next = ticket.status.toggled();
        let stored = self.set_status(id, next).await?;
        Ok(stored.map(|updated| updated.then_some(next)))
    }

    pub async fn close(&self, id: &TicketId) -> Result<Stored<bool>> {
        self.set_status(id, TicketStatus::Closed).await
    }

    pub async fn reopen(&self, id: &TicketId) -> Result<Stored<bool>> {
        self.set_status(id, TicketStatus::Open).await
    }

    /// Sets the status and records the change as a system comment
    pub async fn set_status(&self, id: &TicketId, status: TicketStatus) -> Result<Stored<bool>> {
        let note = Comment::system(format!("Status changed to {}.", status), Utc::now());
        let stored = self
            .store
            .update_ticket_with_comment(id, TicketPatch::status(status), note)
            .await?;
        if stored.value {
            info!(ticket_id = %id, %status, "ticket status changed");
        }
        Ok(stored)
    }

    /// Assigns a technician, deriving the email from the name
    pub async fn assign(&self, id: &TicketId, technician: &str) -> Result<Stored<bool>> {
        let name = technician.trim();
        if name.is_empty() {
            return Err(missing("technician"));
        }

        let assignee = Assignee::new(name).with_email(technician_email(name));
        let stored = self.store.update_ticket(id, TicketPatch::assign(assignee)).await?;
        if stored.value {
            info!(ticket_id = %id, technician = name, "ticket assigned");
        }
        Ok(stored)
    }

    pub async fn unassign(&self, id: &TicketId) -> Result<Stored<bool>> {
        let patch = TicketPatch {
            assignee: Some(None),
            ..TicketPatch::default()
        };
        self.store.update_ticket(id, patch).await
    }

    /// Reply visible to the requester
    pub async fn add_technician_comment(
        &self,
        id: &TicketId,
        technician: &str,
        text: &str,
    ) -> Result<Stored<bool>> {
        let comment = build_comment(technician, text, CommentKind::FromTechnician)?
            .with_email(technician_email(technician));
        self.store.add_comment(id, comment).await
    }

    /// Note only technicians can see
    pub async fn add_internal_note(
        &self,
        id: &TicketId,
        technician: &str,
        text: &str,
    ) -> Result<Stored<bool>> {
        let comment = build_comment(technician, text, CommentKind::Internal)?
            .with_email(technician_email(technician));
        self.store.add_comment(id, comment).await
    }

    pub async fn add_requester_comment(
        &self,
        id: &TicketId,
        name: &str,
        email: &str,
        text: &str,
    ) -> Result<Stored<bool>> {
        let comment = build_comment(name, text, CommentKind::FromRequester)?.with_email(email.trim());
        self.store.add_comment(id, comment).await
    }

    /// Empties the local collection
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear_all()
    }
}

fn build_comment(author: &str, text: &str, kind: CommentKind) -> Result<Comment> {
    let text = text.trim();
    if text.is_empty() {
        return Err(missing("text"));
    }
    Ok(Comment::new(author.trim(), text, kind, Utc::now()))
}

fn missing(field: &str) -> SoportechError {
    SoportechError::Validation {
        missing: vec![field.to_string()],
    }
}
