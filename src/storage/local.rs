use crate::{
    domain::{Backend, Comment, NewTicket, Ticket, TicketId, TicketPatch},
    error::Result,
    storage::{Clock, KeyValueStore, TicketBackend},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Fallback ticket store persisting the whole collection as one JSON blob
///
/// All operations are synchronous. The internal lock serializes
/// read-modify-write cycles on the blob within this process; writers in
/// other processes sharing the same storage are not coordinated.
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    clock: Arc<Clock>,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub const DEFAULT_KEY: &'static str = "tickets";
    const SEED_ID: i64 = 1;

    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>, clock: Arc<Clock>) -> Self {
        Self {
            kv,
            key: key.into(),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a ticket, assigning a `local_<micros>` id
    pub fn create(&self, new: NewTicket) -> Result<TicketId> {
        let _guard = self.lock();
        let mut tickets = self.load()?;

        let now = self.clock.now();
        let id = TicketId::local(now.timestamp_micros());
        tickets.push(Ticket::from_new(id.clone(), new, now));
        self.save(&tickets)?;

        debug!(ticket_id = %id, "ticket created locally");
        Ok(id)
    }

    /// Returns all tickets in insertion order, seeding an example on first run
    pub fn get_all(&self) -> Result<Vec<Ticket>> {
        let _guard = self.lock();
        self.load()
    }

    pub fn get(&self, id: &TicketId) -> Result<Option<Ticket>> {
        Ok(self.get_all()?.into_iter().find(|t| &t.id == id))
    }

    pub fn update(&self, id: &TicketId, patch: TicketPatch) -> Result<bool> {
        self.modify(id, |ticket, clock| {
            let now = clock.after(ticket.updated_at);
            ticket.apply(patch, now);
        })
    }

    pub fn add_comment(&self, id: &TicketId, comment: Comment) -> Result<bool> {
        self.modify(id, |ticket, clock| {
            let now = clock.after(ticket.updated_at);
            ticket.push_comment(comment, now);
        })
    }

    /// Applies `patch` and appends `comment` under one lock and one save
    pub fn update_with_comment(
        &self,
        id: &TicketId,
        patch: TicketPatch,
        comment: Comment,
    ) -> Result<bool> {
        self.modify(id, |ticket, clock| {
            let now = clock.after(ticket.updated_at);
            ticket.apply(patch, now);
            ticket.push_comment(comment, now);
        })
    }

    /// Empties the collection; seeding does not run again afterwards
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.lock();
        self.save(&[])?;
        info!(key = %self.key, "local ticket collection cleared");
        Ok(())
    }

    fn modify(&self, id: &TicketId, f: impl FnOnce(&mut Ticket, &Clock)) -> Result<bool> {
        let _guard = self.lock();
        let mut tickets = self.load()?;

        let Some(ticket) = tickets.iter_mut().find(|t| &t.id == id) else {
            debug!(ticket_id = %id, "ticket not found locally");
            return Ok(false);
        };
        f(ticket, self.clock.as_ref());
        self.save(&tickets)?;
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reads the blob; an absent key means first run and triggers seeding
    fn load(&self) -> Result<Vec<Ticket>> {
        match self.kv.get(&self.key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => {
                let seeded = vec![self.example_ticket()];
                self.save(&seeded)?;
                info!(key = %self.key, "seeded local store with example ticket");
                Ok(seeded)
            }
        }
    }

    fn save(&self, tickets: &[Ticket]) -> Result<()> {
        let json = serde_json::to_string(tickets)?;
        self.kv.set(&self.key, &json)
    }

    fn example_ticket(&self) -> Ticket {
        let new = NewTicket::new(
            "Example User",
            "example@company.com",
            "Demo issue",
            "This is an example ticket. Create your own ticket to see it here.",
        );
        Ticket::from_new(TicketId::local(Self::SEED_ID), new, self.clock.now())
    }
}

#[async_trait]
impl TicketBackend for LocalStore {
    fn kind(&self) -> Backend {
        Backend::Local
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<TicketId> {
        self.create(new)
    }

    async fn get_all_tickets(&self) -> Result<Vec<Ticket>> {
        self.get_all()
    }

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        self.get(id)
    }

    async fn update_ticket(&self, id: &TicketId, patch: TicketPatch) -> Result<bool> {
        self.update(id, patch)
    }

    async fn add_comment(&self, id: &TicketId, comment: Comment) -> Result<bool> {
        LocalStore::add_comment(self, id, comment)
    }

    async fn update_with_comment(
        &self,
        id: &TicketId,
        patch: TicketPatch,
        comment: Comment,
    ) -> Result<bool> {
        LocalStore::update_with_comment(self, id, patch, comment)
    }
}
