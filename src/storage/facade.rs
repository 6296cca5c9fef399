//! Single persistence entry point hiding which backend serves a call.
//!
//! The store probes the remote collection once at startup and publishes the
//! result on a watch channel (`Probing` → `Healthy` | `Degraded`). Every
//! operation then prefers the remote backend while healthy and retries
//! against the local store when the remote call fails with a recoverable
//! error. A degraded store re-probes on its own once the reprobe interval has
//! passed, or on demand through [`TicketStore::reprobe`].

use std::{fmt, sync::Arc, sync::Mutex};
use tokio::{
    sync::watch,
    time::{timeout, Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    config::{RemoteConfig, StoreConfig},
    domain::{
        sort_tickets, Backend, Comment, NewTicket, SortField, SortOrder, Ticket, TicketId,
        TicketPatch,
    },
    error::Result,
    storage::{
        Clock, DocumentCollection, FileKeyValueStore, KeyValueStore, LocalStore,
        MemoryKeyValueStore, RemoteStore, TicketBackend,
    },
};

/// Health of the remote backend as seen by the façade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    Probing,
    Healthy,
    Degraded,
}

impl fmt::Display for BackendHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing => write!(f, "probing"),
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// What happened on the remote side when a call was served locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The store was degraded, so the remote backend was not tried
    Skipped,
    /// The remote call failed and had no effect
    Failed,
    /// The remote call failed in a way that may still have applied it
    Indeterminate,
}

/// Informational notice attached to results that the local store served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackNotice {
    pub cause: String,
    pub remote: RemoteOutcome,
}

impl FallbackNotice {
    fn skipped() -> Self {
        Self {
            cause: "remote backend unavailable".to_string(),
            remote: RemoteOutcome::Skipped,
        }
    }

    /// True when the same ticket may also exist in the remote backend
    pub fn possible_duplicate(&self) -> bool {
        self.remote == RemoteOutcome::Indeterminate
    }

    /// Short user-facing message
    pub fn message(&self) -> &'static str {
        if self.possible_duplicate() {
            "Saved locally. The cloud copy may also have been created."
        } else {
            "Saved locally."
        }
    }
}

/// A result together with the backend that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub value: T,
    pub backend: Backend,
    pub notice: Option<FallbackNotice>,
}

impl<T> Stored<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stored<U> {
        Stored {
            value: f(self.value),
            backend: self.backend,
            notice: self.notice,
        }
    }
}

/// Tags a value with the backend that produced it
fn served<T>(backend: &dyn TicketBackend, value: T, notice: Option<FallbackNotice>) -> Stored<T> {
    Stored {
        value,
        backend: backend.kind(),
        notice,
    }
}

/// Ticket persistence façade; cheap to clone, clones share state
#[derive(Clone)]
pub struct TicketStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: RemoteConfig,
    remote: Option<RemoteStore>,
    local: LocalStore,
    health: watch::Sender<BackendHealth>,
    last_probe: Mutex<Option<Instant>>,
}

impl TicketStore {
    /// Builds a store in the `Probing` state; call [`TicketStore::initialize`]
    /// (or use [`TicketStore::connect`]) to resolve it
    pub fn new(config: &StoreConfig, collection: Option<Arc<dyn DocumentCollection>>) -> Self {
        let kv: Arc<dyn KeyValueStore> = match &config.local.dir {
            Some(dir) => Arc::new(FileKeyValueStore::new(dir)),
            None => Arc::new(MemoryKeyValueStore::new()),
        };
        Self::with_key_value_store(config, collection, kv)
    }

    pub fn with_key_value_store(
        config: &StoreConfig,
        collection: Option<Arc<dyn DocumentCollection>>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let clock = Arc::new(Clock::new());
        let remote = collection
            .filter(|_| config.remote.enabled)
            .map(|c| {
                if c.name() != config.remote.collection {
                    warn!(
                        expected = %config.remote.collection,
                        actual = %c.name(),
                        "remote collection name differs from configuration"
                    );
                }
                RemoteStore::new(c, clock.clone())
            });
        let local = LocalStore::new(kv, config.local.key.clone(), clock);
        let (health, _) = watch::channel(BackendHealth::Probing);

        Self {
            inner: Arc::new(Inner {
                config: config.remote.clone(),
                remote,
                local,
                health,
                last_probe: Mutex::new(None),
            }),
        }
    }

    /// Builds and initializes a store in one step
    pub async fn connect(
        config: &StoreConfig,
        collection: Option<Arc<dyn DocumentCollection>>,
    ) -> Self {
        let store = Self::new(config, collection);
        store.initialize().await;
        store
    }

    /// Runs the startup handshake, bounded by the probe timeout
    pub async fn initialize(&self) -> BackendHealth {
        self.probe().await
    }

    /// Current health without waiting
    pub fn health(&self) -> BackendHealth {
        *self.inner.health.borrow()
    }

    /// Receiver observing every health transition
    pub fn health_changes(&self) -> watch::Receiver<BackendHealth> {
        self.inner.health.subscribe()
    }

    /// Waits until the startup probe has resolved.
    ///
    /// If nothing resolves it within the probe timeout the store marks
    /// itself degraded.
    pub async fn ready(&self) -> BackendHealth {
        let mut rx = self.inner.health.subscribe();
        let resolved = timeout(
            self.inner.config.probe_timeout(),
            rx.wait_for(|h| *h != BackendHealth::Probing),
        )
        .await;

        match resolved {
            Ok(Ok(health)) => *health,
            _ => {
                self.mark_degraded("startup probe never resolved");
                BackendHealth::Degraded
            }
        }
    }

    /// Probes the remote backend now, regardless of the reprobe interval
    pub async fn reprobe(&self) -> BackendHealth {
        self.probe().await
    }

    pub fn resubscribe_delay(&self) -> Duration {
        self.inner.config.resubscribe_delay()
    }

    pub async fn create_ticket(&self, new: NewTicket) -> Result<Stored<TicketId>> {
        new.validate()?;

        let notice = match self.active_remote().await {
            Some(remote) => {
                let result = remote.create_ticket(new.clone()).await;
                // A failed create may have reached the backend before failing
                match self.settle("create_ticket", result, RemoteOutcome::Indeterminate)? {
                    Ok(id) => return Ok(served(remote, id, None)),
                    Err(notice) => notice,
                }
            }
            None => FallbackNotice::skipped(),
        };

        let local = self.local();
        let id = local.create_ticket(new).await?;
        if notice.possible_duplicate() {
            warn!(ticket_id = %id, "ticket saved locally; a remote copy may exist");
        } else {
            info!(ticket_id = %id, "ticket saved locally");
        }
        Ok(served(local, id, Some(notice)))
    }

    /// All tickets from the active backend; results are never merged.
    ///
    /// Remote results are ordered by creation time, newest first. Local
    /// results keep insertion order.
    pub async fn get_all_tickets(&self) -> Result<Stored<Vec<Ticket>>> {
        let notice = match self.active_remote().await {
            Some(remote) => {
                let result = remote.get_all_tickets().await;
                match self.settle("get_all_tickets", result, RemoteOutcome::Failed)? {
                    Ok(tickets) => return Ok(served(remote, tickets, None)),
                    Err(notice) => notice,
                }
            }
            None => FallbackNotice::skipped(),
        };

        let local = self.local();
        Ok(served(local, local.get_all_tickets().await?, Some(notice)))
    }

    pub async fn get_ticket(&self, id: &TicketId) -> Result<Stored<Option<Ticket>>> {
        let notice = match self.remote_for(id).await {
            Ok(remote) => {
                let result = remote.get_ticket(id).await;
                match self.settle("get_ticket", result, RemoteOutcome::Failed)? {
                    Ok(ticket) => return Ok(served(remote, ticket, None)),
                    Err(notice) => Some(notice),
                }
            }
            Err(notice) => notice,
        };

        let local = self.local();
        Ok(served(local, local.get_ticket(id).await?, notice))
    }

    /// Merges `patch` into a ticket; `value` is false when the id is unknown
    pub async fn update_ticket(&self, id: &TicketId, patch: TicketPatch) -> Result<Stored<bool>> {
        let notice = match self.remote_for(id).await {
            Ok(remote) => {
                let result = remote.update_ticket(id, patch.clone()).await;
                match self.settle("update_ticket", result, RemoteOutcome::Failed)? {
                    Ok(updated) => return Ok(served(remote, updated, None)),
                    Err(notice) => Some(notice),
                }
            }
            Err(notice) => notice,
        };

        let local = self.local();
        Ok(served(local, local.update_ticket(id, patch).await?, notice))
    }

    /// Appends a comment; `value` is false when the id is unknown
    pub async fn add_comment(&self, id: &TicketId, comment: Comment) -> Result<Stored<bool>> {
        let notice = match self.remote_for(id).await {
            Ok(remote) => {
                let result = remote.add_comment(id, comment.clone()).await;
                match self.settle("add_comment", result, RemoteOutcome::Failed)? {
                    Ok(added) => return Ok(served(remote, added, None)),
                    Err(notice) => Some(notice),
                }
            }
            Err(notice) => notice,
        };

        let local = self.local();
        Ok(served(local, local.add_comment(id, comment).await?, notice))
    }

    /// Merges `patch` and appends `comment` as one write on whichever
    /// backend serves the call; `value` is false when the id is unknown
    pub async fn update_ticket_with_comment(
        &self,
        id: &TicketId,
        patch: TicketPatch,
        comment: Comment,
    ) -> Result<Stored<bool>> {
        let notice = match self.remote_for(id).await {
            Ok(remote) => {
                let result = remote
                    .update_with_comment(id, patch.clone(), comment.clone())
                    .await;
                match self.settle("update_ticket_with_comment", result, RemoteOutcome::Failed)? {
                    Ok(updated) => return Ok(served(remote, updated, None)),
                    Err(notice) => Some(notice),
                }
            }
            Err(notice) => notice,
        };

        let local = self.local();
        let updated = local.update_with_comment(id, patch, comment).await?;
        Ok(served(local, updated, notice))
    }

    /// Empties the local collection; the remote collection is left alone
    pub fn clear_all(&self) -> Result<()> {
        self.inner.local.clear_all()
    }

    pub(crate) fn remote(&self) -> Option<&RemoteStore> {
        self.inner.remote.as_ref()
    }

    /// Local tickets ordered like a realtime snapshot (newest update first)
    pub(crate) fn local_snapshot(&self) -> Result<Vec<Ticket>> {
        let mut tickets = self.inner.local.get_all()?;
        sort_tickets(&mut tickets, SortField::Updated, SortOrder::Descending);
        Ok(tickets)
    }

    pub(crate) fn mark_degraded(&self, reason: &str) {
        self.set_health(BackendHealth::Degraded, reason);
    }

    /// Maps a remote result onto the fallback policy.
    ///
    /// Recoverable failures degrade the store and yield the notice for a
    /// local retry of this call only. Anything else is returned to the
    /// caller unchanged.
    fn settle<T>(
        &self,
        op: &'static str,
        result: Result<T>,
        outcome: RemoteOutcome,
    ) -> Result<std::result::Result<T, FallbackNotice>> {
        match result {
            Ok(value) => Ok(Ok(value)),
            Err(e) if e.is_recoverable() => {
                warn!(op, error = %e, "remote call failed, falling back to local store");
                self.mark_degraded(&e.to_string());
                Ok(Err(FallbackNotice {
                    cause: e.to_string(),
                    remote: outcome,
                }))
            }
            Err(e) => Err(e),
        }
    }

    fn local(&self) -> &dyn TicketBackend {
        &self.inner.local
    }

    /// The remote store when it should serve calls for `id`, otherwise the
    /// notice for the local result.
    ///
    /// Local-origin ids are always served locally; the local store is
    /// authoritative for them.
    async fn remote_for(
        &self,
        id: &TicketId,
    ) -> std::result::Result<&RemoteStore, Option<FallbackNotice>> {
        match id.origin() {
            Backend::Local => Err(None),
            Backend::Remote => self
                .active_remote()
                .await
                .ok_or_else(|| Some(FallbackNotice::skipped())),
        }
    }

    /// The remote store if it is healthy, re-probing a degraded one when due
    async fn active_remote(&self) -> Option<&RemoteStore> {
        let remote = self.inner.remote.as_ref()?;
        let health = match self.ready().await {
            BackendHealth::Degraded if self.reprobe_due() => self.probe().await,
            health => health,
        };
        (health == BackendHealth::Healthy).then_some(remote)
    }

    fn reprobe_due(&self) -> bool {
        let last = self.inner.last_probe.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) => at.elapsed() >= self.inner.config.reprobe_interval(),
            None => true,
        }
    }

    async fn probe(&self) -> BackendHealth {
        let Some(remote) = self.inner.remote.as_ref() else {
            self.set_health(BackendHealth::Degraded, "no remote backend configured");
            return BackendHealth::Degraded;
        };

        *self.inner.last_probe.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        let limit = self.inner.config.probe_timeout();
        debug!(collection = %remote.collection_name(), ?limit, "probing remote backend");

        match timeout(limit, remote.probe()).await {
            Ok(Ok(())) => {
                self.set_health(BackendHealth::Healthy, "probe succeeded");
                BackendHealth::Healthy
            }
            Ok(Err(e)) => {
                self.set_health(BackendHealth::Degraded, &e.to_string());
                BackendHealth::Degraded
            }
            Err(_) => {
                self.set_health(BackendHealth::Degraded, "probe timed out");
                BackendHealth::Degraded
            }
        }
    }

    fn set_health(&self, next: BackendHealth, reason: &str) {
        self.inner.health.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            match next {
                BackendHealth::Degraded => {
                    warn!(from = %current, to = %next, reason, "backend health changed")
                }
                _ => info!(from = %current, to = %next, reason, "backend health changed"),
            }
            *current = next;
            true
        });
    }
}
