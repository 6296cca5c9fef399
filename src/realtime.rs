//! Realtime ticket snapshots.
//!
//! [`TicketStore::subscribe`] delivers full, ordered snapshots of the ticket
//! collection to a callback. While the remote backend is healthy the
//! snapshots come from its live feed (newest update first). When the feed
//! drops, the subscription degrades the store, waits, re-probes and attaches
//! again. A degraded store has no live feed; the callback then receives one
//! best-effort snapshot of the local collection.

use std::sync::{Arc, RwLock};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    domain::{Ticket, TicketStats},
    error::{Result, SoportechError},
    storage::{BackendHealth, TicketStore},
};

type SnapshotCallback = Arc<dyn Fn(Vec<Ticket>) + Send + Sync>;

/// Handle to a running realtime subscription.
///
/// [`Subscription::unsubscribe`] consumes the handle, so it can only be
/// called once. Dropping the handle detaches the feed as well.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
        debug!("realtime subscription detached");
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl TicketStore {
    /// Registers `on_change` for full-snapshot updates.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(Vec<Ticket>) + Send + Sync + 'static,
    {
        let task = tokio::spawn(run_feed(self.clone(), Arc::new(on_change)));
        Subscription { task: Some(task) }
    }
}

async fn run_feed(store: TicketStore, on_change: SnapshotCallback) {
    let delay = store.resubscribe_delay();
    let mut served_local = false;

    loop {
        if store.ready().await == BackendHealth::Healthy {
            if let Some(remote) = store.remote() {
                match remote.subscribe().await {
                    Ok(mut feed) => {
                        info!("realtime feed attached");
                        served_local = false;
                        while let Some(snapshot) = feed.next().await {
                            debug!(tickets = snapshot.len(), "realtime snapshot received");
                            on_change(snapshot);
                        }
                        store.mark_degraded("realtime feed closed");
                    }
                    Err(e) => {
                        warn!(error = %e, "could not open realtime feed");
                        store.mark_degraded(&e.to_string());
                    }
                }
            }
        }

        if store.health() == BackendHealth::Degraded && !served_local {
            match store.local_snapshot() {
                Ok(snapshot) => {
                    debug!(tickets = snapshot.len(), "serving local snapshot");
                    on_change(snapshot);
                    served_local = true;
                }
                Err(e) => warn!(error = %e, "could not read local snapshot"),
            }
        }

        tokio::time::sleep(delay).await;
        if store.health() == BackendHealth::Degraded {
            store.reprobe().await;
        }
    }
}

/// A consumer view owning the in-memory ticket cache.
///
/// Each snapshot fully replaces the cache. At most one subscription can be
/// attached at a time.
pub struct LiveView {
    store: TicketStore,
    cache: Arc<RwLock<Vec<Ticket>>>,
    revision: watch::Sender<u64>,
    subscription: Option<Subscription>,
}

impl LiveView {
    pub fn new(store: TicketStore) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            cache: Arc::new(RwLock::new(Vec::new())),
            revision,
            subscription: None,
        }
    }

    /// Starts receiving snapshots; `on_render` runs after each cache swap
    pub fn attach<F>(&mut self, on_render: F) -> Result<()>
    where
        F: Fn(&[Ticket]) + Send + Sync + 'static,
    {
        if self.subscription.is_some() {
            return Err(SoportechError::AlreadySubscribed);
        }

        let cache = self.cache.clone();
        let revision = self.revision.clone();
        let subscription = self.store.subscribe(move |snapshot| {
            {
                let mut guard = cache.write().unwrap_or_else(|e| e.into_inner());
                *guard = snapshot;
                on_render(guard.as_slice());
            }
            revision.send_modify(|r| *r += 1);
        });

        self.subscription = Some(subscription);
        Ok(())
    }

    /// Tears the subscription down; a no-op when nothing is attached
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Copy of the current snapshot
    pub fn tickets(&self) -> Vec<Ticket> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stats(&self) -> TicketStats {
        TicketStats::from_tickets(&self.cache.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Number of snapshots applied so far
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Waits until at least `revision` snapshots have been applied
    pub async fn wait_for_revision(&self, revision: u64) -> u64 {
        let mut rx = self.revision.subscribe();
        let reached = rx.wait_for(|r| *r >= revision).await.map(|r| *r);
        reached.unwrap_or_else(|_| self.revision())
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.detach();
    }
}
