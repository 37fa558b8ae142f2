//! Client-side listing synchronization.
//!
//! Three data sources feed one cache:
//!
//! - the realtime change feed ([`realtime`]),
//! - the persistent and fast polling loops ([`service`]),
//! - explicit refreshes and optimistic mutations from the UI.
//!
//! Every result passes through [`SyncCore::apply`], which holds the state lock,
//! drops results that arrive after unmount, and publishes a new
//! [`SyncSnapshot`] only when something changed.

pub mod cache;
pub mod health;
mod realtime;
mod reconcile;
mod service;

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::backend::{ListingBackend, ListingFilter};
use crate::models::{ListingId, VisibilityAdvisory};
use crate::state::SyncSnapshot;

pub use cache::ListingCache;
pub use health::RealtimeHealth;
pub use reconcile::count_visibility;
pub use service::ListingSyncService;

/// Mutable state owned by the coordinating service.
#[derive(Debug)]
struct SyncState {
    cache: ListingCache,
    advisory: VisibilityAdvisory,
    mounted: bool,
}

impl SyncState {
    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            listings: Arc::clone(self.cache.listings()),
            revision: self.cache.revision(),
            last_synced_at: self.cache.last_synced_at(),
            advisory: self.advisory.clone(),
        }
    }
}

/// Shared core behind [`ListingSyncService`] and its background tasks.
struct SyncCore {
    backend: Arc<dyn ListingBackend>,
    filter: ListingFilter,
    state: Mutex<SyncState>,
    snapshot_tx: watch::Sender<SyncSnapshot>,
    health_tx: watch::Sender<RealtimeHealth>,
}

impl SyncCore {
    fn new(backend: Arc<dyn ListingBackend>, filter: ListingFilter) -> Self {
        let (snapshot_tx, _) = watch::channel(SyncSnapshot::default());
        let (health_tx, _) = watch::channel(RealtimeHealth::Subscribing);
        Self {
            backend,
            filter,
            state: Mutex::new(SyncState {
                cache: ListingCache::new(),
                advisory: VisibilityAdvisory::default(),
                mounted: true,
            }),
            snapshot_tx,
            health_tx,
        }
    }

    /// Run `mutate` against the state if still mounted; publish when it
    /// reports a change.
    async fn apply<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&mut SyncState) -> bool,
    {
        let mut state = self.state.lock().await;
        if !state.mounted {
            tracing::debug!("Discarding listing update that resolved after unmount");
            return false;
        }
        let changed = mutate(&mut state);
        if changed {
            self.snapshot_tx.send_replace(state.snapshot());
        }
        changed
    }

    async fn is_mounted(&self) -> bool {
        self.state.lock().await.mounted
    }

    async fn is_cached(&self, id: &ListingId) -> bool {
        self.state.lock().await.cache.contains(id)
    }

    async fn unmount(&self) {
        self.state.lock().await.mounted = false;
    }

    fn health(&self) -> RealtimeHealth {
        *self.health_tx.borrow()
    }

    /// Apply a health transition; returns whether the state changed.
    fn transition_health(&self, next: impl FnOnce(RealtimeHealth) -> RealtimeHealth) -> bool {
        self.health_tx.send_if_modified(|health| {
            let updated = next(*health);
            if updated == *health {
                false
            } else {
                tracing::info!("Realtime health {} -> {}", health, updated);
                *health = updated;
                true
            }
        })
    }
}
