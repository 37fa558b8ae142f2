//! Lifecycle of the listing sync engine: mount, background loops, unmount.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::backend::{ChangeFeed, ListingBackend, ListingFilter};
use crate::config::SyncSettings;
use crate::models::{Listing, ListingId, VisibilityAdvisory, VisibilityCounts};
use crate::state::SyncSnapshot;

use super::{RealtimeHealth, SyncCore};

/// Keeps a listing cache in sync with the backend for one mounted view.
///
/// Mounting performs an initial refresh, starts the persistent poll, and
/// subscribes to the realtime feed. Until the first realtime event arrives a
/// grace timer runs; if it expires the service polls at the fast interval
/// until realtime proves healthy. Unmounting (or dropping) cancels every
/// background task and discards results that are still in flight.
pub struct ListingSyncService {
    core: Arc<SyncCore>,
    settings: SyncSettings,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ListingSyncService {
    /// Mount against the unfiltered public catalog.
    pub async fn mount(backend: Arc<dyn ListingBackend>, settings: SyncSettings) -> Self {
        Self::mount_with_filter(backend, settings, ListingFilter::default()).await
    }

    pub async fn mount_with_filter(
        backend: Arc<dyn ListingBackend>,
        settings: SyncSettings,
        filter: ListingFilter,
    ) -> Self {
        tracing::info!(
            "Mounting listing sync (poll every {:?}, realtime grace {:?})",
            settings.poll_interval,
            settings.realtime_grace
        );
        let core = Arc::new(SyncCore::new(backend, filter));
        let (shutdown_tx, _) = watch::channel(false);

        core.refresh().await;

        let mut tasks = vec![tokio::spawn(persistent_poll(
            Arc::clone(&core),
            settings.poll_interval,
            shutdown_tx.subscribe(),
        ))];

        match core.backend.subscribe_listing_changes().await {
            Ok(feed) => {
                let grace_deadline = Instant::now() + settings.realtime_grace;
                tasks.push(tokio::spawn(listen(
                    Arc::clone(&core),
                    feed,
                    shutdown_tx.subscribe(),
                )));
                tasks.push(tokio::spawn(watch_grace(
                    Arc::clone(&core),
                    grace_deadline,
                    settings.fast_poll_interval,
                    shutdown_tx.subscribe(),
                )));
            }
            Err(error) => {
                tracing::warn!("Realtime listing feed unavailable; relying on polling: {error}");
                core.transition_health(RealtimeHealth::on_feed_lost);
            }
        }

        Self {
            core,
            settings,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Current published state.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.core.snapshot_tx.borrow().clone()
    }

    /// Receiver notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.core.snapshot_tx.subscribe()
    }

    pub fn visibility_advisory(&self) -> VisibilityAdvisory {
        self.core.snapshot_tx.borrow().advisory.clone()
    }

    pub fn realtime_health(&self) -> RealtimeHealth {
        self.core.health()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<RealtimeHealth> {
        self.core.health_tx.subscribe()
    }

    pub const fn settings(&self) -> SyncSettings {
        self.settings
    }

    pub fn is_mounted(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Run a reconciliation cycle now. Returns whether the snapshot changed.
    pub async fn manual_refresh(&self) -> bool {
        self.core.refresh().await
    }

    /// Primary, broad, and raw counts. Never touches the cache.
    pub async fn visibility_counts(&self) -> VisibilityCounts {
        self.core.visibility_counts().await
    }

    /// Remove a listing locally before the backend confirms it.
    ///
    /// The next reconciliation restores it if the backend still serves it.
    pub async fn apply_optimistic_removal(&self, id: &ListingId) -> bool {
        self.core.apply(|state| state.cache.remove(id)).await
    }

    /// Replace (or prepend) a listing locally before the backend confirms it.
    pub async fn apply_optimistic_update(&self, listing: Listing) -> bool {
        self.core
            .apply(|state| state.cache.replace_entry(listing))
            .await
    }

    /// Stop every background task. Results still in flight are discarded.
    pub async fn unmount(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        for task in self.take_tasks() {
            task.abort();
        }
        self.core.unmount().await;
        tracing::info!("Listing sync unmounted");
    }

    fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for ListingSyncService {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for task in self.take_tasks() {
            task.abort();
        }
        if let Ok(mut state) = self.core.state.try_lock() {
            state.mounted = false;
        } else {
            // Every task holding the core is already aborted
            tracing::debug!("Listing sync state busy during drop; left mounted flag set");
        }
    }
}

/// Unconditional safety-net refresh, independent of realtime health.
async fn persistent_poll(
    core: Arc<SyncCore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                core.refresh().await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn listen(core: Arc<SyncCore>, mut feed: ChangeFeed, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            change = feed.recv() => match change {
                Some(change) => core.handle_change(change).await,
                None => {
                    tracing::warn!("Realtime listing feed closed; relying on polling");
                    core.transition_health(RealtimeHealth::on_feed_lost);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

/// Degrade realtime when no event arrives before `deadline`, then poll fast
/// until an event shows up.
async fn watch_grace(
    core: Arc<SyncCore>,
    deadline: Instant,
    fast_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        () = sleep_until(deadline) => {}
        _ = shutdown.changed() => return,
    }

    if !core.transition_health(RealtimeHealth::on_grace_elapsed) {
        return;
    }
    tracing::warn!("No realtime listing events yet; polling every {fast_period:?}");

    let mut health = core.health_tx.subscribe();
    let mut ticker = interval(fast_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if core.health().is_healthy() {
                    break;
                }
                core.refresh().await;
            }
            changed = health.changed() => {
                if changed.is_err() || health.borrow_and_update().is_healthy() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Fast listing poll stopped");
}
