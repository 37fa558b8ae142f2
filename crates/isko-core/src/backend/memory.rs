//! In-memory backend used by tests and the offline demo.
//!
//! Rows live in a single table. The broad view returns every row, including
//! hidden, deleted and sold ones, the way a permissive database view would.
//! The primary path returns only publicly visible rows and additionally skips
//! rows hidden from it to mimic row-level-security or join breakage. Individual operations can be forced to
//! fail, and list fetches can be slowed down with simulated latency.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ChangeFeed, ChangeSender, ListingBackend, ListingChange, ListingFilter};
use crate::error::{Error, Result};
use crate::models::{CountScope, Listing, ListingId};

/// Backend operations that can be counted or forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    FetchListings,
    FetchBroad,
    FetchById,
    Subscribe,
    Count,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<Listing>,
    hidden_from_primary: HashSet<ListingId>,
    failing: HashSet<BackendOp>,
    latency: Duration,
    calls: HashMap<BackendOp, usize>,
    subscribers: Vec<ChangeSender>,
}

impl MemoryState {
    fn visible_rows(&self) -> impl Iterator<Item = &Listing> {
        self.rows.iter().filter(|listing| listing.is_publicly_visible())
    }

    fn primary_rows(&self) -> impl Iterator<Item = &Listing> {
        self.visible_rows()
            .filter(|listing| !self.hidden_from_primary.contains(&listing.id))
    }
}

/// Scriptable [`ListingBackend`] backed by a shared in-process table.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryBackend {
    /// Create a backend whose table holds `rows` (newest first).
    #[must_use]
    pub fn new(rows: Vec<Listing>) -> Self {
        let backend = Self::default();
        backend.lock().rows = rows;
        backend
    }

    /// Replace the whole table.
    pub fn set_rows(&self, rows: Vec<Listing>) {
        self.lock().rows = rows;
    }

    /// Insert a row at the front, or replace the row with the same id in place.
    pub fn upsert_row(&self, listing: Listing) {
        let mut state = self.lock();
        if let Some(existing) = state.rows.iter_mut().find(|row| row.id == listing.id) {
            *existing = listing;
        } else {
            state.rows.insert(0, listing);
        }
    }

    /// Hard-delete a row. Returns whether it existed.
    pub fn remove_row(&self, id: &ListingId) -> bool {
        let mut state = self.lock();
        let before = state.rows.len();
        state.rows.retain(|row| &row.id != id);
        state.rows.len() != before
    }

    /// Make a row invisible to the primary path only.
    pub fn hide_from_primary(&self, id: impl Into<ListingId>) {
        self.lock().hidden_from_primary.insert(id.into());
    }

    /// Undo [`Self::hide_from_primary`].
    pub fn reveal_in_primary(&self, id: &ListingId) {
        self.lock().hidden_from_primary.remove(id);
    }

    pub fn set_failing(&self, op: BackendOp, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// Delay applied before list fetches resolve.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Number of times `op` has been invoked.
    #[must_use]
    pub fn calls(&self, op: BackendOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total invocations across every operation.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Push a change to every live subscriber; returns how many received it.
    pub fn emit(&self, change: &ListingChange) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sender| !sender.is_closed());
        state
            .subscribers
            .iter()
            .filter(|sender| sender.send(change.clone()).is_ok())
            .count()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sender| !sender.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and report the configured latency.
    fn begin(&self, op: BackendOp) -> Duration {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        state.latency
    }

    fn check_failing(&self, op: BackendOp) -> Result<()> {
        if self.lock().failing.contains(&op) {
            Err(Error::Api(format!("simulated failure for {op:?}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ListingBackend for InMemoryBackend {
    async fn fetch_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let latency = self.begin(BackendOp::FetchListings);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_failing(BackendOp::FetchListings)?;

        let state = self.lock();
        let rows = state
            .primary_rows()
            .filter(|listing| filter.matches(listing))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn fetch_listings_broad(&self) -> Result<Vec<Listing>> {
        let latency = self.begin(BackendOp::FetchBroad);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_failing(BackendOp::FetchBroad)?;

        let state = self.lock();
        let rows = state.rows.clone();
        Ok(rows)
    }

    async fn fetch_listing_by_id(&self, id: &ListingId) -> Result<Listing> {
        self.begin(BackendOp::FetchById);
        self.check_failing(BackendOp::FetchById)?;

        let state = self.lock();
        let found = state
            .primary_rows()
            .find(|listing| &listing.id == id)
            .cloned();
        found.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn subscribe_listing_changes(&self) -> Result<ChangeFeed> {
        self.begin(BackendOp::Subscribe);
        if self.lock().failing.contains(&BackendOp::Subscribe) {
            return Err(Error::RealtimeUnavailable(
                "simulated subscription failure".to_string(),
            ));
        }

        let (sender, feed) = ChangeFeed::channel();
        self.lock().subscribers.push(sender);
        Ok(feed)
    }

    async fn count_listings(&self, scope: CountScope) -> Result<u64> {
        self.begin(BackendOp::Count);
        self.check_failing(BackendOp::Count)?;

        let state = self.lock();
        let count = match scope {
            CountScope::Primary => state.primary_rows().count(),
            // Visibility-filtered, like the Supabase broad count
            CountScope::Broad => state.visible_rows().count(),
            CountScope::Raw => state.rows.len(),
        };
        Ok(count as u64)
    }
}
