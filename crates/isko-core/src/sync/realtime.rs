//! Turning realtime change events into minimal cache updates.

use crate::backend::ListingChange;
use crate::error::Error;
use crate::models::{Listing, ListingChangePayload, ListingId};

use super::SyncCore;

impl SyncCore {
    pub(super) async fn handle_change(&self, change: ListingChange) {
        self.transition_health(super::RealtimeHealth::on_event);
        tracing::debug!(
            "Realtime {} event for listing {:?}",
            change.kind(),
            change.payload().id
        );

        match change {
            ListingChange::Inserted(payload) => self.handle_insert(payload).await,
            ListingChange::Updated(payload) => self.handle_update(payload).await,
            ListingChange::Deleted(payload) => self.handle_delete(payload).await,
        }
    }

    async fn handle_insert(&self, payload: ListingChangePayload) {
        if !payload.is_publicly_visible() {
            tracing::debug!("Ignoring insert for listing that is not publicly visible");
            return;
        }
        let Some(id) = payload.id else {
            self.refresh().await;
            return;
        };
        if self.is_cached(&id).await {
            tracing::debug!("Listing {id} already cached; ignoring duplicate insert");
            return;
        }

        let Some(listing) = self.fetch_enriched(&id).await else {
            self.refresh().await;
            return;
        };
        if !self.filter.matches(&listing) {
            tracing::debug!("Listing {id} is outside the active filter; ignoring insert");
            return;
        }
        if self.at_capacity().await {
            // The limit decides which rows stay; let the server pick
            self.refresh().await;
            return;
        }
        self.apply(|state| state.cache.insert_if_absent(listing))
            .await;
    }

    async fn handle_update(&self, payload: ListingChangePayload) {
        let Some(id) = payload.id else {
            self.refresh().await;
            return;
        };

        let Some(listing) = self.fetch_enriched(&id).await else {
            self.refresh().await;
            return;
        };
        if !self.filter.matches(&listing) {
            tracing::debug!("Listing {id} no longer matches the active filter; dropping it");
            self.apply(|state| state.cache.remove(&id)).await;
            return;
        }
        if !self.is_cached(&id).await && self.at_capacity().await {
            self.refresh().await;
            return;
        }
        self.apply(|state| state.cache.replace_entry(listing)).await;
    }

    /// Drop the id right away, then let a full refresh confirm or correct it.
    async fn handle_delete(&self, payload: ListingChangePayload) {
        if let Some(id) = payload.id {
            self.apply(|state| state.cache.remove(&id)).await;
        }
        self.refresh().await;
    }

    /// Single-record lookup that only succeeds with seller attribution attached.
    async fn fetch_enriched(&self, id: &ListingId) -> Option<Listing> {
        let result = match self.backend.fetch_listing_by_id(id).await {
            Ok(listing) if listing.is_enriched() => Ok(listing),
            Ok(_) => Err(Error::IncompleteRecord(format!(
                "listing {id} returned without seller"
            ))),
            Err(error) => Err(error),
        };

        match result {
            Ok(listing) => Some(listing),
            Err(error) => {
                tracing::warn!("Falling back to full listing refresh: {error}");
                None
            }
        }
    }

    /// Whether a new entry would push the cache past the query limit.
    async fn at_capacity(&self) -> bool {
        let Some(limit) = self.filter.limit else {
            return false;
        };
        let cached = self.state.lock().await.cache.len();
        cached >= limit
    }
}
