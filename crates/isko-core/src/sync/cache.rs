//! Client-side listing cache.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{Listing, ListingId};

/// Ordered (newest first), id-unique set of listings.
///
/// Listings are held as an immutable shared slice: a mutation swaps in a new
/// slice and bumps `revision`, a no-op leaves both untouched so observers can
/// compare by pointer.
#[derive(Debug, Clone)]
pub struct ListingCache {
    listings: Arc<[Listing]>,
    revision: u64,
    last_synced_at: Option<DateTime<Utc>>,
}

impl Default for ListingCache {
    fn default() -> Self {
        Self {
            listings: Arc::from(Vec::new()),
            revision: 0,
            last_synced_at: None,
        }
    }
}

impl ListingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn listings(&self) -> &Arc<[Listing]> {
        &self.listings
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub const fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &ListingId) -> bool {
        self.listings.iter().any(|listing| &listing.id == id)
    }

    /// Replace the cache with a freshly fetched list when the id sets differ.
    ///
    /// Duplicate ids in `fetched` keep their first occurrence. Returns whether
    /// the cache was replaced; identical id sets (in any order) are a no-op.
    pub fn merge_list(&mut self, fetched: Vec<Listing>) -> bool {
        let fetched = dedupe_by_id(fetched);

        let same_membership = fetched.len() == self.listings.len() && {
            let current: HashSet<&ListingId> =
                self.listings.iter().map(|listing| &listing.id).collect();
            fetched.iter().all(|listing| current.contains(&listing.id))
        };
        if same_membership {
            return false;
        }

        self.commit(fetched);
        self.last_synced_at = Some(Utc::now());
        true
    }

    /// Prepend `listing` unless its id is already cached.
    pub fn insert_if_absent(&mut self, listing: Listing) -> bool {
        if self.contains(&listing.id) {
            return false;
        }
        let mut next = Vec::with_capacity(self.listings.len() + 1);
        next.push(listing);
        next.extend(self.listings.iter().cloned());
        self.commit(next);
        true
    }

    /// Replace the entry with the same id wholesale.
    ///
    /// An unknown id is prepended; a listing that is no longer publicly
    /// visible is removed instead.
    pub fn replace_entry(&mut self, listing: Listing) -> bool {
        if !listing.is_publicly_visible() {
            return self.remove(&listing.id);
        }

        let Some(position) = self
            .listings
            .iter()
            .position(|cached| cached.id == listing.id)
        else {
            return self.insert_if_absent(listing);
        };
        if self.listings[position] == listing {
            return false;
        }

        let mut next = self.listings.to_vec();
        next[position] = listing;
        self.commit(next);
        true
    }

    pub fn remove(&mut self, id: &ListingId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let next = self
            .listings
            .iter()
            .filter(|listing| &listing.id != id)
            .cloned()
            .collect();
        self.commit(next);
        true
    }

    fn commit(&mut self, listings: Vec<Listing>) {
        self.listings = Arc::from(listings);
        self.revision += 1;
    }
}

fn dedupe_by_id(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::with_capacity(listings.len());
    listings
        .into_iter()
        .filter(|listing| seen.insert(listing.id.clone()))
        .collect()
}
