//! State published by the sync engine to UI components.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{Listing, VisibilityAdvisory};

pub use crate::sync::health::RealtimeHealth;

/// Read-only view of the listing cache handed to UI components.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncSnapshot {
    /// Listings, newest first, unique by id
    pub listings: Arc<[Listing]>,
    /// Bumped on every applied cache mutation
    pub revision: u64,
    /// Last time a list refresh changed the cache
    pub last_synced_at: Option<DateTime<Utc>>,
    pub advisory: VisibilityAdvisory,
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self {
            listings: Arc::from(Vec::new()),
            revision: 0,
            last_synced_at: None,
            advisory: VisibilityAdvisory::default(),
        }
    }
}

impl SyncSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.listings.iter().any(|listing| listing.id.as_str() == id)
    }

    /// Listing ids in display order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.listings
            .iter()
            .map(|listing| listing.id.as_str())
            .collect()
    }
}
