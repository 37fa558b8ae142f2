//! Backend data service seam.
//!
//! The sync engine only talks to the marketplace backend through
//! [`ListingBackend`]. [`supabase::SupabaseListingClient`] is the production
//! implementation; [`memory::InMemoryBackend`] is a scriptable stand-in.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::models::{CountScope, Listing, ListingChangePayload, ListingId};

pub use memory::InMemoryBackend;
pub use supabase::SupabaseListingClient;

/// Optional narrowing of the public listing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub category: Option<String>,
    /// Case-insensitive substring match on the title
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl ListingFilter {
    #[must_use]
    pub fn matches(&self, listing: &Listing) -> bool {
        let category_ok = self.category.as_deref().map_or(true, |category| {
            listing
                .category
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(category))
        });
        let search_ok = self.search.as_deref().map_or(true, |needle| {
            listing
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        category_ok && search_ok
    }
}

/// One notification from the realtime change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingChange {
    Inserted(ListingChangePayload),
    Updated(ListingChangePayload),
    /// Delete events may carry little more than the primary key, or nothing
    Deleted(ListingChangePayload),
}

impl ListingChange {
    #[must_use]
    pub const fn payload(&self) -> &ListingChangePayload {
        match self {
            Self::Inserted(payload) | Self::Updated(payload) | Self::Deleted(payload) => payload,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "insert",
            Self::Updated(_) => "update",
            Self::Deleted(_) => "delete",
        }
    }
}

/// Receiving end of a change-feed subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ChangeFeed {
    receiver: mpsc::UnboundedReceiver<ListingChange>,
}

impl ChangeFeed {
    /// Create a connected sender/feed pair for transports that push events.
    #[must_use]
    pub fn channel() -> (ChangeSender, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChangeSender { sender }, Self { receiver })
    }

    /// Next change, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ListingChange> {
        self.receiver.recv().await
    }
}

/// Producer half of a [`ChangeFeed`].
#[derive(Debug, Clone)]
pub struct ChangeSender {
    sender: mpsc::UnboundedSender<ListingChange>,
}

impl ChangeSender {
    pub fn send(&self, change: ListingChange) -> Result<()> {
        self.sender.send(change).map_err(|_| Error::FeedClosed)
    }

    /// Whether the subscriber has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Abstract operations the sync engine consumes from the backend.
#[async_trait]
pub trait ListingBackend: Send + Sync {
    /// Public, access-controlled listing query. Newest first.
    async fn fetch_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;

    /// Alternate read path that may surface rows the public path hides.
    async fn fetch_listings_broad(&self) -> Result<Vec<Listing>>;

    /// Single enriched lookup; `Error::NotFound` when absent or restricted.
    async fn fetch_listing_by_id(&self, id: &ListingId) -> Result<Listing>;

    /// Subscribe to insert/update/delete notifications for the catalog.
    async fn subscribe_listing_changes(&self) -> Result<ChangeFeed>;

    /// Row count through the given access path.
    async fn count_listings(&self, scope: CountScope) -> Result<u64>;
}
