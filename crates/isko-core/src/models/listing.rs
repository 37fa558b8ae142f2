//! Listing model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque, stable identifier of a marketplace listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ListingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Seller attribution joined onto a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSummary {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A product listed on the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Unique identifier
    pub id: ListingId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Image URIs in display order
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    /// `None` means the row predates the availability column
    #[serde(default)]
    pub is_available: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_hidden: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_deleted: bool,
    #[serde(default)]
    pub seller_id: Option<String>,
    /// Present only when fetched through the enriched (joined) path
    #[serde(default)]
    pub seller: Option<SellerSummary>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Create a visible listing with the given id and title
    #[must_use]
    pub fn new(id: impl Into<ListingId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            price: 0.0,
            category: None,
            condition: None,
            location: None,
            images: Vec::new(),
            is_available: Some(true),
            is_hidden: false,
            is_deleted: false,
            seller_id: None,
            seller: None,
            created_at: Some(Utc::now()),
            posted_at: None,
        }
    }

    /// Attach a seller summary, marking the listing as enriched
    #[must_use]
    pub fn with_seller(mut self, seller: SellerSummary) -> Self {
        self.seller_id = Some(seller.id.clone());
        self.seller = Some(seller);
        self
    }

    /// Whether anonymous readers may see this listing.
    #[must_use]
    pub const fn is_publicly_visible(&self) -> bool {
        is_visible(Some(self.is_deleted), Some(self.is_hidden), self.is_available)
    }

    /// Whether the seller join came back with the record.
    #[must_use]
    pub const fn is_enriched(&self) -> bool {
        self.seller.is_some()
    }
}

/// Raw row delivered by the realtime change feed. Any column may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingChangePayload {
    #[serde(default)]
    pub id: Option<ListingId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_available: Option<bool>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub seller_id: Option<String>,
}

impl ListingChangePayload {
    /// Payload carrying only an id, as delete events usually do
    #[must_use]
    pub fn id_only(id: impl Into<ListingId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Visibility check on the raw payload. Missing lifecycle flags fall back to
    /// the column defaults (`false`).
    #[must_use]
    pub const fn is_publicly_visible(&self) -> bool {
        is_visible(self.is_deleted, self.is_hidden, self.is_available)
    }
}

impl From<&Listing> for ListingChangePayload {
    fn from(listing: &Listing) -> Self {
        Self {
            id: Some(listing.id.clone()),
            title: Some(listing.title.clone()),
            is_available: listing.is_available,
            is_hidden: Some(listing.is_hidden),
            is_deleted: Some(listing.is_deleted),
            seller_id: listing.seller_id.clone(),
        }
    }
}

/// `is_deleted = false AND is_hidden = false AND is_available IS NOT false`
const fn is_visible(
    is_deleted: Option<bool>,
    is_hidden: Option<bool>,
    is_available: Option<bool>,
) -> bool {
    !matches!(is_deleted, Some(true))
        && !matches!(is_hidden, Some(true))
        && !matches!(is_available, Some(false))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
