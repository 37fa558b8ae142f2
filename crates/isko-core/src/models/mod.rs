//! Data models for IskoMarket

mod listing;
mod visibility;

pub use listing::{Listing, ListingChangePayload, ListingId, SellerSummary};
pub use visibility::{CountScope, VisibilityAdvisory, VisibilityCounts};
