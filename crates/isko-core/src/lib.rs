//! isko-core - Core library for IskoMarket
//!
//! This crate contains the listing models, the backend data service seam with
//! its Supabase client, and the client-side listing sync engine used by the
//! IskoMarket front ends.

pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Listing, ListingId};
pub use state::{RealtimeHealth, SyncSnapshot};
pub use sync::ListingSyncService;
