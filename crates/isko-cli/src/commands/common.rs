use std::sync::Arc;

use chrono::{DateTime, Utc};
use isko_core::backend::{ListingBackend, ListingFilter, SupabaseListingClient};
use isko_core::config::{BackendConfig, SyncSettings};
use isko_core::models::{VisibilityAdvisory, VisibilityCounts};
use isko_core::util::{format_relative_time, normalize_text_option};
use isko_core::{Listing, RealtimeHealth, SyncSnapshot};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ListingListItem {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub seller: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub relative_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingReport {
    pub listings: Vec<ListingListItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

pub fn open_backend() -> Result<Arc<dyn ListingBackend>, CliError> {
    let config = BackendConfig::from_env()?;
    tracing::debug!("Using listing backend {config:?}");
    Ok(Arc::new(SupabaseListingClient::new(config)?))
}

pub fn load_settings() -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::from_env()?)
}

pub fn listing_filter(
    category: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
) -> Result<ListingFilter, CliError> {
    if limit == Some(0) {
        return Err(CliError::InvalidLimit);
    }
    Ok(ListingFilter {
        category: normalize_text_option(category),
        search: normalize_text_option(search),
        limit,
    })
}

pub fn format_listing_lines(listings: &[Listing], now: DateTime<Utc>) -> Vec<String> {
    listings
        .iter()
        .map(|listing| {
            let short_id = listing.id.as_str().chars().take(8).collect::<String>();
            let title = listing_preview(&listing.title, 36);
            let price = format_price(listing.price);
            let seller = seller_label(listing);
            let relative_time = listing
                .created_at
                .map(|created_at| format_relative_time(created_at, now))
                .unwrap_or_default();

            format!("{short_id:<8}  {title:<36}  {price:>12}  {seller:<16}  {relative_time}")
        })
        .collect()
}

pub fn listing_to_list_item(listing: &Listing, now: DateTime<Utc>) -> ListingListItem {
    ListingListItem {
        id: listing.id.to_string(),
        title: listing.title.clone(),
        price: listing.price,
        category: listing.category.clone(),
        condition: listing.condition.clone(),
        seller: listing
            .seller
            .as_ref()
            .and_then(|seller| seller.username.clone()),
        created_at: listing.created_at,
        relative_time: listing
            .created_at
            .map(|created_at| format_relative_time(created_at, now)),
    }
}

pub fn listing_preview(title: &str, max_chars: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated = collapsed
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    format!("{truncated}...")
}

pub fn seller_label(listing: &Listing) -> String {
    listing
        .seller
        .as_ref()
        .and_then(|seller| seller.username.as_deref())
        .map_or_else(|| "unknown seller".to_string(), |name| format!("@{name}"))
}

/// Peso amount with thousands separators, e.g. `₱1,250.00`.
pub fn format_price(price: f64) -> String {
    let cents = (price * 100.0).round();
    let sign = if cents < 0.0 { "-" } else { "" };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cents = cents.abs() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}₱{grouped}.{:02}", cents % 100)
}

pub fn advisory_banner(advisory: &VisibilityAdvisory) -> Option<String> {
    if !advisory.active {
        return None;
    }
    let note = advisory
        .note
        .as_deref()
        .unwrap_or("Some listings are only visible through the fallback view.");
    Some(format!("! {note}"))
}

pub fn empty_state_line(filter: &ListingFilter) -> &'static str {
    if filter.category.is_some() || filter.search.is_some() {
        "No listings match your filters."
    } else {
        "No listings yet."
    }
}

pub fn format_counts_lines(counts: &VisibilityCounts) -> Vec<String> {
    let render = |count: Option<u64>| {
        count.map_or_else(|| "unavailable".to_string(), |n| n.to_string())
    };
    let mut lines = vec![
        format!("primary  {}", render(counts.primary)),
        format!("broad    {}", render(counts.broad)),
        format!("raw      {}", render(counts.raw)),
    ];
    if counts.has_discrepancy() {
        lines.push("Some listings are not reachable through the primary query.".to_string());
    }
    lines
}

pub fn snapshot_header(snapshot: &SyncSnapshot, now: DateTime<Utc>) -> String {
    let synced = snapshot.last_synced_at.map_or_else(
        || "not synced yet".to_string(),
        |synced_at| format!("updated {}", format_relative_time(synced_at, now)),
    );
    format!("-- {} listing(s), {synced} --", snapshot.len())
}

pub fn health_line(health: RealtimeHealth) -> String {
    match health {
        RealtimeHealth::Subscribing => "realtime: connecting".to_string(),
        RealtimeHealth::Healthy => "realtime: live".to_string(),
        RealtimeHealth::Degraded => "realtime: unavailable, polling for changes".to_string(),
    }
}

pub fn print_listings(
    listings: &[Listing],
    advisory: &VisibilityAdvisory,
    filter: &ListingFilter,
) {
    if let Some(banner) = advisory_banner(advisory) {
        println!("{banner}");
    }
    if listings.is_empty() {
        println!("{}", empty_state_line(filter));
        return;
    }
    for line in format_listing_lines(listings, Utc::now()) {
        println!("{line}");
    }
}
