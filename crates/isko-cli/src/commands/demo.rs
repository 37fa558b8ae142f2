use std::sync::Arc;
use std::time::Duration;

use isko_core::backend::{InMemoryBackend, ListingChange, ListingFilter};
use isko_core::config::SyncSettings;
use isko_core::models::{ListingChangePayload, SellerSummary};
use isko_core::{Listing, ListingId, ListingSyncService};

use crate::commands::common::{format_counts_lines, health_line, print_listings};

pub fn demo_catalog() -> Vec<Listing> {
    vec![
        demo_listing("l-104", "Mini fridge, good as new", 3_500.0, "Appliances", "jessa"),
        demo_listing("l-103", "Org chem lab gown (M)", 250.0, "Clothing", "paolo"),
        demo_listing("l-102", "Calculus: Early Transcendentals", 1_200.0, "Books", "bea"),
        demo_listing("l-101", "Study lamp with USB port", 450.0, "Electronics", "marco"),
    ]
}

pub const fn demo_settings() -> SyncSettings {
    SyncSettings {
        poll_interval: Duration::from_secs(3),
        fast_poll_interval: Duration::from_secs(1),
        realtime_grace: Duration::from_secs(2),
    }
}

fn demo_listing(id: &str, title: &str, price: f64, category: &str, seller: &str) -> Listing {
    let mut listing = Listing::new(id, title).with_seller(SellerSummary {
        id: format!("u-{seller}"),
        username: Some(seller.to_string()),
        avatar_url: None,
    });
    listing.price = price;
    listing.category = Some(category.to_string());
    listing
}

pub async fn run_demo() {
    let backend = InMemoryBackend::new(demo_catalog());
    let service = ListingSyncService::mount(Arc::new(backend.clone()), demo_settings()).await;
    let filter = ListingFilter::default();
    let show = |service: &ListingSyncService| {
        let snapshot = service.snapshot();
        print_listings(&snapshot.listings, &snapshot.advisory, &filter);
    };

    step("Initial load");
    show(&service);

    step("A seller posts a new listing");
    let calculator = demo_listing(
        "l-105",
        "Casio fx-991EX calculator",
        850.0,
        "Electronics",
        "mika",
    );
    let posted = ListingChange::Inserted(ListingChangePayload::from(&calculator));
    backend.upsert_row(calculator);
    backend.emit(&posted);
    settle().await;
    show(&service);

    step("The same insert arrives twice");
    backend.emit(&posted);
    settle().await;
    println!("{} listing(s), unchanged", service.snapshot().len());

    step("A delete event for a listing that still exists");
    backend.emit(&ListingChange::Deleted(ListingChangePayload::id_only("l-101")));
    settle().await;
    show(&service);

    step("The primary query stops returning listings");
    let ids: Vec<ListingId> = service
        .snapshot()
        .listings
        .iter()
        .map(|listing| listing.id.clone())
        .collect();
    for id in &ids {
        backend.hide_from_primary(id.clone());
    }
    service.manual_refresh().await;
    show(&service);

    step("The primary query recovers");
    for id in &ids {
        backend.reveal_in_primary(id);
    }
    service.manual_refresh().await;
    show(&service);

    step("Visibility counts");
    for line in format_counts_lines(&service.visibility_counts().await) {
        println!("{line}");
    }
    println!("{}", health_line(service.realtime_health()));

    service.unmount().await;
}

fn step(title: &str) {
    println!();
    println!("== {title} ==");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
