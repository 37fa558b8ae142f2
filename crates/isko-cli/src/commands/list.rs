use chrono::Utc;
use isko_core::ListingSyncService;

use crate::commands::common::{
    listing_filter, listing_to_list_item, load_settings, open_backend,
    print_listings, ListingListItem, ListingReport,
};
use crate::error::CliError;

pub async fn run_list(
    category: Option<String>,
    search: Option<String>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let filter = listing_filter(category, search, Some(limit))?;
    let settings = load_settings()?;
    let backend = open_backend()?;

    let service = ListingSyncService::mount_with_filter(backend, settings, filter.clone()).await;
    let snapshot = service.snapshot();
    service.unmount().await;

    if as_json {
        let now = Utc::now();
        let report = ListingReport {
            listings: snapshot
                .listings
                .iter()
                .map(|listing| listing_to_list_item(listing, now))
                .collect::<Vec<ListingListItem>>(),
            advisory: snapshot
                .advisory
                .active
                .then(|| snapshot.advisory.note.clone())
                .flatten(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_listings(&snapshot.listings, &snapshot.advisory, &filter);
    }

    Ok(())
}
