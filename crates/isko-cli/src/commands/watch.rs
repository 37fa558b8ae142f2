use chrono::Utc;
use isko_core::ListingSyncService;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::common::{
    health_line, listing_filter, load_settings, open_backend, print_listings, snapshot_header,
};
use crate::error::CliError;

pub async fn run_watch(
    category: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
) -> Result<(), CliError> {
    let filter = listing_filter(category, search, limit)?;
    let settings = load_settings()?;
    let backend = open_backend()?;

    let service = ListingSyncService::mount_with_filter(backend, settings, filter.clone()).await;
    let mut snapshots = service.subscribe();
    let mut health = service.subscribe_health();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    println!("Press Enter to refresh, Ctrl-C to quit.");
    println!("{}", health_line(*health.borrow_and_update()));
    let initial = snapshots.borrow_and_update().clone();
    println!("{}", snapshot_header(&initial, Utc::now()));
    print_listings(&initial.listings, &initial.advisory, &filter);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!();
                println!("{}", snapshot_header(&snapshot, Utc::now()));
                print_listings(&snapshot.listings, &snapshot.advisory, &filter);
            }
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *health.borrow_and_update();
                println!("{}", health_line(current));
            }
            line = input.next_line(), if input_open => {
                if line?.is_none() {
                    input_open = false;
                } else if !service.manual_refresh().await {
                    println!("Already up to date.");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    service.unmount().await;
    Ok(())
}
