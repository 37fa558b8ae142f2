//! Full-list reconciliation and visibility diagnostics.

use std::collections::HashSet;

use crate::backend::{ListingBackend, ListingFilter};
use crate::models::{CountScope, Listing, ListingId, VisibilityAdvisory, VisibilityCounts};

use super::{SyncCore, SyncState};

/// Result of one refresh cycle, before it touches the cache.
#[derive(Debug)]
pub(super) enum RefreshOutcome {
    /// The primary query alone is authoritative
    Primary(Vec<Listing>),
    /// The broad view surfaced `hidden` listings the primary query missed
    Escalated { listings: Vec<Listing>, hidden: usize },
    /// A required fetch failed; keep the cache and advisory as they are
    Failed,
}

/// Fetch the primary list and escalate to the broad view when it under-returns.
pub(super) async fn fetch_refresh(
    backend: &dyn ListingBackend,
    filter: &ListingFilter,
) -> RefreshOutcome {
    let primary = match backend.fetch_listings(filter).await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!("Primary listing fetch failed; keeping cached listings: {error}");
            return RefreshOutcome::Failed;
        }
    };

    if !needs_escalation(backend, filter, primary.len()).await {
        return RefreshOutcome::Primary(primary);
    }

    let broad = match backend.fetch_listings_broad().await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::warn!("Broad listing fetch failed; keeping cached listings: {error}");
            return RefreshOutcome::Failed;
        }
    };

    let visible: Vec<Listing> = broad
        .into_iter()
        .filter(|listing| listing.is_publicly_visible() && filter.matches(listing))
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect();
    let hidden = {
        let primary_ids: HashSet<&ListingId> = primary.iter().map(|listing| &listing.id).collect();
        visible
            .iter()
            .filter(|listing| !primary_ids.contains(&listing.id))
            .count()
    };

    if hidden == 0 {
        RefreshOutcome::Primary(primary)
    } else {
        tracing::warn!(
            "Broad listing view returned {} row(s) hidden from the primary query ({} primary, {} broad)",
            hidden,
            primary.len(),
            visible.len()
        );
        RefreshOutcome::Escalated {
            listings: visible,
            hidden,
        }
    }
}

/// Escalate whenever the primary result is smaller than the broad count.
///
/// Filtered queries cannot be compared against an unfiltered count, so they
/// only escalate on an empty result. An unknown count always escalates; the
/// broad rows then decide.
async fn needs_escalation(
    backend: &dyn ListingBackend,
    filter: &ListingFilter,
    primary_len: usize,
) -> bool {
    if *filter != ListingFilter::default() {
        return primary_len == 0;
    }

    match backend.count_listings(CountScope::Broad).await {
        Ok(broad_count) => u64::try_from(primary_len).unwrap_or(u64::MAX) < broad_count,
        Err(error) => {
            tracing::debug!("Broad count failed; comparing against the broad list: {error}");
            true
        }
    }
}

impl SyncState {
    /// Fold a refresh outcome into the cache and advisory.
    fn apply_refresh(&mut self, outcome: RefreshOutcome) -> bool {
        match outcome {
            RefreshOutcome::Failed => false,
            RefreshOutcome::Primary(listings) => {
                let clears_advisory = self.advisory.active && !listings.is_empty();
                let changed = self.cache.merge_list(listings);
                if clears_advisory {
                    tracing::info!("Primary listing query recovered; clearing visibility advisory");
                    self.advisory = VisibilityAdvisory::cleared();
                }
                changed || clears_advisory
            }
            RefreshOutcome::Escalated { listings, hidden } => {
                let changed = self.cache.merge_list(listings);
                let advisory = VisibilityAdvisory::raised(hidden);
                let advisory_changed = self.advisory != advisory;
                if advisory_changed {
                    self.advisory = advisory;
                }
                changed || advisory_changed
            }
        }
    }
}

impl SyncCore {
    /// One full reconciliation cycle. Returns whether a new snapshot was published.
    pub(super) async fn refresh(&self) -> bool {
        if !self.is_mounted().await {
            return false;
        }
        let outcome = fetch_refresh(self.backend.as_ref(), &self.filter).await;
        self.apply(|state| state.apply_refresh(outcome)).await
    }

    pub(super) async fn visibility_counts(&self) -> VisibilityCounts {
        count_visibility(self.backend.as_ref()).await
    }
}

/// Read-only diagnostic: primary, broad, and raw counts side by side.
///
/// A count that fails to load is reported as `None`.
pub async fn count_visibility(backend: &dyn ListingBackend) -> VisibilityCounts {
    let (primary, broad, raw) = tokio::join!(
        backend.count_listings(CountScope::Primary),
        backend.count_listings(CountScope::Broad),
        backend.count_listings(CountScope::Raw),
    );

    let keep = |scope: CountScope, result: crate::Result<u64>| match result {
        Ok(count) => Some(count),
        Err(error) => {
            tracing::warn!("Failed to count {} listings: {error}", scope.label());
            None
        }
    };

    VisibilityCounts {
        primary: keep(CountScope::Primary, primary),
        broad: keep(CountScope::Broad, broad),
        raw: keep(CountScope::Raw, raw),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::memory::{BackendOp, InMemoryBackend};

    fn core_for(backend: &InMemoryBackend) -> SyncCore {
        SyncCore::new(Arc::new(backend.clone()), ListingFilter::default())
    }

    fn rows(ids: &[&str]) -> Vec<Listing> {
        ids.iter()
            .map(|id| Listing::new(*id, format!("Listing {id}")))
            .collect()
    }

    #[tokio::test]
    async fn null_availability_listing_is_cached() {
        let listing: Listing = serde_json::from_str(
            r#"{"id":"p1","title":"Graphing calculator","is_deleted":false,"is_hidden":false,"is_available":null}"#,
        )
        .unwrap();
        let backend = InMemoryBackend::new(vec![listing]);
        let core = core_for(&backend);

        assert!(core.refresh().await);
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["p1"]);
        assert!(!snapshot.advisory.active);
    }

    #[tokio::test]
    async fn empty_primary_escalates_to_broad_view() {
        let backend = InMemoryBackend::new(rows(&["a", "b"]));
        backend.hide_from_primary("a");
        backend.hide_from_primary("b");
        let core = core_for(&backend);

        assert!(core.refresh().await);
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a", "b"]);
        assert!(snapshot.advisory.active);
        assert!(snapshot
            .advisory
            .note
            .as_deref()
            .is_some_and(|note| !note.is_empty()));
    }

    #[tokio::test]
    async fn partial_primary_escalates_when_broad_count_is_larger() {
        let backend = InMemoryBackend::new(rows(&["a", "b", "c"]));
        backend.hide_from_primary("b");
        let core = core_for(&backend);

        core.refresh().await;
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a", "b", "c"]);
        assert_eq!(
            snapshot.advisory,
            VisibilityAdvisory::raised(1),
        );
    }

    #[tokio::test]
    async fn advisory_clears_once_primary_is_complete() {
        let backend = InMemoryBackend::new(rows(&["a", "b"]));
        backend.hide_from_primary("a");
        backend.hide_from_primary("b");
        let core = core_for(&backend);
        core.refresh().await;
        assert!(core.snapshot_tx.borrow().advisory.active);

        backend.reveal_in_primary(&ListingId::from("a"));
        backend.remove_row(&ListingId::from("b"));
        assert!(core.refresh().await);

        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a"]);
        assert!(!snapshot.advisory.active);
        assert!(snapshot.advisory.note.is_none());
    }

    #[tokio::test]
    async fn advisory_stays_while_primary_is_empty() {
        let backend = InMemoryBackend::new(rows(&["a"]));
        backend.hide_from_primary("a");
        let core = core_for(&backend);
        core.refresh().await;

        backend.remove_row(&ListingId::from("a"));
        core.refresh().await;
        let snapshot = core.snapshot_tx.borrow().clone();
        assert!(snapshot.is_empty());
        assert!(snapshot.advisory.active);
    }

    #[tokio::test]
    async fn failed_primary_fetch_leaves_cache_untouched() {
        let backend = InMemoryBackend::new(rows(&["a", "b"]));
        let core = core_for(&backend);
        core.refresh().await;
        let before = core.snapshot_tx.borrow().clone();

        backend.set_failing(BackendOp::FetchListings, true);
        backend.set_rows(rows(&["c"]));
        assert!(!core.refresh().await);
        assert_eq!(*core.snapshot_tx.borrow(), before);
    }

    #[tokio::test]
    async fn failed_broad_fetch_keeps_escalated_rows_and_advisory() {
        let backend = InMemoryBackend::new(rows(&["a", "b", "c"]));
        backend.hide_from_primary("b");
        backend.hide_from_primary("c");
        let core = core_for(&backend);
        core.refresh().await;
        let before = core.snapshot_tx.borrow().clone();
        assert_eq!(before.ids(), vec!["a", "b", "c"]);
        assert_eq!(before.advisory, VisibilityAdvisory::raised(2));

        backend.set_failing(BackendOp::FetchBroad, true);
        assert!(!core.refresh().await);
        assert_eq!(*core.snapshot_tx.borrow(), before);
    }

    #[tokio::test]
    async fn failed_broad_fetch_leaves_fresh_cache_empty() {
        let backend = InMemoryBackend::new(rows(&["a", "b"]));
        backend.hide_from_primary("b");
        backend.set_failing(BackendOp::FetchBroad, true);
        let core = core_for(&backend);

        assert!(!core.refresh().await);
        let snapshot = core.snapshot_tx.borrow().clone();
        assert!(snapshot.is_empty());
        assert!(!snapshot.advisory.active);
    }

    #[tokio::test]
    async fn failed_count_keeps_escalated_rows_and_advisory() {
        let backend = InMemoryBackend::new(rows(&["a", "b", "c"]));
        backend.hide_from_primary("b");
        backend.hide_from_primary("c");
        let core = core_for(&backend);
        core.refresh().await;
        let before = core.snapshot_tx.borrow().clone();

        backend.set_failing(BackendOp::Count, true);
        assert!(!core.refresh().await);
        assert_eq!(*core.snapshot_tx.borrow(), before);
        assert_eq!(backend.calls(BackendOp::FetchBroad), 2);

        backend.set_failing(BackendOp::FetchBroad, true);
        assert!(!core.refresh().await);
        assert_eq!(*core.snapshot_tx.borrow(), before);
    }

    #[tokio::test]
    async fn failed_count_falls_back_to_broad_comparison() {
        let backend = InMemoryBackend::new(rows(&["a", "b"]));
        backend.set_failing(BackendOp::Count, true);
        let core = core_for(&backend);

        core.refresh().await;
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a", "b"]);
        assert!(!snapshot.advisory.active);
        assert_eq!(backend.calls(BackendOp::FetchBroad), 1);

        backend.hide_from_primary("b");
        core.refresh().await;
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a", "b"]);
        assert_eq!(snapshot.advisory, VisibilityAdvisory::raised(1));
    }

    #[tokio::test]
    async fn non_visible_broad_rows_never_reach_cache() {
        let mut deleted = Listing::new("d", "Old poster");
        deleted.is_deleted = true;
        let mut hidden = Listing::new("h", "Moderated item");
        hidden.is_hidden = true;
        let mut sold = Listing::new("s", "Sold bike");
        sold.is_available = Some(false);
        let mut table = vec![deleted, hidden, sold];
        table.extend(rows(&["a"]));
        let backend = InMemoryBackend::new(table);
        backend.hide_from_primary("a");
        let core = core_for(&backend);

        assert_eq!(backend.fetch_listings_broad().await.unwrap().len(), 4);
        core.refresh().await;
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a"]);
        assert_eq!(snapshot.advisory, VisibilityAdvisory::raised(1));

        backend.reveal_in_primary(&ListingId::from("a"));
        core.refresh().await;
        let snapshot = core.snapshot_tx.borrow().clone();
        assert_eq!(snapshot.ids(), vec!["a"]);
        assert!(!snapshot.advisory.active);
    }

    #[tokio::test]
    async fn filtered_refresh_skips_broad_count() {
        let mut book = Listing::new("a", "Physics textbook");
        book.category = Some("Books".to_string());
        let backend = InMemoryBackend::new(vec![book, Listing::new("b", "Desk fan")]);
        let core = SyncCore::new(
            Arc::new(backend.clone()),
            ListingFilter {
                category: Some("Books".to_string()),
                ..ListingFilter::default()
            },
        );

        core.refresh().await;
        assert_eq!(core.snapshot_tx.borrow().ids(), vec!["a"]);
        assert_eq!(backend.calls(BackendOp::Count), 0);
        assert!(!core.snapshot_tx.borrow().advisory.active);
    }

    #[tokio::test]
    async fn visibility_counts_are_read_only() {
        let backend = InMemoryBackend::new(rows(&["a", "b", "c"]));
        backend.hide_from_primary("c");
        let mut deleted = Listing::new("d", "Gone");
        deleted.is_deleted = true;
        backend.upsert_row(deleted);
        let core = core_for(&backend);

        let counts = core.visibility_counts().await;
        assert_eq!(
            counts,
            VisibilityCounts {
                primary: Some(2),
                broad: Some(3),
                raw: Some(4),
            }
        );
        assert!(counts.has_discrepancy());
        assert_eq!(core.snapshot_tx.borrow().revision, 0);
        assert_eq!(backend.calls(BackendOp::FetchListings), 0);
    }

    #[tokio::test]
    async fn failed_counts_are_reported_as_missing() {
        let backend = InMemoryBackend::new(rows(&["a"]));
        backend.set_failing(BackendOp::Count, true);
        let core = core_for(&backend);

        assert_eq!(core.visibility_counts().await, VisibilityCounts::default());
    }
}
