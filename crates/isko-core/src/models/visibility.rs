//! Visibility advisory and diagnostic counts

use serde::{Deserialize, Serialize};

/// Access path a row count is taken through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountScope {
    /// Public listing query with the visibility filter and seller join
    Primary,
    /// Broad server-side view
    Broad,
    /// Unfiltered listings table
    Raw,
}

impl CountScope {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Broad => "broad",
            Self::Raw => "raw",
        }
    }
}

/// Sticky warning raised when the broad path sees listings the primary path hides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityAdvisory {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl VisibilityAdvisory {
    #[must_use]
    pub fn raised(hidden_count: usize) -> Self {
        let noun = if hidden_count == 1 {
            "listing exists"
        } else {
            "listings exist"
        };
        Self {
            active: true,
            note: Some(format!(
                "{hidden_count} {noun} but {} not visible through the normal listing query; showing results from the fallback view.",
                if hidden_count == 1 { "is" } else { "are" }
            )),
        }
    }

    #[must_use]
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Side-by-side row counts for the diagnostics panel. `None` means that count
/// failed to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityCounts {
    pub primary: Option<u64>,
    pub broad: Option<u64>,
    pub raw: Option<u64>,
}

impl VisibilityCounts {
    /// Whether the primary path under-returns relative to either other path.
    #[must_use]
    pub fn has_discrepancy(&self) -> bool {
        let Some(primary) = self.primary else {
            return false;
        };
        self.broad.is_some_and(|broad| broad > primary) || self.raw.is_some_and(|raw| raw > primary)
    }
}
