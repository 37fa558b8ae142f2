//! Realtime subscription health.
//!
//! ```text
//! Subscribing --event--> Healthy
//! Subscribing --grace elapsed--> Degraded --event--> Healthy
//! (any) --subscribe failed / feed closed--> Degraded
//! ```

use std::fmt;

/// Health of the realtime change feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RealtimeHealth {
    /// Subscribed, no event seen yet
    #[default]
    Subscribing,
    /// At least one event has arrived
    Healthy,
    /// Grace window elapsed without an event, or the feed is unavailable
    Degraded,
}

impl RealtimeHealth {
    /// Any delivered event proves the channel works.
    #[must_use]
    pub const fn on_event(self) -> Self {
        Self::Healthy
    }

    /// Grace window expiry only degrades a channel that never delivered.
    #[must_use]
    pub const fn on_grace_elapsed(self) -> Self {
        match self {
            Self::Subscribing => Self::Degraded,
            other => other,
        }
    }

    /// Subscription setup failed or the feed closed.
    #[must_use]
    pub const fn on_feed_lost(self) -> Self {
        Self::Degraded
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for RealtimeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribing => write!(f, "subscribing"),
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_expiry_degrades_only_unconfirmed_channel() {
        assert_eq!(
            RealtimeHealth::Subscribing.on_grace_elapsed(),
            RealtimeHealth::Degraded
        );
        assert_eq!(
            RealtimeHealth::Healthy.on_grace_elapsed(),
            RealtimeHealth::Healthy
        );
    }

    #[test]
    fn events_recover_degraded_channel() {
        assert_eq!(
            RealtimeHealth::Degraded.on_event(),
            RealtimeHealth::Healthy
        );
        assert!(RealtimeHealth::Subscribing.on_event().is_healthy());
    }

    #[test]
    fn lost_feed_degrades() {
        assert_eq!(
            RealtimeHealth::Healthy.on_feed_lost(),
            RealtimeHealth::Degraded
        );
    }
}
