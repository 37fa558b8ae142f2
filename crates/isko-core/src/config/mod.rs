//! Runtime configuration for the backend client and the sync engine.
//!
//! Values come from the environment (`SUPABASE_*`, `ISKO_*`). Both structs are
//! built through `from_lookup` so they can be exercised without touching the
//! process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::is_http_url;

const DEFAULT_LISTINGS_TABLE: &str = "products";
const DEFAULT_BROAD_VIEW: &str = "products_broad_view";
const DEFAULT_SELLER_TABLE: &str = "users";
const DEFAULT_INTERVAL_SECS: &str = "5";
const MAX_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for the managed backend.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Signed-in user's access token; requests fall back to the anon key
    pub access_token: Option<String>,
    pub listings_table: String,
    /// Server-side view used as the broad/fallback read path
    pub broad_view: String,
    pub seller_table: String,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BackendConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("listings_table", &self.listings_table)
            .field("broad_view", &self.broad_view)
            .field("seller_table", &self.seller_table)
            .finish()
    }
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let supabase_url = required_trimmed(&lookup, "SUPABASE_URL")?;
        if !is_http_url(&supabase_url) {
            return Err(ConfigError::Invalid(
                "SUPABASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let supabase_anon_key = required_trimmed(&lookup, "SUPABASE_ANON_KEY")?;
        let access_token = optional_trimmed(&lookup, "SUPABASE_ACCESS_TOKEN");

        let listings_table =
            relation_name(&lookup, "ISKO_LISTINGS_TABLE", DEFAULT_LISTINGS_TABLE)?;
        let broad_view = relation_name(&lookup, "ISKO_BROAD_VIEW", DEFAULT_BROAD_VIEW)?;
        let seller_table = relation_name(&lookup, "ISKO_SELLER_TABLE", DEFAULT_SELLER_TABLE)?;

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            access_token,
            listings_table,
            broad_view,
            seller_table,
        })
    }

    /// PostgREST base URL (`<project>/rest/v1`).
    #[must_use]
    pub fn rest_url(&self) -> String {
        if self.supabase_url.ends_with("/rest/v1") {
            self.supabase_url.clone()
        } else {
            format!("{}/rest/v1", self.supabase_url)
        }
    }
}

/// Timing knobs for the polling scheduler and realtime health tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Unconditional safety-net refresh interval
    pub poll_interval: Duration,
    /// Conditional refresh interval while realtime is degraded
    pub fast_poll_interval: Duration,
    /// How long to wait for a first realtime event before degrading
    pub realtime_grace: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            fast_poll_interval: Duration::from_secs(5),
            realtime_grace: Duration::from_secs(5),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            poll_interval: interval_secs(&lookup, "ISKO_POLL_INTERVAL_SECS")?,
            fast_poll_interval: interval_secs(&lookup, "ISKO_FAST_POLL_INTERVAL_SECS")?,
            realtime_grace: interval_secs(&lookup, "ISKO_REALTIME_GRACE_SECS")?,
        })
    }
}

fn interval_secs(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Duration, ConfigError> {
    let secs = value_or_default(lookup, name, DEFAULT_INTERVAL_SECS)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [1, {MAX_INTERVAL_SECS}]"
            ))
        })?;
    if !(1..=MAX_INTERVAL_SECS).contains(&secs) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [1, {MAX_INTERVAL_SECS}]"
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn relation_name(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = value_or_default(lookup, name, default);
    let valid = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');
    if valid {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must contain only letters, digits, '_' or '.'"
        )))
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    crate::util::normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(
        map: &'a HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|value| (*value).to_string())
    }

    #[test]
    fn backend_config_requires_supabase_url() {
        let map: HashMap<&str, &str> = HashMap::new();
        let err = BackendConfig::from_lookup(lookup_from(&map)).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn backend_config_applies_defaults_and_trims_url() {
        let mut map = HashMap::new();
        map.insert("SUPABASE_URL", "https://project.supabase.co/");
        map.insert("SUPABASE_ANON_KEY", "anon");

        let config = BackendConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.supabase_url, "https://project.supabase.co");
        assert_eq!(config.rest_url(), "https://project.supabase.co/rest/v1");
        assert_eq!(config.listings_table, "products");
        assert_eq!(config.broad_view, "products_broad_view");
        assert_eq!(config.seller_table, "users");
        assert!(config.access_token.is_none());
    }

    #[test]
    fn backend_config_rejects_non_http_url() {
        let mut map = HashMap::new();
        map.insert("SUPABASE_URL", "project.supabase.co");
        map.insert("SUPABASE_ANON_KEY", "anon");
        assert!(BackendConfig::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn backend_config_rejects_suspicious_relation_names() {
        let mut map = HashMap::new();
        map.insert("SUPABASE_URL", "https://project.supabase.co");
        map.insert("SUPABASE_ANON_KEY", "anon");
        map.insert("ISKO_BROAD_VIEW", "products?select=*");
        assert!(BackendConfig::from_lookup(lookup_from(&map)).is_err());
    }

    #[test]
    fn backend_config_redacts_access_token() {
        let mut map = HashMap::new();
        map.insert("SUPABASE_URL", "https://project.supabase.co");
        map.insert("SUPABASE_ANON_KEY", "anon");
        map.insert("SUPABASE_ACCESS_TOKEN", "sensitive-user-token");

        let config = BackendConfig::from_lookup(lookup_from(&map)).unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-user-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn sync_settings_default_to_five_seconds() {
        let map: HashMap<&str, &str> = HashMap::new();
        let settings = SyncSettings::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn sync_settings_validate_range() {
        let mut map = HashMap::new();
        map.insert("ISKO_POLL_INTERVAL_SECS", "0");
        assert!(SyncSettings::from_lookup(lookup_from(&map)).is_err());

        map.insert("ISKO_POLL_INTERVAL_SECS", "abc");
        assert!(SyncSettings::from_lookup(lookup_from(&map)).is_err());

        map.insert("ISKO_POLL_INTERVAL_SECS", "30");
        let settings = SyncSettings::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
    }
}
