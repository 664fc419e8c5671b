//! Client-side consent-approval cache
//!
//! Remembers, per client name, that the user already approved a consent
//! screen and which scopes were granted. A cached approval is stale after
//! 30 days or when the requested scope set no longer matches the granted
//! one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{DurableStorage, CONSENT_KEY_PREFIX};

/// Cached approvals older than this are ignored
pub const CONSENT_MAX_AGE_DAYS: i64 = 30;

/// One remembered consent approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// When the approval was granted
    pub granted_at: DateTime<Utc>,

    /// Scopes the user approved
    pub scopes: Vec<String>,
}

fn scope_sets_match(granted: &[String], requested: &[String]) -> bool {
    let mut granted: Vec<&str> = granted.iter().map(String::as_str).collect();
    let mut requested: Vec<&str> = requested.iter().map(String::as_str).collect();
    granted.sort_unstable();
    granted.dedup();
    requested.sort_unstable();
    requested.dedup();
    granted == requested
}

/// Durable per-client approval cache
pub struct ConsentCache {
    durable: Arc<dyn DurableStorage>,
}

impl ConsentCache {
    /// Create a cache persisting to `durable`
    #[must_use]
    pub fn new(durable: Arc<dyn DurableStorage>) -> Self {
        Self { durable }
    }

    fn key(client_name: &str) -> String {
        format!("{CONSENT_KEY_PREFIX}{client_name}")
    }

    /// Remember an approval for `client_name`, timestamped now
    pub fn record(&self, client_name: &str, scopes: &[String]) {
        let record = ConsentRecord { granted_at: Utc::now(), scopes: scopes.to_vec() };
        if let Ok(json) = serde_json::to_string(&record) {
            self.durable.set(&Self::key(client_name), &json);
            debug!(client_name, "recorded consent approval");
        }
    }

    /// Whether a fresh approval covering exactly `requested` exists
    ///
    /// Stale (older than [`CONSENT_MAX_AGE_DAYS`]), scope-mismatched, or
    /// unparseable records answer `false`.
    #[must_use]
    pub fn is_fresh(&self, client_name: &str, requested: &[String], now: DateTime<Utc>) -> bool {
        let Some(raw) = self.durable.get(&Self::key(client_name)) else {
            return false;
        };
        let Ok(record) = serde_json::from_str::<ConsentRecord>(&raw) else {
            debug!(client_name, "discarding unparseable consent record");
            return false;
        };

        if now - record.granted_at > Duration::days(CONSENT_MAX_AGE_DAYS) {
            return false;
        }
        scope_sets_match(&record.scopes, requested)
    }

    /// Drop any remembered approval for `client_name`
    pub fn clear(&self, client_name: &str) {
        self.durable.remove(&Self::key(client_name));
    }
}

impl std::fmt::Debug for ConsentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentCache").finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for consent.
    use super::*;
    use crate::storage::MemoryStorage;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn cache() -> ConsentCache {
        ConsentCache::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_fresh_approval_matches() {
        let cache = cache();
        cache.record("demo-client", &scopes(&["openid", "profile"]));

        assert!(cache.is_fresh("demo-client", &scopes(&["openid", "profile"]), Utc::now()));
        // Order does not matter; the scopes are a set.
        assert!(cache.is_fresh("demo-client", &scopes(&["profile", "openid"]), Utc::now()));
    }

    #[test]
    fn test_scope_mismatch_is_stale() {
        let cache = cache();
        cache.record("demo-client", &scopes(&["openid"]));

        assert!(!cache.is_fresh("demo-client", &scopes(&["openid", "profile"]), Utc::now()));
        assert!(!cache.is_fresh("demo-client", &scopes(&[]), Utc::now()));
    }

    #[test]
    fn test_expires_after_thirty_days() {
        let cache = cache();
        cache.record("demo-client", &scopes(&["openid"]));

        let in_29_days = Utc::now() + Duration::days(29);
        let in_31_days = Utc::now() + Duration::days(31);
        assert!(cache.is_fresh("demo-client", &scopes(&["openid"]), in_29_days));
        assert!(!cache.is_fresh("demo-client", &scopes(&["openid"]), in_31_days));
    }

    #[test]
    fn test_unknown_client_and_clear() {
        let cache = cache();
        assert!(!cache.is_fresh("never-seen", &scopes(&["openid"]), Utc::now()));

        cache.record("demo-client", &scopes(&["openid"]));
        cache.clear("demo-client");
        assert!(!cache.is_fresh("demo-client", &scopes(&["openid"]), Utc::now()));
    }
}
