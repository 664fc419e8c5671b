//! Storage abstraction
//!
//! The flow touches two browser storage partitions: short-lived tab-scoped
//! storage (PKCE verifier, CSRF state, invite data, password-change marker)
//! and durable storage that survives tab close (saved route, consent cache).
//! Both are abstracted behind minimal key-value traits so the core is
//! testable without a real browser, and so multi-tab semantics can be
//! revisited in one place.
//!
//! No locking across tabs is provided. Each key is written by at most one
//! active flow in the intended usage pattern; concurrent tabs get
//! last-writer-wins.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Short-lived key for the PKCE code verifier (one round trip)
pub const VERIFIER_KEY: &str = "authflow.pkce_verifier";

/// Short-lived key for the CSRF state (one round trip)
pub const STATE_KEY: &str = "authflow.oauth_state";

/// Short-lived key for pending invite data
pub const INVITE_KEY: &str = "authflow.invite";

/// Short-lived marker: the invited user must change their password
pub const MUST_CHANGE_PASSWORD_KEY: &str = "authflow.must_change_password";

/// Durable key for the saved pre-authentication route
pub const SAVED_ROUTE_KEY: &str = "authflow.saved_route";

/// Durable key prefix for the per-client consent-approval cache
pub const CONSENT_KEY_PREFIX: &str = "authflow.consent.";

/// Short-lived, tab-scoped key-value storage
///
/// Values placed here live for at most one authorization round trip.
pub trait EphemeralStorage: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, overwriting any previous one
    fn set(&self, key: &str, value: &str);

    /// Remove a value, returning it if present (one-time reads)
    fn remove(&self, key: &str) -> Option<String>;
}

/// Durable key-value storage that survives tab close
pub trait DurableStorage: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, overwriting any previous one
    fn set(&self, key: &str, value: &str);

    /// Remove a value, returning it if present
    fn remove(&self, key: &str) -> Option<String>;
}

/// Sink for the refresh-token cookie written after a successful exchange
pub trait CookieSink: Send + Sync {
    /// Write a same-site (lax), path `/` cookie
    fn set_cookie(&self, name: &str, value: &str, max_age: Duration, secure: bool);
}

/// Thread-safe in-memory storage
///
/// Backs unit and integration tests, and any host without real browser
/// storage. Implements both storage traits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether the store holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl EphemeralStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> Option<String> {
        self.values.lock().remove(key)
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> Option<String> {
        self.values.lock().remove(key)
    }
}
