//! Route restoration
//!
//! Persists the route the user was on before being forced to authenticate
//! (or before signing out) and computes, once authentication completes,
//! where to navigate. OAuth-internal routes and mid-flow URLs are never
//! captured; navigation failures are logged, not propagated.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::{DurableStorage, SAVED_ROUTE_KEY};

/// Route prefixes that are never saved (authentication-internal screens)
pub const DENIED_PREFIXES: [&str; 3] = ["/signin", "/signup", "/authorize"];

/// Exact routes that are never saved
pub const DENIED_EXACT: [&str; 2] = ["/", "/signout"];

/// Failure reported by a [`Navigator`]
#[derive(Debug, Error)]
#[error("navigation failed: {0}")]
pub struct NavigationError(pub String);

/// Browser navigation seam
///
/// Abstracts the router so the coordinator is testable without a browser.
/// `navigate` mirrors a router promise: `Ok(false)` means the router
/// declined the navigation.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Current path + query
    fn current_location(&self) -> String;

    /// Navigate to `target`
    ///
    /// # Errors
    /// Returns [`NavigationError`] when navigation could not be started.
    async fn navigate(&self, target: &str) -> Result<bool, NavigationError>;
}

/// A computed navigation target
///
/// `clear_saved` records whether consuming this target should clear the
/// saved slot: only when the saved slot itself (not a manually-entered URL)
/// was the thing consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Path + query to navigate to
    pub path: String,
    /// Whether a successful navigation consumes the saved slot
    pub clear_saved: bool,
}

fn split_route(route: &str) -> (&str, Option<&str>) {
    match route.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (route, None),
    }
}

fn query_carries_state(query: &str) -> bool {
    url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == "state")
}

/// Whether `route` is excluded from saving and from being a redirect target
///
/// Deny-listed: the fixed prefixes and exact routes above, plus any route
/// whose query string carries an OAuth `state` parameter (a mid-flow URL).
#[must_use]
pub fn is_denied(route: &str) -> bool {
    let (path, query) = split_route(route);

    if DENIED_EXACT.contains(&path) {
        return true;
    }
    if DENIED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    query.is_some_and(query_carries_state)
}

/// Coordinator for saving and restoring the pre-authentication route
pub struct RouteRestorer {
    durable: Arc<dyn DurableStorage>,
    navigator: Arc<dyn Navigator>,
    default_route: String,
}

impl RouteRestorer {
    /// Create a coordinator persisting to `durable` and navigating through
    /// `navigator`; `default_route` is the authenticated landing route used
    /// when nothing is saved.
    #[must_use]
    pub fn new(
        durable: Arc<dyn DurableStorage>,
        navigator: Arc<dyn Navigator>,
        default_route: impl Into<String>,
    ) -> Self {
        Self { durable, navigator, default_route: default_route.into() }
    }

    /// Persist `route` (path + query) unless it is deny-listed
    ///
    /// Overwrites the single saved slot.
    pub fn save_route(&self, route: &str) {
        if is_denied(route) {
            debug!(route, "not saving deny-listed route");
            return;
        }
        self.durable.set(SAVED_ROUTE_KEY, route);
        debug!(route, "saved pre-authentication route");
    }

    /// The saved route, or the default landing route if none is saved
    #[must_use]
    pub fn saved_route(&self) -> String {
        self.durable.get(SAVED_ROUTE_KEY).unwrap_or_else(|| self.default_route.clone())
    }

    /// Capture the current path + query before an explicit sign-out or an
    /// auth-guard redirect
    pub fn save_current_route_before_signout(&self) {
        self.save_route(&self.navigator.current_location());
    }

    /// Post-login target: the saved route when one exists (consuming it
    /// clears the slot), the default landing route otherwise
    #[must_use]
    pub fn post_login_target(&self) -> RouteTarget {
        match self.durable.get(SAVED_ROUTE_KEY) {
            Some(saved) => RouteTarget { path: saved, clear_saved: true },
            None => RouteTarget { path: self.default_route.clone(), clear_saved: false },
        }
    }

    /// Compute where to navigate after authentication
    ///
    /// Prefers `initial_url` when it differs from the current location and
    /// is not deny-listed (a manually-entered deep link); otherwise falls
    /// back to the saved route. Returns `None` ("stay put") when the
    /// computed target equals the current location, or when the current
    /// location is itself deny-listed and not the root path.
    #[must_use]
    pub fn determine_target(&self, initial_url: Option<&str>) -> Option<RouteTarget> {
        let current = self.navigator.current_location();

        if let Some(initial) = initial_url {
            if initial != current && !is_denied(initial) {
                return Some(RouteTarget { path: initial.to_string(), clear_saved: false });
            }
        }

        let (current_path, _) = split_route(&current);
        if is_denied(&current) && current_path != "/" {
            return None;
        }

        let target = self.post_login_target();
        if target.path == current {
            return None;
        }
        Some(target)
    }

    /// Perform the navigation
    ///
    /// On success, clears the saved slot only when the target says so.
    /// Failures (error or `false` from the router) are logged and reported
    /// as `false`; callers are not required to retry.
    pub async fn navigate_to(&self, target: &RouteTarget) -> bool {
        match self.navigator.navigate(&target.path).await {
            Ok(true) => {
                if target.clear_saved {
                    self.durable.remove(SAVED_ROUTE_KEY);
                }
                true
            }
            Ok(false) => {
                warn!(target = %target.path, "router declined navigation");
                false
            }
            Err(e) => {
                warn!(target = %target.path, error = %e, "navigation failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for RouteRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRestorer").field("default_route", &self.default_route).finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for routes.
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::RecordingNavigator;

    fn restorer_at(location: &str) -> (Arc<MemoryStorage>, Arc<RecordingNavigator>, RouteRestorer) {
        let durable = Arc::new(MemoryStorage::new());
        let navigator = Arc::new(RecordingNavigator::at(location));
        let restorer = RouteRestorer::new(
            Arc::clone(&durable) as Arc<dyn DurableStorage>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
            "/accounts",
        );
        (durable, navigator, restorer)
    }

    #[test]
    fn test_deny_list() {
        assert!(is_denied("/"));
        assert!(is_denied("/signout"));
        assert!(is_denied("/signin"));
        assert!(is_denied("/signin/abc"));
        assert!(is_denied("/signup?x=1"));
        assert!(is_denied("/authorize/callback"));
        assert!(is_denied("/clients?state=abc123"));
        assert!(is_denied("/clients?foo=1&state=abc"));

        assert!(!is_denied("/clients"));
        assert!(!is_denied("/accounts?page=2"));
        assert!(!is_denied("/clients?estate=1"));
    }

    #[test]
    fn test_save_route_skips_denied() {
        let (_, _, restorer) = restorer_at("/clients");

        restorer.save_route("/signin/abc");
        assert_eq!(restorer.saved_route(), "/accounts");

        restorer.save_route("/clients?page=2");
        assert_eq!(restorer.saved_route(), "/clients?page=2");
    }

    #[test]
    fn test_saved_route_defaults() {
        let (_, _, restorer) = restorer_at("/clients");
        assert_eq!(restorer.saved_route(), "/accounts");
    }

    #[test]
    fn test_determine_target_stays_put_when_already_there() {
        let (_, _, restorer) = restorer_at("/clients");
        restorer.save_route("/clients");

        assert!(restorer.determine_target(None).is_none());
    }

    #[test]
    fn test_determine_target_prefers_fresh_deep_link() {
        let (_, _, restorer) = restorer_at("/accounts");
        restorer.save_route("/clients");

        let target = restorer.determine_target(Some("/accounts/42?tab=roles")).expect("target");
        assert_eq!(target.path, "/accounts/42?tab=roles");
        // A manually-entered URL must not consume the saved slot.
        assert!(!target.clear_saved);
    }

    #[test]
    fn test_determine_target_ignores_denied_initial_url() {
        let (_, _, restorer) = restorer_at("/accounts");
        restorer.save_route("/clients");

        let target = restorer.determine_target(Some("/signin")).expect("target");
        assert_eq!(target.path, "/clients");
        assert!(target.clear_saved);
    }

    #[test]
    fn test_determine_target_none_on_denied_current_location() {
        let (_, _, restorer) = restorer_at("/signin");
        restorer.save_route("/clients");

        assert!(restorer.determine_target(None).is_none());
    }

    #[test]
    fn test_determine_target_allows_root_current_location() {
        let (_, _, restorer) = restorer_at("/");
        let target = restorer.determine_target(None).expect("target");
        assert_eq!(target.path, "/accounts");
    }

    #[tokio::test]
    async fn test_navigate_clears_saved_only_when_consumed() {
        let (durable, navigator, restorer) = restorer_at("/accounts");
        restorer.save_route("/clients");

        // Consuming a manually-entered URL leaves the slot alone.
        let manual = RouteTarget { path: "/accounts/42".to_string(), clear_saved: false };
        assert!(restorer.navigate_to(&manual).await);
        assert!(DurableStorage::get(durable.as_ref(), SAVED_ROUTE_KEY).is_some());

        // Consuming the saved slot clears it.
        let saved = restorer.post_login_target();
        assert!(restorer.navigate_to(&saved).await);
        assert!(DurableStorage::get(durable.as_ref(), SAVED_ROUTE_KEY).is_none());

        assert_eq!(navigator.visits(), vec!["/accounts/42", "/clients"]);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_nonfatal() {
        let (durable, navigator, restorer) = restorer_at("/accounts");
        restorer.save_route("/clients");
        navigator.fail_next("router rejected");

        let target = restorer.post_login_target();
        assert!(!restorer.navigate_to(&target).await);
        // Saved slot is kept when navigation failed.
        assert!(DurableStorage::get(durable.as_ref(), SAVED_ROUTE_KEY).is_some());
    }

    #[test]
    fn test_save_current_route_before_signout() {
        let (_, _, restorer) = restorer_at("/clients?page=3");
        restorer.save_current_route_before_signout();
        assert_eq!(restorer.saved_route(), "/clients?page=3");

        let (_, _, at_signin) = restorer_at("/signin");
        at_signin.save_current_route_before_signout();
        assert_eq!(at_signin.saved_route(), "/accounts");
    }
}
