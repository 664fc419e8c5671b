//! Session store
//!
//! Process-wide holder of the current identity claims and raw access token.
//! An explicit, dependency-injected container (constructed fresh per test),
//! not a language-level global. Two states: **Anonymous** (initial, and
//! re-entered after sign-out or renewal) and **Authenticated** (entered only
//! via [`SessionStore::set_access_token`]).
//!
//! Every transition is published through a `watch` channel so dependent UI
//! observes the authoritative identity without polling.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::token::{self, SessionClaims, TokenCodecError};

/// Strategy invoked when the renewal timer fires
///
/// The shipped [`DropToAnonymous`] reproduces the placeholder behavior of
/// the original client: no refresh-token grant is attempted and the session
/// simply returns to anonymous. A real refresh grant slots in behind this
/// trait without touching `SessionStore` callers.
#[async_trait]
pub trait RenewalStrategy: Send + Sync {
    /// Attempt to renew the session before the access token expires
    async fn renew(&self, store: &SessionStore);
}

/// Placeholder renewal: transition back to anonymous
#[derive(Debug, Default, Clone, Copy)]
pub struct DropToAnonymous;

#[async_trait]
impl RenewalStrategy for DropToAnonymous {
    async fn renew(&self, store: &SessionStore) {
        warn!("access token near expiry and no refresh grant configured, dropping session");
        store.sign_out();
    }
}

struct SessionState {
    claims: SessionClaims,
    jwt: Option<String>,
}

/// Dependency-injected session container with renewal scheduling
pub struct SessionStore {
    state: RwLock<SessionState>,
    publisher: watch::Sender<SessionClaims>,
    renewal: Mutex<Option<JoinHandle<()>>>,
    strategy: Arc<dyn RenewalStrategy>,
    refresh_window: Duration,
    weak_self: Weak<Self>,
}

impl SessionStore {
    /// Create an anonymous session store
    ///
    /// `refresh_window` is how long before token expiry the renewal timer
    /// fires (the reference deployment uses 5 minutes).
    #[must_use]
    pub fn new(strategy: Arc<dyn RenewalStrategy>, refresh_window: Duration) -> Arc<Self> {
        let (publisher, _) = watch::channel(SessionClaims::anonymous());
        Arc::new_cyclic(|weak_self| Self {
            state: RwLock::new(SessionState { claims: SessionClaims::anonymous(), jwt: None }),
            publisher,
            renewal: Mutex::new(None),
            strategy,
            refresh_window,
            weak_self: weak_self.clone(),
        })
    }

    /// Install a freshly issued access token
    ///
    /// Decodes the token, transitions to Authenticated, publishes the new
    /// claims, and cancel-and-reschedules the renewal timer to fire at
    /// `max(0, expiry - now - refresh_window)`.
    ///
    /// # Errors
    /// Returns [`TokenCodecError`] if the token cannot be decoded; the store
    /// keeps its previous state and never transitions to Authenticated from
    /// a malformed token.
    pub fn set_access_token(&self, jwt: &str) -> Result<(), TokenCodecError> {
        let claims = token::decode(jwt)?;
        let exp = claims.exp;

        {
            let mut state = self.state.write();
            state.claims = claims.clone();
            state.jwt = Some(jwt.to_string());
        }
        let _ = self.publisher.send(claims);
        info!(exp, "session authenticated");

        self.schedule_renewal(exp);
        Ok(())
    }

    fn schedule_renewal(&self, exp: i64) {
        let now_ms = Utc::now().timestamp_millis();
        let fire_at_ms = exp.saturating_mul(1_000) - self.refresh_window.as_millis() as i64;
        let delay = Duration::from_millis(fire_at_ms.saturating_sub(now_ms).max(0) as u64);

        let weak = self.weak_self.clone();
        let strategy = Arc::clone(&self.strategy);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(store) = weak.upgrade() else { return };
            // A timer that outlived a sign-out finds the session anonymous
            // and must not renew.
            if store.is_authenticated() {
                strategy.renew(&store).await;
            } else {
                debug!("renewal timer fired on anonymous session, ignoring");
            }
        });

        if let Some(previous) = self.renewal.lock().replace(handle) {
            previous.abort();
        }
        debug!(delay_ms = delay.as_millis() as u64, "scheduled session renewal");
    }

    /// Transition to Anonymous immediately
    ///
    /// Cancels any pending renewal timer; a timer that already fired and is
    /// mid-flight finds the session anonymous and has no effect.
    pub fn sign_out(&self) {
        if let Some(pending) = self.renewal.lock().take() {
            pending.abort();
        }

        let was_authenticated = {
            let mut state = self.state.write();
            let was = state.claims.is_authenticated;
            state.claims = SessionClaims::anonymous();
            state.jwt = None;
            was
        };
        let _ = self.publisher.send(SessionClaims::anonymous());

        if was_authenticated {
            info!("session signed out");
        }
    }

    /// Whether the current claims are not the anonymous sentinel
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().claims.is_authenticated
    }

    /// Whether the granted scope set contains `scope`
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.state.read().claims.has_scope(scope)
    }

    /// Group/role memberships of the current identity
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        self.state.read().claims.groups.clone()
    }

    /// Email of the current identity (empty for anonymous)
    #[must_use]
    pub fn email(&self) -> String {
        self.state.read().claims.email.clone()
    }

    /// Display name of the current identity (empty for anonymous)
    #[must_use]
    pub fn name(&self) -> String {
        self.state.read().claims.name.clone()
    }

    /// The raw access token, if authenticated
    #[must_use]
    pub fn jwt(&self) -> Option<String> {
        self.state.read().jwt.clone()
    }

    /// Snapshot of the current claims
    #[must_use]
    pub fn claims(&self) -> SessionClaims {
        self.state.read().claims.clone()
    }

    /// Observe every state transition without polling
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionClaims> {
        self.publisher.subscribe()
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(pending) = self.renewal.lock().take() {
            pending.abort();
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .field("refresh_window", &self.refresh_window)
            .finish()
    }
}
