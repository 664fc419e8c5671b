//! Callback handling
//!
//! Runs once per return from the authorization server. Each step
//! short-circuits the next on failure:
//!
//! 1. surface a server-reported `error` and stop,
//! 2. validate the CSRF `state` against short-lived storage (before any
//!    network call),
//! 3. consume `state` and the code verifier (one-time use, even if the
//!    exchange later fails),
//! 4. exchange the authorization code for tokens,
//! 5. persist the refresh-token cookie and install the access token,
//! 6. divert to the change-password flow for pending native invites,
//! 7. reconcile pending invite data against the authenticated identity,
//! 8. redirect to the saved pre-authentication route or the default
//!    landing route.
//!
//! Terminal errors are returned, never thrown further up: callers turn them
//! into user-visible state. Storage cleanup on the failure paths is
//! unconditional so a stale verifier or state can never be replayed.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::FlowConfig;
use crate::error::{FlowError, FlowResult};
use crate::exchange::CodeExchanger;
use crate::invite::InviteData;
use crate::routes::{RouteRestorer, RouteTarget};
use crate::session::SessionStore;
use crate::storage::{
    CookieSink, EphemeralStorage, INVITE_KEY, MUST_CHANGE_PASSWORD_KEY, STATE_KEY, VERIFIER_KEY,
};

/// Name of the cookie holding the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Query parameters of a callback page load
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// CSRF state round-tripped through the server
    pub state: Option<String>,
    /// OAuth error code, when the server denied the request
    pub error: Option<String>,
    /// Human-readable error description
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse the callback query string (with or without a leading `?`)
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Non-terminal warning: the invite was issued for a different email than
/// the one the user authenticated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationWarning {
    /// Email the invite was issued for
    pub invited_email: String,
    /// Email of the authenticated identity
    pub authenticated_email: String,
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invite was issued for {} but you signed in as {}",
            self.invited_email, self.authenticated_email
        )
    }
}

/// What the callback did after a successful exchange
#[derive(Debug)]
pub enum CallbackOutcome {
    /// Redirected to the post-login route
    Redirected {
        /// Where the user was sent
        target: String,
        /// Present when invite reconciliation found mismatched emails; the
        /// redirect was delayed by the configured grace period so the user
        /// could read it
        warning: Option<ReconciliationWarning>,
    },
    /// A pending native invite requires a password change; the user was sent
    /// to the change-password flow and no reconciliation ran
    ChangePassword,
}

/// Orchestrates the post-authorization callback
pub struct CallbackHandler {
    config: FlowConfig,
    ephemeral: Arc<dyn EphemeralStorage>,
    cookies: Arc<dyn CookieSink>,
    exchanger: Arc<dyn CodeExchanger>,
    session: Arc<SessionStore>,
    routes: Arc<RouteRestorer>,
}

impl CallbackHandler {
    /// Wire up a handler from its collaborators
    #[must_use]
    pub fn new(
        config: FlowConfig,
        ephemeral: Arc<dyn EphemeralStorage>,
        cookies: Arc<dyn CookieSink>,
        exchanger: Arc<dyn CodeExchanger>,
        session: Arc<SessionStore>,
        routes: Arc<RouteRestorer>,
    ) -> Self {
        Self { config, ephemeral, cookies, exchanger, session, routes }
    }

    fn clear_handshake_material(&self) {
        self.ephemeral.remove(STATE_KEY);
        self.ephemeral.remove(VERIFIER_KEY);
    }

    /// Validate the CSRF state and consume the stored handshake material
    ///
    /// Runs strictly before any network call. On success both `state` and
    /// the verifier are gone from storage, so a duplicate callback (browser
    /// back button) cannot replay the exchange.
    fn take_verifier(&self, params: &CallbackParams) -> FlowResult<(String, String)> {
        let query_state = params.state.clone().ok_or_else(|| {
            self.clear_handshake_material();
            FlowError::Csrf { reason: "callback carries no state parameter".to_string() }
        })?;
        let stored_state = self.ephemeral.get(STATE_KEY).ok_or_else(|| {
            self.clear_handshake_material();
            FlowError::Csrf { reason: "no state in storage for this flow".to_string() }
        })?;

        if stored_state != query_state {
            self.clear_handshake_material();
            return Err(FlowError::Csrf { reason: "state does not match stored value".to_string() });
        }

        // One-time use from here on, regardless of how the exchange goes.
        self.ephemeral.remove(STATE_KEY);
        let verifier = self.ephemeral.remove(VERIFIER_KEY).ok_or_else(|| FlowError::Csrf {
            reason: "no code verifier in storage for this flow".to_string(),
        })?;

        let code = params.code.clone().ok_or_else(|| FlowError::Protocol {
            code: "invalid_callback".to_string(),
            description: Some("callback carries no authorization code".to_string()),
        })?;

        Ok((code, verifier))
    }

    /// Reconcile pending invite data against the authenticated identity
    ///
    /// The invite key is cleared unconditionally on every path through this
    /// step; a parse failure is logged, not fatal.
    fn reconcile_invite(&self) -> Option<ReconciliationWarning> {
        let raw = self.ephemeral.remove(INVITE_KEY)?;
        match InviteData::decode(&raw) {
            Ok(invite) => {
                let authenticated_email = self.session.email();
                if invite.matches_email(&authenticated_email) {
                    None
                } else {
                    warn!(
                        invited = %invite.email,
                        authenticated = %authenticated_email,
                        "invite email does not match authenticated identity"
                    );
                    Some(ReconciliationWarning {
                        invited_email: invite.email,
                        authenticated_email,
                    })
                }
            }
            Err(e) => {
                warn!(error = %e, "discarding unparseable invite data");
                None
            }
        }
    }

    /// Process one callback page load
    ///
    /// # Errors
    /// Returns a terminal [`FlowError`] (protocol, CSRF, exchange, or
    /// malformed-token); the session is left untouched on every error path.
    pub async fn handle(&self, params: &CallbackParams) -> FlowResult<CallbackOutcome> {
        // 1. A server-reported error ends the flow before any state or
        //    token processing. Handshake material is wiped so it cannot be
        //    replayed on a retry.
        if let Some(code) = &params.error {
            self.clear_handshake_material();
            return Err(FlowError::Protocol {
                code: code.clone(),
                description: params.error_description.clone(),
            });
        }

        // 2-3. CSRF validation and one-time consumption, before any network
        //      call.
        let (code, verifier) = self.take_verifier(params)?;

        // 4. The exchange; a failure here is terminal but the handshake
        //    material is already gone.
        let redirect_uri = self.config.redirect_uri();
        let tokens = self.exchanger.exchange_code(&code, &verifier, &redirect_uri).await?;

        // 5. Refresh-token cookie, then session installation.
        if let Some(refresh_token) = &tokens.refresh_token {
            self.cookies.set_cookie(
                REFRESH_TOKEN_COOKIE,
                refresh_token,
                self.config.refresh_cookie_max_age,
                self.config.https,
            );
        }
        self.session.set_access_token(&tokens.access_token)?;
        info!("callback completed, session installed");

        // 6. Pending password change wins over reconciliation.
        if self.ephemeral.remove(MUST_CHANGE_PASSWORD_KEY).is_some() {
            let target =
                RouteTarget { path: self.config.change_password_route.clone(), clear_saved: false };
            self.routes.navigate_to(&target).await;
            return Ok(CallbackOutcome::ChangePassword);
        }

        // 7. Invite reconciliation; a mismatch delays the redirect so the
        //    user can read the warning.
        let warning = self.reconcile_invite();
        if warning.is_some() {
            tokio::time::sleep(self.config.mismatch_grace).await;
        }

        // 8. Saved pre-authentication route, else the default landing route.
        let target = self.routes.post_login_target();
        self.routes.navigate_to(&target).await;

        Ok(CallbackOutcome::Redirected { target: target.path, warning })
    }
}

impl std::fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandler").field("mode", &self.config.mode).finish()
    }
}
