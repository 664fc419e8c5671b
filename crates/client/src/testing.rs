//! Test doubles
//!
//! In-process fakes for the browser-facing seams (navigation, cookies) and
//! the token endpoint, shared by unit and integration tests. Each double
//! records what it was asked to do so tests can assert on the interaction,
//! not just the end state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;

use crate::error::{FlowError, FlowResult};
use crate::exchange::{CodeExchanger, TokenResponse};
use crate::routes::{NavigationError, Navigator};
use crate::storage::CookieSink;

/// Navigator double that records every navigation attempt
///
/// Successful navigations update the simulated current location; a queued
/// failure applies to the next attempt only.
#[derive(Debug)]
pub struct RecordingNavigator {
    location: Mutex<String>,
    visits: Mutex<Vec<String>>,
    fail_next: Mutex<Option<String>>,
    decline_next: Mutex<bool>,
}

impl RecordingNavigator {
    /// A navigator currently at `location`
    #[must_use]
    pub fn at(location: &str) -> Self {
        Self {
            location: Mutex::new(location.to_string()),
            visits: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            decline_next: Mutex::new(false),
        }
    }

    /// Every target passed to `navigate`, in order
    #[must_use]
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().clone()
    }

    /// Make the next `navigate` call return an error
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// Make the next `navigate` call resolve to `Ok(false)`
    pub fn decline_next(&self) {
        *self.decline_next.lock() = true;
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    fn current_location(&self) -> String {
        self.location.lock().clone()
    }

    async fn navigate(&self, target: &str) -> Result<bool, NavigationError> {
        self.visits.lock().push(target.to_string());

        if let Some(message) = self.fail_next.lock().take() {
            return Err(NavigationError(message));
        }
        if std::mem::take(&mut *self.decline_next.lock()) {
            return Ok(false);
        }

        *self.location.lock() = target.to_string();
        Ok(true)
    }
}

/// One cookie write captured by [`RecordingCookieSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Requested lifetime
    pub max_age: Duration,
    /// Whether the `Secure` attribute was requested
    pub secure: bool,
}

/// Cookie sink double that captures writes instead of touching a browser
#[derive(Debug, Default)]
pub struct RecordingCookieSink {
    cookies: Mutex<Vec<StoredCookie>>,
}

impl RecordingCookieSink {
    /// An empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured writes, in order
    #[must_use]
    pub fn cookies(&self) -> Vec<StoredCookie> {
        self.cookies.lock().clone()
    }
}

impl CookieSink for RecordingCookieSink {
    fn set_cookie(&self, name: &str, value: &str, max_age: Duration, secure: bool) {
        self.cookies.lock().push(StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            max_age,
            secure,
        });
    }
}

/// Arguments of one recorded exchange call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeCall {
    /// Authorization code
    pub code: String,
    /// PKCE code verifier
    pub code_verifier: String,
    /// Redirect URI echoed to the token endpoint
    pub redirect_uri: String,
}

enum ExchangeScript {
    Succeed(TokenResponse),
    Fail { status: u16, message: String },
}

/// Token-endpoint double with a scripted response
pub struct MockExchanger {
    script: ExchangeScript,
    calls: Mutex<Vec<ExchangeCall>>,
}

impl MockExchanger {
    /// An exchanger that returns `response` for every call
    #[must_use]
    pub fn succeeding_with(response: TokenResponse) -> Self {
        Self { script: ExchangeScript::Succeed(response), calls: Mutex::new(Vec::new()) }
    }

    /// An exchanger that returns a token carrying `access_token` and no
    /// refresh token
    #[must_use]
    pub fn issuing(access_token: &str) -> Self {
        Self::succeeding_with(TokenResponse {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3_600,
            refresh_token: None,
            scope: None,
        })
    }

    /// An exchanger that fails every call with an exchange error
    #[must_use]
    pub fn failing_with(status: u16, message: &str) -> Self {
        Self {
            script: ExchangeScript::Fail { status, message: message.to_string() },
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every recorded call, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ExchangeCall> {
        self.calls.lock().clone()
    }

    /// Number of exchange attempts
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl std::fmt::Debug for MockExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExchanger").field("calls", &self.call_count()).finish()
    }
}

#[async_trait]
impl CodeExchanger for MockExchanger {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> FlowResult<TokenResponse> {
        self.calls.lock().push(ExchangeCall {
            code: code.to_string(),
            code_verifier: code_verifier.to_string(),
            redirect_uri: redirect_uri.to_string(),
        });
        match &self.script {
            ExchangeScript::Succeed(response) => Ok(response.clone()),
            ExchangeScript::Fail { status, message } => {
                Err(FlowError::Exchange { status: *status, message: message.clone() })
            }
        }
    }
}

/// Build an unsigned JWT-shaped token from a claims object
///
/// Signature verification is the server's job; the client only decodes, so a
/// fixed dummy signature segment suffices.
#[must_use]
pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
    )
}

/// An unsigned JWT for `email` expiring `lifetime` from now
#[must_use]
pub fn jwt_for(email: &str, lifetime: Duration) -> String {
    let exp = chrono::Utc::now().timestamp() + i64::try_from(lifetime.as_secs()).unwrap_or(0);
    unsigned_jwt(&serde_json::json!({
        "iss": "http://localhost:9000",
        "sub": "user-1",
        "email": email,
        "email_verified": true,
        "name": "Test User",
        "scope": "openid profile",
        "exp": exp,
        "client_id": "frontend",
        "preferred_username": email,
    }))
}

/// Shorthand for wrapping a double in an [`Arc`]
#[must_use]
pub fn shared<T>(double: T) -> Arc<T> {
    Arc::new(double)
}
