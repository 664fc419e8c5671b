//! Authenticated request augmentation
//!
//! Attaches `Authorization: Bearer <jwt>` to outgoing first-party API calls,
//! scoped strictly to the application's own API prefix. The token and
//! authorization endpoints themselves, and anything else outside the prefix,
//! never receive the header.

use std::sync::Arc;

use crate::config::FlowConfig;
use crate::session::SessionStore;

/// Bearer-header augmenter for first-party API calls
#[derive(Debug, Clone)]
pub struct BearerAugmenter {
    session: Arc<SessionStore>,
    api_prefix: String,
}

impl BearerAugmenter {
    /// Create an augmenter reading tokens from `session` and applying to
    /// paths under `api_prefix`
    #[must_use]
    pub fn new(session: Arc<SessionStore>, api_prefix: impl Into<String>) -> Self {
        Self { session, api_prefix: api_prefix.into() }
    }

    /// Create an augmenter scoped to the API prefix configured in `config`
    #[must_use]
    pub fn for_flow(session: Arc<SessionStore>, config: &FlowConfig) -> Self {
        Self::new(session, config.api_prefix.clone())
    }

    /// Whether `path` is a first-party API path
    #[must_use]
    pub fn applies_to(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }

    /// The `Authorization` header value for `path`, if one should be sent
    ///
    /// `None` for paths outside the API prefix and for anonymous sessions.
    #[must_use]
    pub fn header_value(&self, path: &str) -> Option<String> {
        if !self.applies_to(path) {
            return None;
        }
        self.session.jwt().map(|jwt| format!("Bearer {jwt}"))
    }

    /// Attach the bearer header to a request when applicable
    #[must_use]
    pub fn authorize(&self, path: &str, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.applies_to(path) {
            if let Some(jwt) = self.session.jwt() {
                return request.bearer_auth(jwt);
            }
        }
        request
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for bearer.
    use std::time::Duration;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    use super::*;
    use crate::session::DropToAnonymous;

    fn authenticated_session() -> Arc<SessionStore> {
        let store = SessionStore::new(Arc::new(DropToAnonymous), Duration::from_secs(300));
        let payload = serde_json::json!({
            "sub": "user-1",
            "exp": chrono::Utc::now().timestamp() + 3_600,
        });
        let jwt = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload.to_string()),
        );
        store.set_access_token(&jwt).expect("set failed");
        store
    }

    #[tokio::test]
    async fn test_header_only_under_api_prefix() {
        let augmenter = BearerAugmenter::new(authenticated_session(), "/api/");

        let header = augmenter.header_value("/api/accounts").expect("header");
        assert!(header.starts_with("Bearer "));

        assert!(augmenter.header_value("/oauth2/token").is_none());
        assert!(augmenter.header_value("/assets/logo.svg").is_none());
        // Prefix match is strict: "/apiary" is not "/api/".
        assert!(augmenter.header_value("/apiary").is_none());
    }

    #[tokio::test]
    async fn test_prefix_comes_from_flow_config() {
        let mut config =
            FlowConfig::new(crate::config::DeploymentMode::Bff, "http://localhost:4200");
        config.api_prefix = "/backend/".to_string();
        let augmenter = BearerAugmenter::for_flow(authenticated_session(), &config);

        assert!(augmenter.header_value("/backend/accounts").is_some());
        assert!(augmenter.header_value("/api/accounts").is_none());
    }

    #[tokio::test]
    async fn test_no_header_for_anonymous_session() {
        let session = SessionStore::new(Arc::new(DropToAnonymous), Duration::from_secs(300));
        let augmenter = BearerAugmenter::new(session, "/api/");

        assert!(augmenter.header_value("/api/accounts").is_none());
    }

    #[tokio::test]
    async fn test_no_header_after_sign_out() {
        let session = authenticated_session();
        let augmenter = BearerAugmenter::new(Arc::clone(&session), "/api/");
        assert!(augmenter.header_value("/api/accounts").is_some());

        session.sign_out();
        assert!(augmenter.header_value("/api/accounts").is_none());
    }
}
