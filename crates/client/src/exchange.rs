//! Authorization-code exchange
//!
//! POSTs the form-encoded `authorization_code` grant to the token endpoint
//! and parses the standard token response (RFC 6749). The exchange is the
//! only network call the callback handler makes, and it happens strictly
//! after CSRF validation and the one-time removal of the stored PKCE
//! material.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::FlowConfig;
use crate::error::{FlowError, FlowResult};

/// Token response from the authorization server
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// JWT access token
    pub access_token: String,

    /// Token type (always `Bearer`)
    pub token_type: String,

    /// Access-token lifetime in seconds
    pub expires_in: i64,

    /// Refresh token, when the server issues one
    pub refresh_token: Option<String>,

    /// Granted scope, space-delimited
    pub scope: Option<String>,
}

/// OAuth error body from the token endpoint (RFC 6749 §5.2)
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    error_description: Option<String>,
}

/// Seam for the code-for-tokens exchange
///
/// Abstracted so the callback handler can be exercised without a live token
/// endpoint.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    /// Redeem an authorization code
    ///
    /// # Errors
    /// Returns [`FlowError::Exchange`] when the endpoint answers non-2xx and
    /// [`FlowError::Http`] on transport failure.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> FlowResult<TokenResponse>;
}

/// HTTP client for the token endpoint
#[derive(Debug, Clone)]
pub struct TokenEndpointClient {
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
}

impl TokenEndpointClient {
    /// Create a client for `token_endpoint`, exchanging on behalf of
    /// `client_id`
    ///
    /// # Errors
    /// Returns [`FlowError::Http`] if the underlying HTTP client cannot be
    /// built (TLS backend initialization failure).
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> FlowResult<Self> {
        let http =
            reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        Ok(Self { http, token_endpoint: token_endpoint.into(), client_id: client_id.into() })
    }

    /// Create a client for the token endpoint configured in `config`
    ///
    /// # Errors
    /// Returns [`FlowError::Http`] if the underlying HTTP client cannot be
    /// built.
    pub fn for_flow(config: &FlowConfig, client_id: impl Into<String>) -> FlowResult<Self> {
        Self::new(config.token_endpoint.clone(), client_id)
    }

    /// The configured token endpoint
    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }
}

#[async_trait]
impl CodeExchanger for TokenEndpointClient {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> FlowResult<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let response = self.http.post(&self.token_endpoint).form(&form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {description}", err.error),
                    None => err.error,
                },
                Err(_) => body,
            };
            warn!(status = status.as_u16(), "token exchange rejected");
            return Err(FlowError::Exchange { status: status.as_u16(), message });
        }

        let tokens: TokenResponse = response.json().await?;
        debug!(expires_in = tokens.expires_in, "token exchange completed");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for exchange.
    use super::*;

    #[test]
    fn test_token_response_shape() {
        let tokens: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "jwt",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "scope": "openid profile"
        }))
        .expect("deserialization failed");

        assert_eq!(tokens.access_token, "jwt");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(tokens.expires_in, 3_600);
    }

    #[test]
    fn test_token_response_without_optional_fields() {
        let tokens: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "jwt",
            "token_type": "Bearer",
            "expires_in": 900
        }))
        .expect("deserialization failed");

        assert!(tokens.refresh_token.is_none());
        assert!(tokens.scope.is_none());
    }

    #[test]
    fn test_client_keeps_endpoint() {
        let client = TokenEndpointClient::new("http://localhost:9000/oauth2/token", "frontend")
            .expect("client build failed");
        assert_eq!(client.token_endpoint(), "http://localhost:9000/oauth2/token");
    }

    #[test]
    fn test_client_from_flow_config() {
        use crate::config::DeploymentMode;

        let mut config = FlowConfig::new(DeploymentMode::DirectPkce, "http://localhost:4200");
        config.token_endpoint = "http://localhost:9000/oauth2/token".to_string();

        let client = TokenEndpointClient::for_flow(&config, "frontend")
            .expect("client build failed");
        assert_eq!(client.token_endpoint(), "http://localhost:9000/oauth2/token");
    }
}
