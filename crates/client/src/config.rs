//! Flow configuration
//!
//! [`FlowConfig`] carries the deployment-time knobs for the coordinator:
//! which initiation variant to use, fixed paths, timing windows, and the
//! origin used to compute the redirect URI. [`ProviderMetadata`] is the
//! shape advertised by the public config endpoint in direct PKCE mode.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{FlowError, FlowResult};

/// How authorization is initiated for this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// The browser drives the PKCE handshake itself
    DirectPkce,
    /// A backend-for-frontend performs the PKCE/state choreography; the
    /// client only navigates to the backend login path
    Bff,
}

/// Deployment configuration for the authorization flow
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Initiation variant
    pub mode: DeploymentMode,

    /// Current origin (scheme + host + port), used to compute the redirect
    /// URI for the token exchange
    pub origin: String,

    /// Whether the page is served over HTTPS (controls the `secure` cookie
    /// attribute)
    pub https: bool,

    /// Public endpoint advertising OAuth parameters (direct mode only)
    pub config_endpoint: String,

    /// Token endpoint for the authorization-code exchange (direct mode only)
    pub token_endpoint: String,

    /// Fixed callback path under the current origin
    pub callback_path: String,

    /// Backend login path (BFF mode only)
    pub bff_login_path: String,

    /// Route of the change-password flow for native-provider invites
    pub change_password_route: String,

    /// Default authenticated landing route
    pub default_route: String,

    /// First-party API prefix that receives the bearer header
    pub api_prefix: String,

    /// Renewal window: the renewal timer fires this long before token expiry
    pub refresh_window: Duration,

    /// Grace period before redirecting after an invite email mismatch, so the
    /// user can read the warning
    pub mismatch_grace: Duration,

    /// Lifetime of the refresh-token cookie
    pub refresh_cookie_max_age: Duration,
}

impl FlowConfig {
    /// Create a configuration with the reference defaults for `origin`
    #[must_use]
    pub fn new(mode: DeploymentMode, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        let https = origin.starts_with("https://");
        Self {
            mode,
            origin,
            https,
            config_endpoint: "/api/oauth-config".to_string(),
            token_endpoint: "/oauth2/token".to_string(),
            callback_path: "/authorize/callback".to_string(),
            bff_login_path: "/auth/login".to_string(),
            change_password_route: "/change-password".to_string(),
            default_route: "/accounts".to_string(),
            api_prefix: "/api/".to_string(),
            refresh_window: Duration::from_secs(300),
            mismatch_grace: Duration::from_secs(10),
            refresh_cookie_max_age: Duration::from_secs(86_400),
        }
    }

    /// Redirect URI for the token exchange: current origin plus the fixed
    /// callback path
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), self.callback_path)
    }
}

/// OAuth parameters advertised by the public config endpoint (direct mode)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    /// OAuth client id of the frontend
    pub client_id: String,

    /// Redirect URI registered for this client
    pub redirect_uri: String,

    /// Authorization endpoint to send the browser to
    pub authorization_endpoint: String,

    /// Scope to request, space-delimited
    pub scope: String,
}

/// Fetch the server-advertised OAuth parameters
///
/// # Errors
/// Returns [`FlowError::Http`] on transport failure and
/// [`FlowError::Config`] when the endpoint answers with a non-success
/// status.
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    endpoint: &str,
) -> FlowResult<ProviderMetadata> {
    let response = http.get(endpoint).send().await?;
    if !response.status().is_success() {
        return Err(FlowError::Config(format!(
            "config endpoint {endpoint} answered {}",
            response.status()
        )));
    }

    let metadata: ProviderMetadata = response.json().await?;
    debug!(client_id = %metadata.client_id, "fetched provider metadata");
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    //! Unit tests for config.
    use super::*;

    #[test]
    fn test_redirect_uri_joins_origin_and_callback_path() {
        let config = FlowConfig::new(DeploymentMode::DirectPkce, "https://app.example.com");
        assert_eq!(config.redirect_uri(), "https://app.example.com/authorize/callback");

        let trailing = FlowConfig::new(DeploymentMode::DirectPkce, "https://app.example.com/");
        assert_eq!(trailing.redirect_uri(), "https://app.example.com/authorize/callback");
    }

    #[test]
    fn test_https_detection() {
        assert!(FlowConfig::new(DeploymentMode::Bff, "https://app.example.com").https);
        assert!(!FlowConfig::new(DeploymentMode::Bff, "http://localhost:4200").https);
    }

    #[test]
    fn test_provider_metadata_shape() {
        let metadata: ProviderMetadata = serde_json::from_value(serde_json::json!({
            "client_id": "frontend",
            "redirect_uri": "http://localhost:4200/authorize/callback",
            "authorization_endpoint": "http://localhost:9000/oauth2/authorize",
            "scope": "openid profile"
        }))
        .expect("deserialization failed");

        assert_eq!(metadata.client_id, "frontend");
        assert_eq!(metadata.scope, "openid profile");
    }
}
