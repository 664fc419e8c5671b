//! Authorization initiation
//!
//! Two variants of "begin authorization", selected by deployment mode:
//!
//! - **Direct PKCE**: fetch the server-advertised OAuth parameters, generate
//!   PKCE material, stash verifier and state in short-lived storage, and
//!   send the browser to the authorization endpoint.
//! - **BFF**: send the browser to a fixed backend login path; the backend
//!   performs the whole PKCE/state choreography and the client never holds
//!   PKCE material.
//!
//! Both implement one [`AuthorizationInitiator`] contract rather than
//! branching inside a single function.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{fetch_provider_metadata, DeploymentMode, FlowConfig, ProviderMetadata};
use crate::error::{FlowError, FlowResult};
use crate::pkce::PkceParams;
use crate::routes::Navigator;
use crate::storage::{EphemeralStorage, STATE_KEY, VERIFIER_KEY};

/// Contract for beginning the authorization flow
#[async_trait]
pub trait AuthorizationInitiator: Send + Sync {
    /// Start the flow, ending in a browser navigation away from the app
    ///
    /// # Errors
    /// Returns an error if PKCE material cannot be generated, the config
    /// fetch fails, or the navigation cannot be started. No redirect is
    /// attempted after a failure.
    async fn begin_authorization(&self) -> FlowResult<()>;
}

/// Build the authorization URL with the standard code-flow query parameters
#[must_use]
pub fn build_authorization_url(metadata: &ProviderMetadata, params: &PkceParams) -> String {
    let query = [
        ("response_type", "code"),
        ("client_id", metadata.client_id.as_str()),
        ("redirect_uri", metadata.redirect_uri.as_str()),
        ("scope", metadata.scope.as_str()),
        ("state", params.state.as_str()),
        ("code_challenge", params.code_challenge.as_str()),
        ("code_challenge_method", params.challenge_method()),
    ]
    .iter()
    .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
    .collect::<Vec<_>>()
    .join("&");

    format!("{}?{query}", metadata.authorization_endpoint)
}

/// Direct PKCE initiation: the browser drives the handshake
pub struct DirectPkceInitiator {
    config: FlowConfig,
    http: reqwest::Client,
    ephemeral: Arc<dyn EphemeralStorage>,
    navigator: Arc<dyn Navigator>,
}

impl DirectPkceInitiator {
    /// Create an initiator fetching parameters from
    /// `config.config_endpoint`
    ///
    /// # Errors
    /// Returns [`FlowError::Http`] if the underlying HTTP client cannot be
    /// built (TLS backend initialization failure).
    pub fn new(
        config: FlowConfig,
        ephemeral: Arc<dyn EphemeralStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> FlowResult<Self> {
        let http =
            reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        Ok(Self { config, http, ephemeral, navigator })
    }
}

#[async_trait]
impl AuthorizationInitiator for DirectPkceInitiator {
    async fn begin_authorization(&self) -> FlowResult<()> {
        let metadata = fetch_provider_metadata(&self.http, &self.config.config_endpoint).await?;

        // RNG failure aborts here, before anything is stored or redirected.
        let params = PkceParams::generate()?;

        self.ephemeral.set(VERIFIER_KEY, &params.code_verifier);
        self.ephemeral.set(STATE_KEY, &params.state);

        let url = build_authorization_url(&metadata, &params);
        info!(endpoint = %metadata.authorization_endpoint, "redirecting to authorization server");

        match self.navigator.navigate(&url).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(FlowError::Navigation("router declined redirect".to_string())),
            Err(e) => Err(FlowError::Navigation(e.to_string())),
        }
    }
}

/// BFF initiation: the backend owns the handshake
pub struct BffInitiator {
    config: FlowConfig,
    navigator: Arc<dyn Navigator>,
}

impl BffInitiator {
    /// Create an initiator redirecting to `config.bff_login_path`
    #[must_use]
    pub fn new(config: FlowConfig, navigator: Arc<dyn Navigator>) -> Self {
        Self { config, navigator }
    }
}

#[async_trait]
impl AuthorizationInitiator for BffInitiator {
    async fn begin_authorization(&self) -> FlowResult<()> {
        info!(path = %self.config.bff_login_path, "redirecting to backend login");
        match self.navigator.navigate(&self.config.bff_login_path).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(FlowError::Navigation("router declined redirect".to_string())),
            Err(e) => Err(FlowError::Navigation(e.to_string())),
        }
    }
}

/// Select the initiator variant for a deployment
///
/// # Errors
/// Returns [`FlowError::Http`] if the direct-mode HTTP client cannot be
/// built.
pub fn initiator_for(
    config: FlowConfig,
    ephemeral: Arc<dyn EphemeralStorage>,
    navigator: Arc<dyn Navigator>,
) -> FlowResult<Arc<dyn AuthorizationInitiator>> {
    Ok(match config.mode {
        DeploymentMode::DirectPkce => {
            Arc::new(DirectPkceInitiator::new(config, ephemeral, navigator)?)
        }
        DeploymentMode::Bff => Arc::new(BffInitiator::new(config, navigator)),
    })
}

#[cfg(test)]
mod tests {
    //! Unit tests for initiate.
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::RecordingNavigator;

    fn test_metadata() -> ProviderMetadata {
        serde_json::from_value(serde_json::json!({
            "client_id": "frontend",
            "redirect_uri": "http://localhost:4200/authorize/callback",
            "authorization_endpoint": "http://localhost:9000/oauth2/authorize",
            "scope": "openid profile"
        }))
        .expect("metadata")
    }

    #[test]
    fn test_authorization_url_parameters() {
        let params = PkceParams::generate().expect("generation failed");
        let url = build_authorization_url(&test_metadata(), &params);

        assert!(url.starts_with("http://localhost:9000/oauth2/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=frontend"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A4200%2Fauthorize%2Fcallback"));
        assert!(url.contains("scope=openid%20profile"));
        assert!(url.contains(&format!("state={}", params.state)));
        assert!(url.contains(&format!("code_challenge={}", params.code_challenge)));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn test_bff_initiator_navigates_to_login_path() {
        let config = FlowConfig::new(DeploymentMode::Bff, "http://localhost:4200");
        let navigator = Arc::new(RecordingNavigator::at("/"));
        let initiator = BffInitiator::new(config, Arc::clone(&navigator) as Arc<dyn Navigator>);

        initiator.begin_authorization().await.expect("begin failed");
        assert_eq!(navigator.visits(), vec!["/auth/login"]);
    }

    #[tokio::test]
    async fn test_bff_initiator_surfaces_navigation_failure() {
        let config = FlowConfig::new(DeploymentMode::Bff, "http://localhost:4200");
        let navigator = Arc::new(RecordingNavigator::at("/"));
        navigator.fail_next("window gone");
        let initiator = BffInitiator::new(config, Arc::clone(&navigator) as Arc<dyn Navigator>);

        let result = initiator.begin_authorization().await;
        assert!(matches!(result, Err(FlowError::Navigation(_))));
    }

    #[test]
    fn test_initiator_selection_by_mode() {
        let ephemeral = Arc::new(MemoryStorage::new()) as Arc<dyn EphemeralStorage>;
        let navigator = Arc::new(RecordingNavigator::at("/")) as Arc<dyn Navigator>;

        // Both modes resolve to an initiator; behavior is covered above and
        // in the integration suite.
        let direct = FlowConfig::new(DeploymentMode::DirectPkce, "http://localhost:4200");
        let bff = FlowConfig::new(DeploymentMode::Bff, "http://localhost:4200");
        initiator_for(direct, Arc::clone(&ephemeral), Arc::clone(&navigator))
            .expect("direct initiator");
        initiator_for(bff, ephemeral, navigator).expect("bff initiator");
    }
}
