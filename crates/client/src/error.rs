//! Flow-level error taxonomy
//!
//! Terminal errors produced while driving the authorization-code flow.
//! Module-specific errors (`PkceError`, `TokenCodecError`, ...) compose into
//! [`FlowError`] rather than duplicating variants.
//!
//! Protocol and CSRF errors are handled locally at the callback handler: they
//! become user-visible state and halt the flow. They are never converted into
//! panics, and the short-lived storage cleanup on those paths is
//! unconditional.

use thiserror::Error;

use crate::pkce::PkceError;
use crate::token::TokenCodecError;

/// Standard result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Terminal errors for the authorization flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// The authorization server returned `error` (and optionally
    /// `error_description`) on the callback. Shown verbatim to the user,
    /// keeping the machine-readable code for support purposes.
    #[error("authorization server returned `{code}`: {}", description.as_deref().unwrap_or("(no description)"))]
    Protocol {
        /// Machine-readable OAuth error code (RFC 6749 §4.1.2.1)
        code: String,
        /// Optional human-readable description from the server
        description: Option<String>,
    },

    /// The `state` parameter was missing or did not match the stored value.
    /// Possible cross-site request forgery against the callback.
    #[error("state validation failed (possible CSRF): {reason}")]
    Csrf {
        /// Why validation failed (missing vs. mismatched)
        reason: String,
    },

    /// The token endpoint rejected the code exchange
    #[error("token exchange failed (status {status}): {message}")]
    Exchange {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Message surfaced from the response body when available
        message: String,
    },

    /// The access token could not be decoded; the session never transitions
    /// to authenticated.
    #[error(transparent)]
    MalformedToken(#[from] TokenCodecError),

    /// PKCE material could not be generated; the flow aborts before any
    /// redirect occurs.
    #[error(transparent)]
    Pkce(#[from] PkceError),

    /// HTTP transport failure (config fetch or token exchange)
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Browser navigation could not be started
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    #[test]
    fn test_protocol_error_keeps_machine_code() {
        let err = FlowError::Protocol {
            code: "access_denied".to_string(),
            description: Some("user cancelled".to_string()),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("access_denied"));
        assert!(rendered.contains("user cancelled"));
    }

    #[test]
    fn test_protocol_error_without_description() {
        let err = FlowError::Protocol { code: "server_error".to_string(), description: None };
        assert!(err.to_string().contains("(no description)"));
    }

    #[test]
    fn test_csrf_error_names_csrf() {
        let err = FlowError::Csrf { reason: "state missing from storage".to_string() };
        assert!(err.to_string().contains("CSRF"));
    }
}
