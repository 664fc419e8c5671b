//! Invite-token decoding
//!
//! Administrator-issued invite links carry a base64 token that pre-fills
//! sign-in credentials for a new user. The decoded payload lives in
//! short-lived storage between invite-link activation and the
//! post-authentication reconciliation step, and is cleared unconditionally
//! once reconciliation runs.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity provider an invite was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Password-based account on the authorization server
    Native,
    /// Federated Google sign-in
    Google,
}

/// Errors from decoding an invite token
#[derive(Debug, Error)]
pub enum InviteError {
    /// Token is not valid base64
    #[error("invite token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded token is not a valid invite payload
    #[error("invite token is not a valid payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decoded invite payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteData {
    /// Provider the invited account uses
    #[serde(rename = "authProvider")]
    pub auth_provider: AuthProvider,

    /// Email the invite was issued for
    pub email: String,

    /// Pre-provisioned password (native provider only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl InviteData {
    /// Decode a base64 invite token
    ///
    /// Accepts standard and url-safe alphabets; invite links travel through
    /// both query strings and copy-paste.
    ///
    /// # Errors
    /// Returns [`InviteError`] when the token is not base64 or not a valid
    /// payload.
    pub fn decode(token: &str) -> Result<Self, InviteError> {
        let bytes = match STANDARD.decode(token) {
            Ok(bytes) => bytes,
            Err(_) => URL_SAFE_NO_PAD.decode(token.trim_end_matches('='))?,
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encode as a base64 token (used by admin tooling and tests)
    ///
    /// # Errors
    /// Returns [`InviteError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, InviteError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Whether the invite was issued for `email`
    ///
    /// Email comparison is case-insensitive.
    #[must_use]
    pub fn matches_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }
}
