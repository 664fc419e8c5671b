//! Access-token codec
//!
//! Decodes the compact JWT-shaped access token into a [`SessionClaims`]
//! record and answers expiry questions. The codec performs **no** signature
//! verification: claims are read for display and client-side gating only,
//! never as a trust boundary for server-side decisions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from decoding an access token
#[derive(Debug, Error)]
pub enum TokenCodecError {
    /// The token does not have exactly three dot-separated segments
    #[error("malformed token: expected 3 segments, found {0}")]
    SegmentCount(usize),

    /// The claims segment is not valid base64url
    #[error("malformed token: claims segment is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The claims segment is not a valid claims record
    #[error("malformed token: claims segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity and authorization claims decoded from the access token
///
/// `is_authenticated` is derived, never part of the wire token: it is `true`
/// iff the record came from [`decode`], and `false` for the anonymous
/// sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Token issuer
    #[serde(default)]
    pub iss: String,

    /// Subject identifier
    #[serde(default)]
    pub sub: String,

    /// Group/role memberships
    #[serde(default)]
    pub groups: Vec<String>,

    /// Email address
    #[serde(default)]
    pub email: String,

    /// Whether the email address has been verified
    #[serde(default)]
    pub email_verified: bool,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Granted scope, space-delimited; treated as a set via [`Self::has_scope`]
    #[serde(default)]
    pub scope: String,

    /// Issued-at, seconds since epoch
    #[serde(default)]
    pub iat: i64,

    /// Expiry, seconds since epoch. Must be in the future for the session to
    /// be considered valid.
    #[serde(default)]
    pub exp: i64,

    /// OAuth client the token was issued to
    #[serde(default)]
    pub client_id: String,

    /// Token identifier
    #[serde(default, rename = "jti")]
    pub token_id: String,

    /// Principal name
    #[serde(default, rename = "preferred_username")]
    pub principal: String,

    /// Derived flag: true iff this record was decoded from a real token
    #[serde(skip)]
    pub is_authenticated: bool,
}

impl SessionClaims {
    /// The anonymous sentinel: initial state and the state after sign-out.
    /// Never authenticated.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether the granted scope set contains `scope`
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|granted| granted == scope)
    }

    /// Whether the token expired strictly before `now` (seconds since epoch).
    /// The boundary `exp == now` is not expired.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.exp < now
    }

    /// Whether the token expires within `window` seconds of `now`
    #[must_use]
    pub fn is_about_to_expire(&self, now: i64, window: i64) -> bool {
        self.exp < now + window
    }
}

/// Decode a JWT-shaped access token into claims
///
/// Splits on `.`, base64url-decodes the middle segment, and parses it as a
/// claims record. Unknown claims are ignored; missing optional claims take
/// their default values. No signature verification is performed.
///
/// # Errors
/// Returns [`TokenCodecError`] if the token does not have exactly three
/// dot-separated segments or the middle segment is not valid encoded JSON.
pub fn decode(token: &str) -> Result<SessionClaims, TokenCodecError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenCodecError::SegmentCount(segments.len()));
    }

    // Tolerate padded encoders; JWT base64url is unpadded by convention.
    let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let mut claims: SessionClaims = serde_json::from_slice(&payload)?;
    claims.is_authenticated = true;

    Ok(claims)
}
