//! PKCE (Proof Key for Code Exchange) and CSRF-state generation
//!
//! Implements RFC 7636 for authorization flows that cannot hold a client
//! secret. The verifier/challenge pair binds the authorization request to the
//! client that later redeems the code; the state value round-trips through
//! the authorization server for CSRF protection.
//!
//! Randomness comes from the operating system. If the OS random source is
//! unavailable the generators fail, and callers must abort the flow before
//! any redirect occurs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Minimum verifier entropy in bytes (43 chars once base64url-encoded)
pub const VERIFIER_MIN_BYTES: usize = 32;

/// Maximum verifier entropy in bytes (128 chars once base64url-encoded)
pub const VERIFIER_MAX_BYTES: usize = 96;

/// Default verifier entropy: 32 bytes, 43 encoded characters
pub const DEFAULT_VERIFIER_BYTES: usize = 32;

/// Minimum state entropy in bytes
pub const STATE_MIN_BYTES: usize = 16;

/// Default state entropy: 32 bytes, 43 encoded characters
pub const DEFAULT_STATE_BYTES: usize = 32;

/// Errors from PKCE/state generation
#[derive(Debug, Error)]
pub enum PkceError {
    /// The OS random source failed or is unavailable
    #[error("secure randomness unavailable: {0}")]
    RandomSource(String),

    /// Requested entropy is outside the supported range
    #[error("requested entropy of {requested} bytes is outside {min}..={max}")]
    EntropyOutOfRange {
        /// Bytes requested by the caller
        requested: usize,
        /// Lower bound in bytes
        min: usize,
        /// Upper bound in bytes
        max: usize,
    },
}

fn random_urlsafe(len_bytes: usize) -> Result<String, PkceError> {
    let mut buf = vec![0u8; len_bytes];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| PkceError::RandomSource(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Generate a cryptographically secure code verifier
///
/// Produces `len_bytes` of OS randomness, base64url-encoded without padding.
/// Per RFC 7636 the encoded verifier must be 43-128 characters, so
/// `len_bytes` must fall within [`VERIFIER_MIN_BYTES`]..=[`VERIFIER_MAX_BYTES`].
///
/// # Errors
/// Returns an error if `len_bytes` is out of range or the OS random source
/// is unavailable.
pub fn generate_verifier(len_bytes: usize) -> Result<String, PkceError> {
    if !(VERIFIER_MIN_BYTES..=VERIFIER_MAX_BYTES).contains(&len_bytes) {
        return Err(PkceError::EntropyOutOfRange {
            requested: len_bytes,
            min: VERIFIER_MIN_BYTES,
            max: VERIFIER_MAX_BYTES,
        });
    }
    random_urlsafe(len_bytes)
}

/// Derive the code challenge from a verifier
///
/// Per RFC 7636 the challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`,
/// without padding. Deterministic: the same verifier always yields the same
/// challenge.
#[must_use]
pub fn derive_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state token for CSRF protection
///
/// Same generator as the verifier, reused for the anti-CSRF token. At least
/// [`STATE_MIN_BYTES`] bytes of entropy are required.
///
/// # Errors
/// Returns an error if `len_bytes` is below the minimum or the OS random
/// source is unavailable.
pub fn generate_state(len_bytes: usize) -> Result<String, PkceError> {
    if len_bytes < STATE_MIN_BYTES {
        return Err(PkceError::EntropyOutOfRange {
            requested: len_bytes,
            min: STATE_MIN_BYTES,
            max: usize::MAX,
        });
    }
    random_urlsafe(len_bytes)
}

/// PKCE parameters for one authorization attempt
///
/// Created per attempt, persisted only in short-lived tab-scoped storage,
/// and destroyed after one round trip through the authorization server.
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Random string (43-128 chars, base64url). Kept secret until the token
    /// exchange.
    pub code_verifier: String,

    /// SHA-256 of the verifier, base64url-encoded. Sent in the authorization
    /// request for server-side validation.
    pub code_challenge: String,

    /// Random CSRF-protection token; must match exactly between the
    /// authorization request and the callback.
    pub state: String,
}

impl PkceParams {
    /// Generate a fresh verifier/challenge/state triple with default entropy
    ///
    /// # Errors
    /// Returns an error if the OS random source is unavailable.
    pub fn generate() -> Result<Self, PkceError> {
        let code_verifier = generate_verifier(DEFAULT_VERIFIER_BYTES)?;
        let code_challenge = derive_challenge(&code_verifier);
        let state = generate_state(DEFAULT_STATE_BYTES)?;

        Ok(Self { code_verifier, code_challenge, state })
    }

    /// The challenge method (always `"S256"`)
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for pkce.
    use super::*;

    #[test]
    fn test_generate_params() {
        let params = PkceParams::generate().expect("generation failed");

        assert!(params.code_verifier.len() >= 43, "verifier too short");
        assert!(params.code_verifier.len() <= 128, "verifier too long");
        assert!(!params.code_challenge.is_empty());
        assert!(!params.state.is_empty());
        assert_eq!(params.challenge_method(), "S256");
    }

    #[test]
    fn test_unique_across_generations() {
        let a = PkceParams::generate().expect("generation failed");
        let b = PkceParams::generate().expect("generation failed");

        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.code_challenge, b.code_challenge);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn test_challenge_is_deterministic() {
        let params = PkceParams::generate().expect("generation failed");
        assert_eq!(params.code_challenge, derive_challenge(&params.code_verifier));
        assert_eq!(derive_challenge("fixed-input"), derive_challenge("fixed-input"));
    }

    #[test]
    fn test_base64url_without_padding() {
        let params = PkceParams::generate().expect("generation failed");

        for value in [&params.code_verifier, &params.code_challenge, &params.state] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    #[test]
    fn test_entropy_bounds() {
        assert!(matches!(
            generate_verifier(8),
            Err(PkceError::EntropyOutOfRange { requested: 8, .. })
        ));
        assert!(matches!(
            generate_verifier(200),
            Err(PkceError::EntropyOutOfRange { requested: 200, .. })
        ));
        assert!(matches!(generate_state(4), Err(PkceError::EntropyOutOfRange { .. })));

        // 96 bytes encodes to exactly 128 chars
        let longest = generate_verifier(VERIFIER_MAX_BYTES).expect("generation failed");
        assert_eq!(longest.len(), 128);
    }

    #[test]
    fn test_known_challenge_vector() {
        // RFC 7636 appendix B test vector
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(derive_challenge(verifier), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }
}
