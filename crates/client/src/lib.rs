//! Client-side coordinator for the OAuth 2.0 authorization code flow with
//! PKCE.
//!
//! The crate owns everything between "the user clicked sign in" and "the
//! app holds an authenticated session": PKCE and CSRF material generation,
//! the redirect to the authorization server (directly or via a
//! backend-for-frontend), the callback validation and code exchange, access
//! token decoding and in-memory session state with expiry-driven renewal,
//! restoration of the route the user was on before authenticating, and the
//! smaller satellites around that path (invite reconciliation, consent
//! caching, bearer-header augmentation for first-party API calls).
//!
//! Browser-facing effects go through narrow seams ([`routes::Navigator`],
//! [`storage::EphemeralStorage`], [`storage::DurableStorage`],
//! [`storage::CookieSink`]) so the whole flow runs and tests in-process.
//!
//! # Flow at a glance
//!
//! ```text
//! initiate ── redirect ──> authorization server
//!                               │ callback?code&state
//!                               v
//! callback: error? ─ state check ─ consume verifier ─ exchange ─ session
//!                               │
//!                               v
//!            change-password / invite reconciliation / route restoration
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod bearer;
pub mod callback;
pub mod config;
pub mod consent;
pub mod error;
pub mod exchange;
pub mod initiate;
pub mod invite;
pub mod pkce;
pub mod routes;
pub mod session;
pub mod storage;
pub mod testing;
pub mod token;

pub use bearer::BearerAugmenter;
pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams, ReconciliationWarning};
pub use config::{DeploymentMode, FlowConfig, ProviderMetadata};
pub use consent::ConsentCache;
pub use error::{FlowError, FlowResult};
pub use exchange::{CodeExchanger, TokenEndpointClient, TokenResponse};
pub use initiate::{initiator_for, AuthorizationInitiator, BffInitiator, DirectPkceInitiator};
pub use invite::{AuthProvider, InviteData};
pub use pkce::PkceParams;
pub use routes::{Navigator, RouteRestorer, RouteTarget};
pub use session::{DropToAnonymous, RenewalStrategy, SessionStore};
pub use storage::{CookieSink, DurableStorage, EphemeralStorage, MemoryStorage};
pub use token::SessionClaims;
