//! # Realmkey Core
//!
//! Session logic for an OAuth2/OIDC authorization-code client - no
//! infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the browser agent, storage, JWT decoding,
//!   reachability and HTTP
//! - The [`SessionManager`] token-lifecycle state machine
//! - The broadcast [`AuthStateChannel`]
//!
//! ## Architecture Principles
//! - Only depends on `realmkey-domain`
//! - No keychain, HTTP, or browser code
//! - All external dependencies via traits

pub mod session;

pub use session::ports::{
    AuthorizationAgent, ConnectivityProbe, PreferenceStore, SecureStore, TokenDecoder,
    UserInfoClient,
};
pub use session::{
    AuthStateChannel, AuthStateStream, ErrorSink, SessionCollaborators, SessionManager,
    TracingErrorSink,
};
