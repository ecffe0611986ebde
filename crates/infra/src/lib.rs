//! # Realmkey Infrastructure
//!
//! Infrastructure implementations of the session core ports.
//!
//! This crate contains:
//! - OIDC authorization-code agent (discovery, PKCE, loopback redirect)
//! - HTTP client with retries, user-info client
//! - Keychain and file-backed storage
//! - JWT claim decoding and connectivity probing
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `realmkey-core`
//! - Depends on `realmkey-domain` and `realmkey-core`
//! - Contains all "impure" code (I/O, platform APIs)

pub mod bootstrap;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod http;
pub mod jwt;
pub mod observability;
pub mod oidc;
pub mod storage;

// Re-export commonly used items
pub use bootstrap::{build_session_manager, SessionManagerBuilder};
pub use connectivity::TcpConnectivityProbe;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder, ReqwestUserInfoClient, RetryPolicy};
pub use jwt::JwtTokenDecoder;
pub use oidc::{BrowserLauncher, OidcAuthorizationAgent, SystemBrowser};
pub use storage::{FilePreferenceStore, KeychainSecureStore};
