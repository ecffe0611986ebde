//! # Realmkey Domain
//!
//! Domain types for the Realmkey OIDC session client.
//!
//! This crate contains:
//! - Realm configuration (`AuthConfig`) and derived endpoint URLs
//! - Token types (`TokenResult`, `TokenSet`, `DecodedToken`)
//! - The observable `AuthState`
//! - Requests handed to authorization agents
//! - Error types and the `Result` alias
//!
//! ## Architecture
//! - No dependencies on other Realmkey crates
//! - Pure data and validation, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
