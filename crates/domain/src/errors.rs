//! Error types used throughout the session client

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Realmkey
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session manager has not been initialized")]
    NotInitialized,

    #[error("Another session operation is already in progress")]
    Busy,

    #[error("Not authenticated (no access token)")]
    NotAuthenticated,

    #[error("Authorization agent error: {0}")]
    Agent(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token decode error: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Precondition violations are returned to callers instead of being
    /// folded into an operation outcome.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::Busy)
    }
}

/// Result type alias for Realmkey operations
pub type Result<T> = std::result::Result<T, AuthError>;
