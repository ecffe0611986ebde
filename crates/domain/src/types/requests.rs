//! Requests handed to an authorization agent
//!
//! Built from an [`AuthConfig`] so the agent never needs the configuration
//! itself.

use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, CustomEndpoints};
use crate::constants::PROMPT_LOGIN;
use crate::errors::Result;

/// Where the agent finds the realm's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLocation {
    pub issuer: String,
    pub discovery_url: String,
    /// Custom authorize/token pair; skips discovery for those two endpoints
    pub endpoints: Option<CustomEndpoints>,
    pub allow_insecure_connections: bool,
}

impl ProviderLocation {
    /// # Errors
    /// Returns `AuthError::Config` when no issuer location is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Ok(Self {
            issuer: config.issuer()?,
            discovery_url: config.discovery_url()?,
            endpoints: config.endpoints.clone(),
            allow_insecure_connections: config.allow_insecure_connections,
        })
    }
}

/// Interactive authorization-code exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub provider: ProviderLocation,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub redirect_port: u16,
    pub scopes: Vec<String>,
    pub prompt: Option<String>,
    pub prefer_ephemeral_session: bool,
}

impl AuthorizationRequest {
    /// Login request with the forced `login` prompt.
    ///
    /// # Errors
    /// Returns `AuthError::Config` when no issuer location is configured.
    pub fn login(config: &AuthConfig) -> Result<Self> {
        Ok(Self {
            provider: ProviderLocation::from_config(config)?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            redirect_port: config.redirect_port,
            scopes: config.scopes.clone(),
            prompt: Some(PROMPT_LOGIN.to_string()),
            prefer_ephemeral_session: config.prefer_ephemeral_session,
        })
    }
}

/// Silent refresh-token grant (no UI, no prompt).
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub provider: ProviderLocation,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub refresh_token: String,
}

impl TokenRequest {
    /// # Errors
    /// Returns `AuthError::Config` when no issuer location is configured.
    pub fn refresh(config: &AuthConfig, refresh_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            provider: ProviderLocation::from_config(config)?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            refresh_token: refresh_token.into(),
        })
    }
}

/// End-session (RP-initiated logout) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndSessionRequest {
    pub provider: ProviderLocation,
    pub client_id: String,
    pub id_token_hint: Option<String>,
    pub post_logout_redirect_uri: String,
    pub redirect_port: u16,
    pub prefer_ephemeral_session: bool,
}

impl EndSessionRequest {
    /// # Errors
    /// Returns `AuthError::Config` when no issuer location is configured.
    pub fn new(config: &AuthConfig, id_token_hint: Option<String>) -> Result<Self> {
        Ok(Self {
            provider: ProviderLocation::from_config(config)?,
            client_id: config.client_id.clone(),
            id_token_hint,
            post_logout_redirect_uri: config.redirect_uri.clone(),
            redirect_port: config.redirect_port,
            prefer_ephemeral_session: config.prefer_ephemeral_session,
        })
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}
