//! Port interfaces for the session manager
//!
//! These traits define the boundaries between the token-lifecycle state
//! machine and the platform: browser-driven OAuth flows, credential storage,
//! preferences, JWT inspection, reachability and HTTP.

use async_trait::async_trait;
use realmkey_domain::{
    AuthorizationRequest, DecodedToken, EndSessionRequest, Result, TokenRequest, TokenResult,
};
use serde_json::{Map, Value};

/// Runs OAuth/OIDC protocol exchanges on behalf of the session manager.
#[async_trait]
pub trait AuthorizationAgent: Send + Sync {
    /// Interactive authorization-code flow followed by the code exchange.
    ///
    /// # Errors
    /// Returns `AuthError::Agent` on cancellation or protocol failure and
    /// `AuthError::Network` on transport failure.
    async fn authorize_and_exchange_code(
        &self,
        request: AuthorizationRequest,
    ) -> Result<TokenResult>;

    /// Silent token-endpoint exchange (refresh-token grant, no UI).
    async fn token(&self, request: TokenRequest) -> Result<TokenResult>;

    /// RP-initiated logout at the identity provider.
    async fn end_session(&self, request: EndSessionRequest) -> Result<()>;
}

/// Secure credential storage (platform keychain or equivalent).
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every value this store owns.
    async fn delete_all(&self) -> Result<()>;
}

/// Small non-secret flag storage.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;
}

/// JWT inspection. Decoding only; no signature verification.
pub trait TokenDecoder: Send + Sync {
    /// # Errors
    /// Returns `AuthError::Decode` when the input is not a readable JWT.
    fn decode(&self, jwt: &str) -> Result<DecodedToken>;
}

/// Network reachability check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn has_network(&self) -> bool;
}

/// Authenticated GET returning a JSON object.
#[async_trait]
pub trait UserInfoClient: Send + Sync {
    async fn get_json(&self, url: &str, bearer_token: &str) -> Result<Map<String, Value>>;
}
