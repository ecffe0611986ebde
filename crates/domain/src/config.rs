//! Identity provider configuration
//!
//! `AuthConfig` is supplied once when the session manager is built and never
//! changes afterwards. Realm URLs follow the Keycloak layout:
//!
//! ```text
//! issuer     = {frontend_url}/realms/{realm}
//! discovery  = {issuer}/.well-known/openid-configuration
//! userinfo   = {issuer}/protocol/openid-connect/userinfo
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_REDIRECT_PORT, DEFAULT_SCOPE, DISCOVERY_SUFFIX, REALMS_PATH, USERINFO_SUFFIX,
};
use crate::errors::{AuthError, Result};

/// Explicit authorization/token endpoint pair that bypasses discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

/// OIDC client configuration for a single realm.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth client identifier registered in the realm
    pub client_id: String,

    /// Redirect URI the identity provider sends the browser back to
    pub redirect_uri: String,

    /// Base URL of the identity provider frontend (e.g. `https://sso.example.com`)
    #[serde(default)]
    pub frontend_url: Option<String>,

    /// Explicit discovery document URL; wins over the derived one
    #[serde(default)]
    pub discovery_url: Option<String>,

    /// Realm name
    #[serde(default)]
    pub realm: String,

    /// Client secret for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub endpoints: Option<CustomEndpoints>,

    /// Port of the loopback listener receiving redirects
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,

    #[serde(default)]
    pub prefer_ephemeral_session: bool,

    /// Permit plain `http` identity provider URLs
    #[serde(default)]
    pub allow_insecure_connections: bool,
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_SCOPE.to_string()]
}

fn default_redirect_port() -> u16 {
    DEFAULT_REDIRECT_PORT
}

impl AuthConfig {
    /// Create a configuration addressing `{frontend_url}/realms/{realm}`.
    ///
    /// Remaining options take their defaults: scope `openid`, redirect port
    /// 10000, no client secret, TLS required.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        frontend_url: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            frontend_url: Some(frontend_url.into()),
            discovery_url: None,
            realm: realm.into(),
            client_secret: None,
            scopes: default_scopes(),
            endpoints: None,
            redirect_port: DEFAULT_REDIRECT_PORT,
            prefer_ephemeral_session: false,
            allow_insecure_connections: false,
        }
    }

    #[must_use]
    pub fn with_discovery_url(mut self, discovery_url: impl Into<String>) -> Self {
        self.discovery_url = Some(discovery_url.into());
        self
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.endpoints = Some(CustomEndpoints {
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
        });
        self
    }

    #[must_use]
    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    #[must_use]
    pub fn with_ephemeral_session(mut self, ephemeral: bool) -> Self {
        self.prefer_ephemeral_session = ephemeral;
        self
    }

    #[must_use]
    pub fn with_insecure_connections(mut self, allow: bool) -> Self {
        self.allow_insecure_connections = allow;
        self
    }

    /// Issuer URL of the realm.
    ///
    /// # Errors
    /// Returns `AuthError::Config` when neither a frontend URL nor a
    /// discovery URL is configured.
    pub fn issuer(&self) -> Result<String> {
        if let Some(frontend) = self.frontend_url.as_deref() {
            return Ok(format!("{}/{}/{}", frontend.trim_end_matches('/'), REALMS_PATH, self.realm));
        }

        match self.discovery_url.as_deref() {
            Some(discovery) => {
                let trimmed = discovery.trim_end_matches('/');
                Ok(trimmed.strip_suffix(DISCOVERY_SUFFIX).unwrap_or(trimmed).to_string())
            }
            None => Err(missing_location()),
        }
    }

    /// Discovery document URL, explicit or derived from the issuer.
    ///
    /// # Errors
    /// Returns `AuthError::Config` when no location is configured.
    pub fn discovery_url(&self) -> Result<String> {
        match self.discovery_url.as_deref() {
            Some(explicit) => Ok(explicit.to_string()),
            None => Ok(format!("{}{}", self.issuer()?, DISCOVERY_SUFFIX)),
        }
    }

    /// User-info endpoint of the realm.
    ///
    /// # Errors
    /// Returns `AuthError::Config` when no location is configured.
    pub fn userinfo_url(&self) -> Result<String> {
        Ok(format!("{}{}", self.issuer()?, USERINFO_SUFFIX))
    }

    /// Scopes as a space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Check the configuration before any operation uses it.
    ///
    /// # Errors
    /// Returns `AuthError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config("client_id must not be empty".into()));
        }

        if self.scopes.is_empty() {
            return Err(AuthError::Config("at least one scope is required".into()));
        }

        parse_url("redirect_uri", &self.redirect_uri)?;

        match (&self.frontend_url, &self.discovery_url) {
            (None, None) => return Err(missing_location()),
            (Some(_), _) if self.realm.trim().is_empty() => {
                return Err(AuthError::Config("realm must not be empty".into()));
            }
            _ => {}
        }

        let mut provider_urls: Vec<(&str, &str)> = Vec::new();
        if let Some(frontend) = self.frontend_url.as_deref() {
            provider_urls.push(("frontend_url", frontend));
        }
        if let Some(discovery) = self.discovery_url.as_deref() {
            provider_urls.push(("discovery_url", discovery));
        }
        if let Some(endpoints) = &self.endpoints {
            provider_urls.push(("authorization_endpoint", &endpoints.authorization_endpoint));
            provider_urls.push(("token_endpoint", &endpoints.token_endpoint));
        }

        for (field, value) in provider_urls {
            let url = parse_url(field, value)?;
            if url.scheme() != "https" && !self.allow_insecure_connections {
                return Err(AuthError::Config(format!(
                    "{field} uses insecure scheme '{}' (set allow_insecure_connections to permit)",
                    url.scheme()
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("frontend_url", &self.frontend_url)
            .field("discovery_url", &self.discovery_url)
            .field("realm", &self.realm)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .field("endpoints", &self.endpoints)
            .field("redirect_port", &self.redirect_port)
            .field("prefer_ephemeral_session", &self.prefer_ephemeral_session)
            .field("allow_insecure_connections", &self.allow_insecure_connections)
            .finish()
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| AuthError::Config(format!("invalid {field} '{value}': {e}")))
}

fn missing_location() -> AuthError {
    AuthError::Config("either frontend_url or discovery_url must be configured".into())
}
