//! Composition root wiring the default adapters into a [`SessionManager`].
//!
//! ```no_run
//! # async fn run() -> realmkey_domain::Result<()> {
//! let config = realmkey_infra::config::load()?;
//! let session = realmkey_infra::build_session_manager(config)?;
//! session.initialize().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use realmkey_core::{
    AuthorizationAgent, ConnectivityProbe, PreferenceStore, SecureStore, SessionCollaborators,
    SessionManager, TokenDecoder, UserInfoClient,
};
use realmkey_domain::{AuthConfig, Result};
use tracing::info;

use crate::connectivity::TcpConnectivityProbe;
use crate::http::{HttpClient, ReqwestUserInfoClient};
use crate::jwt::JwtTokenDecoder;
use crate::oidc::{BrowserLauncher, OidcAuthorizationAgent, SystemBrowser};
use crate::storage::{FilePreferenceStore, KeychainSecureStore};

/// Build a session manager backed by the system browser, the OS keychain
/// and a per-user preferences file.
///
/// # Errors
/// `AuthError::Config` when the configuration is invalid.
pub fn build_session_manager(config: AuthConfig) -> Result<Arc<SessionManager>> {
    SessionManagerBuilder::new(config).build()
}

/// Builder for a [`SessionManager`] with selectively replaced adapters.
pub struct SessionManagerBuilder {
    config: AuthConfig,
    http: Option<HttpClient>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    callback_timeout: Option<Duration>,
    keychain_service: Option<String>,
    preferences_path: Option<PathBuf>,
    agent: Option<Arc<dyn AuthorizationAgent>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    user_info: Option<Arc<dyn UserInfoClient>>,
}

impl SessionManagerBuilder {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            http: None,
            browser: None,
            callback_timeout: None,
            keychain_service: None,
            preferences_path: None,
            agent: None,
            secure_store: None,
            preferences: None,
            decoder: None,
            connectivity: None,
            user_info: None,
        }
    }

    /// HTTP client shared by discovery, token and user-info calls.
    #[must_use]
    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    #[must_use]
    pub fn browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// How long the default agent waits for the browser redirect.
    #[must_use]
    pub fn callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = Some(timeout);
        self
    }

    /// Keychain service name the refresh token is stored under.
    #[must_use]
    pub fn keychain_service(mut self, service: impl Into<String>) -> Self {
        self.keychain_service = Some(service.into());
        self
    }

    #[must_use]
    pub fn preferences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn AuthorizationAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    #[must_use]
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    #[must_use]
    pub fn preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    #[must_use]
    pub fn token_decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn connectivity(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(probe);
        self
    }

    #[must_use]
    pub fn user_info_client(mut self, client: Arc<dyn UserInfoClient>) -> Self {
        self.user_info = Some(client);
        self
    }

    /// Validate the configuration and assemble the manager.
    ///
    /// # Errors
    /// `AuthError::Config` for an invalid configuration, or when the HTTP
    /// client cannot be constructed.
    pub fn build(self) -> Result<Arc<SessionManager>> {
        self.config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => HttpClient::new()?,
        };

        let agent = match self.agent {
            Some(agent) => agent,
            None => {
                let browser = self.browser.unwrap_or_else(|| Arc::new(SystemBrowser));
                let mut agent = OidcAuthorizationAgent::new(http.clone(), browser);
                if let Some(timeout) = self.callback_timeout {
                    agent = agent.with_callback_timeout(timeout);
                }
                Arc::new(agent)
            }
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => Arc::new(
                self.keychain_service.map(KeychainSecureStore::new).unwrap_or_default(),
            ),
        };

        let preferences = match self.preferences {
            Some(store) => store,
            None => Arc::new(match self.preferences_path {
                Some(path) => FilePreferenceStore::new(path),
                None => FilePreferenceStore::new_default(),
            }),
        };

        let connectivity = match self.connectivity {
            Some(probe) => probe,
            None => Arc::new(TcpConnectivityProbe::for_config(&self.config)?),
        };

        let collaborators = SessionCollaborators {
            agent,
            secure_store,
            preferences,
            decoder: self.decoder.unwrap_or_else(|| Arc::new(JwtTokenDecoder)),
            connectivity,
            user_info: self.user_info.unwrap_or_else(|| Arc::new(ReqwestUserInfoClient::new(http))),
        };

        info!(
            client_id = %self.config.client_id,
            realm = %self.config.realm,
            "session manager assembled"
        );

        Ok(Arc::new(SessionManager::new(self.config, collaborators)?))
    }
}
