//! Network reachability probe

use std::time::Duration;

use async_trait::async_trait;
use realmkey_core::ConnectivityProbe;
use realmkey_domain::{AuthConfig, AuthError, Result};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::errors::to_auth;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Reports the network as available when a TCP connection to the identity
/// provider can be opened within the timeout.
#[derive(Debug, Clone)]
pub struct TcpConnectivityProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnectivityProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, timeout: DEFAULT_TIMEOUT }
    }

    /// Probe the host serving the realm's issuer.
    ///
    /// # Errors
    /// `AuthError::Config` when the issuer URL has no host.
    pub fn for_config(config: &AuthConfig) -> Result<Self> {
        let issuer = Url::parse(&config.issuer()?).map_err(to_auth)?;
        let host = issuer
            .host_str()
            .ok_or_else(|| AuthError::Config("issuer URL missing host".into()))?;
        let port = issuer.port_or_known_default().unwrap_or(443);

        Ok(Self::new(host, port))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ConnectivityProbe for TcpConnectivityProbe {
    async fn has_network(&self) -> bool {
        let attempt = TcpStream::connect((self.host.as_str(), self.port));
        let reachable = matches!(tokio::time::timeout(self.timeout, attempt).await, Ok(Ok(_)));
        debug!(host = %self.host, port = self.port, reachable, "Connectivity probe");
        reachable
    }
}
