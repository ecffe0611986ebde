//! Browser launching

use async_trait::async_trait;
use realmkey_domain::{AuthError, Result};
use tracing::{debug, info};

/// Opens URLs for the user to complete interactive flows.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`. `ephemeral` asks for a session that shares no cookies
    /// with the user's normal browsing, where the launcher can provide one.
    async fn open(&self, url: &str, ephemeral: bool) -> Result<()>;
}

/// Launches the user's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn open(&self, url: &str, ephemeral: bool) -> Result<()> {
        if ephemeral {
            debug!("System browser cannot provide an ephemeral session; using the default profile");
        }

        let target = url.to_string();
        tokio::task::spawn_blocking(move || open::that(target))
            .await
            .map_err(|err| AuthError::Internal(format!("browser launch task failed: {err}")))?
            .map_err(|err| AuthError::Agent(format!("failed to open browser: {err}")))?;

        info!("Opened system browser for sign-in");
        Ok(())
    }
}
