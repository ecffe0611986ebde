//! Loopback HTTP server that receives browser redirects.
//!
//! Listens on `127.0.0.1:{port}` for the first request to the redirect path
//! and hands its query parameters to the waiting flow. Port `0` binds an
//! ephemeral port (see [`LoopbackCallbackServer::port`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use realmkey_domain::{AuthError, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Signed In</title></head>
<body><h1>Done</h1><p>You can close this window and return to the application.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Sign-In Failed</title></head>
<body><h1>Sign-In Failed</h1><p>The identity provider returned an error. You can close this window.</p></body>
</html>"#;

/// Query parameters of a redirect back from the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    fn from_query(mut query: HashMap<String, String>) -> Self {
        Self {
            code: query.remove("code"),
            state: query.remove("state"),
            error: query.remove("error"),
            error_description: query.remove("error_description"),
        }
    }

    /// Fail if the provider redirected with an error (e.g. `access_denied`
    /// when the user cancels).
    ///
    /// # Errors
    /// `AuthError::Agent` carrying the error code and description.
    pub fn ensure_no_error(&self) -> Result<()> {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => {
                Err(AuthError::Agent(format!("{error}: {description}")))
            }
            (Some(error), None) => Err(AuthError::Agent(error.clone())),
            _ => Ok(()),
        }
    }

    /// Extract the authorization code after checking the CSRF state.
    ///
    /// # Errors
    /// `AuthError::Agent` on a provider error or state mismatch and
    /// `AuthError::InvalidResponse` when no code was delivered.
    pub fn into_code(self, expected_state: &str) -> Result<String> {
        self.ensure_no_error()?;

        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::Agent("authorization state mismatch".into()));
        }

        self.code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("redirect carried no authorization code".into()))
    }
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Single-use loopback redirect receiver.
pub struct LoopbackCallbackServer {
    port: u16,
    receiver: Option<oneshot::Receiver<CallbackParams>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackCallbackServer {
    /// Start listening on `127.0.0.1:{port}` for requests to `path`.
    ///
    /// # Errors
    /// `AuthError::Network` if the port cannot be bound.
    pub async fn start(port: u16, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|err| {
            AuthError::Network(format!("failed to bind loopback redirect server: {err}"))
        })?;

        let port = listener
            .local_addr()
            .map_err(|err| AuthError::Network(format!("failed to determine port: {err}")))?
            .port();

        let (callback_tx, receiver) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(callback_tx)));

        let route = if path.is_empty() { "/" } else { path };
        let app = Router::new().route(
            route,
            get(move |query: Query<HashMap<String, String>>| handle_redirect(query, slot.clone())),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("Loopback redirect server error: {}", err);
            }
        });

        debug!(port, path = %route, "Loopback redirect server listening");

        Ok(Self {
            port,
            receiver: Some(receiver),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Await the redirect with a timeout.
    ///
    /// # Errors
    /// `AuthError::Agent` on timeout (the user never finished in the
    /// browser) or when called twice.
    pub async fn wait_for_callback(&mut self, timeout: Duration) -> Result<CallbackParams> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| AuthError::Internal("redirect already consumed".into()))?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::Internal("loopback redirect server stopped".into())),
            Err(_) => Err(AuthError::Agent("timed out waiting for the browser redirect".into())),
        }
    }

    /// Shut down the loopback server gracefully.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    return Err(AuthError::Internal(format!(
                        "loopback redirect server panicked: {err}"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Drop for LoopbackCallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_redirect(
    Query(query): Query<HashMap<String, String>>,
    slot: CallbackSlot,
) -> Html<&'static str> {
    let params = CallbackParams::from_query(query);
    let page = if params.error.is_some() { FAILURE_PAGE } else { SUCCESS_PAGE };

    // Only the first redirect counts; later hits (favicon retries, reloads)
    // just get the page.
    if let Some(sender) = slot.lock().take() {
        let _ = sender.send(params);
    }

    Html(page)
}
