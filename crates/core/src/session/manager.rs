//! Session manager: the token-lifecycle state machine
//!
//! Owns the realm configuration, the in-memory [`TokenSet`], and the
//! [`AuthStateChannel`]. Orchestrates initialization, interactive login,
//! silent refresh and logout through the collaborator ports.
//!
//! ## State transitions
//!
//! ```text
//!                    ┌───────────── update_token ──────────────┐
//!                    │                                         ▼
//! Unauthenticated ─► Pending ─► Authenticated | Unauthenticated | Unavailable
//!                    ▲                                         │
//!                    └──────── login / logout / initialize ────┘
//! ```
//!
//! Every accepted mutating call emits `Pending` exactly once followed by one
//! terminal state. Overlapping calls are rejected with `AuthError::Busy`.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use realmkey_domain::constants::{HAS_RUN_BEFORE_KEY, REFRESH_TOKEN_KEY};
use realmkey_domain::{
    AuthConfig, AuthError, AuthState, AuthorizationRequest, EndSessionRequest, Result,
    TokenRequest, TokenResult, TokenSet,
};
use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error_sink::{ErrorSink, TracingErrorSink};
use super::ports::{
    AuthorizationAgent, ConnectivityProbe, PreferenceStore, SecureStore, TokenDecoder,
    UserInfoClient,
};
use super::state_channel::{AuthStateChannel, AuthStateStream};

/// Wait before re-checking when no token set is held
const IDLE_RECHECK: std::time::Duration = std::time::Duration::from_secs(60);
/// Wait after a failed or non-authenticating background refresh
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(60);
/// Floor between two consecutive background refresh attempts
const MIN_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Collaborators the session manager drives.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub agent: Arc<dyn AuthorizationAgent>,
    pub secure_store: Arc<dyn SecureStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub decoder: Arc<dyn TokenDecoder>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub user_info: Arc<dyn UserInfoClient>,
}

/// OIDC session manager for a single realm.
///
/// Build one per application in the composition root and share it as
/// `Arc<SessionManager>`.
pub struct SessionManager {
    config: AuthConfig,
    collaborators: SessionCollaborators,
    tokens: RwLock<Option<TokenSet>>,
    initialized: AtomicBool,
    state: AuthStateChannel,
    error_sink: RwLock<Arc<dyn ErrorSink>>,
    operation: AsyncMutex<()>,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// # Errors
    /// Returns `AuthError::Config` when the configuration is invalid.
    pub fn new(config: AuthConfig, collaborators: SessionCollaborators) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            collaborators,
            tokens: RwLock::new(None),
            initialized: AtomicBool::new(false),
            state: AuthStateChannel::new(),
            error_sink: RwLock::new(Arc::new(TracingErrorSink)),
            operation: AsyncMutex::new(()),
            auto_refresh: Mutex::new(None),
        })
    }

    /// Replace the error sink.
    pub fn set_error_sink(&self, sink: Arc<dyn ErrorSink>) {
        *self.error_sink.write() = sink;
    }

    /// Restore the default `tracing` error sink.
    pub fn reset_error_sink(&self) {
        self.set_error_sink(Arc::new(TracingErrorSink));
    }

    /// Prepare storage and restore any previous session.
    ///
    /// On the very first run (persisted flag absent) the secure store is
    /// purged so credentials left by an earlier install are never reused.
    /// The silent refresh that follows reports failures through the error
    /// sink; they are not returned.
    ///
    /// # Errors
    /// Returns `AuthError::Busy` if another operation is in progress.
    pub async fn initialize(&self) -> Result<AuthState> {
        let _guard = self.begin_operation()?;

        if let Err(err) = self.reset_storage_on_first_run().await {
            self.initialized.store(false, Ordering::SeqCst);
            self.state.emit(AuthState::Pending);
            *self.tokens.write() = None;
            self.state.emit(AuthState::Unauthenticated);
            self.report("Failed to prepare secure storage", &err);
            return Ok(AuthState::Unauthenticated);
        }

        self.initialized.store(true, Ordering::SeqCst);

        match self.refresh_locked(Duration::zero()).await {
            Ok(state) => {
                info!(state = %state, "Session manager initialized");
                Ok(state)
            }
            Err(err) => {
                // refresh_locked already forced Unauthenticated
                self.initialized.store(false, Ordering::SeqCst);
                self.report("Failed to restore session during initialization", &err);
                Ok(AuthState::Unauthenticated)
            }
        }
    }

    /// Run the interactive login flow.
    ///
    /// Returns `true` iff a valid token set was obtained. Agent and storage
    /// failures (including user cancellation) are reported through the
    /// error sink and yield `false`.
    ///
    /// # Errors
    /// Returns `AuthError::NotInitialized` before [`initialize`](Self::initialize)
    /// and `AuthError::Busy` if another operation is in progress.
    pub async fn login(&self) -> Result<bool> {
        self.ensure_initialized()?;
        let _guard = self.begin_operation()?;

        self.state.emit(AuthState::Pending);
        info!("Starting interactive login");

        match self.run_login().await {
            Ok(state) => Ok(state == AuthState::Authenticated),
            Err(err) => {
                *self.tokens.write() = None;
                self.state.emit(AuthState::Unauthenticated);
                self.report("Login failed", &err);
                Ok(false)
            }
        }
    }

    /// End the session at the identity provider and locally.
    ///
    /// All-or-nothing: on failure the stored credentials and in-memory
    /// tokens are kept and the state reverts to `Authenticated`.
    ///
    /// # Errors
    /// Returns `AuthError::NotInitialized` before [`initialize`](Self::initialize)
    /// and `AuthError::Busy` if another operation is in progress.
    pub async fn logout(&self) -> Result<bool> {
        self.ensure_initialized()?;
        let _guard = self.begin_operation()?;

        self.state.emit(AuthState::Pending);
        info!("Starting logout");

        match self.run_logout().await {
            Ok(()) => {
                *self.tokens.write() = None;
                self.state.emit(AuthState::Unauthenticated);
                info!("Logged out");
                Ok(true)
            }
            Err(err) => {
                self.state.emit(AuthState::Authenticated);
                self.report("Logout failed", &err);
                Ok(false)
            }
        }
    }

    /// Silently refresh the session from the stored refresh token.
    ///
    /// `lookahead` treats a refresh token expiring within that window as
    /// already expired. Absent or expiring credentials yield
    /// `Unauthenticated` without any network call; an offline probe yields
    /// `Unavailable` and leaves the current tokens untouched.
    ///
    /// # Errors
    /// Returns `NotInitialized`/`Busy` on precondition violations, and any
    /// storage or agent failure after forcing `Unauthenticated`. The held
    /// token set is kept in that case.
    pub async fn update_token(&self, lookahead: Duration) -> Result<AuthState> {
        self.ensure_initialized()?;
        let _guard = self.begin_operation()?;
        self.refresh_locked(lookahead).await
    }

    /// [`update_token`](Self::update_token) with no lookahead.
    ///
    /// # Errors
    /// See [`update_token`](Self::update_token).
    pub async fn refresh(&self) -> Result<AuthState> {
        self.update_token(Duration::zero()).await
    }

    /// Fetch the user-info claims of the current session.
    ///
    /// Transport or parse failures are reported through the error sink and
    /// yield `Ok(None)`.
    ///
    /// # Errors
    /// Returns `AuthError::NotInitialized` before [`initialize`](Self::initialize).
    pub async fn get_user_info(&self) -> Result<Option<Map<String, Value>>> {
        self.ensure_initialized()?;

        match self.fetch_user_info().await {
            Ok(claims) => Ok(Some(claims)),
            Err(err) => {
                self.report("Failed to fetch user info", &err);
                Ok(None)
            }
        }
    }

    /// Current access token, usable as a bearer credential
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.access_token.clone())
    }

    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.id_token.clone())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.read().as_ref().and_then(|t| t.refresh_token.clone())
    }

    /// Whether a token set is held and its access token is unexpired now.
    #[must_use]
    pub fn has_valid_tokens(&self) -> bool {
        self.tokens.read().as_ref().is_some_and(TokenSet::is_valid)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn current_state(&self) -> AuthState {
        self.state.current()
    }

    /// Observe authentication state: the current value first, then every
    /// transition in order.
    #[must_use]
    pub fn subscribe(&self) -> AuthStateStream {
        self.state.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start the background refresh task, replacing a running one.
    ///
    /// The task sleeps until the access token is within `lookahead` of
    /// expiry, then calls [`update_token`](Self::update_token). Without a
    /// held token set it re-checks every minute and refreshes once a usable
    /// refresh token is stored, so an offline start or a failed refresh
    /// recovers on its own. The task only holds a weak reference and ends
    /// when the manager is dropped. Requires a tokio runtime.
    pub fn spawn_auto_refresh(self: &Arc<Self>, lookahead: Duration) {
        let manager = Arc::downgrade(self);
        let handle = tokio::spawn(Self::auto_refresh_loop(manager, lookahead));

        if let Some(previous) = self.auto_refresh.lock().replace(handle) {
            previous.abort();
        }
        info!(lookahead_secs = lookahead.num_seconds(), "Auto-refresh started");
    }

    /// Stop the background refresh task if running.
    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.auto_refresh.lock().take() {
            handle.abort();
            info!("Auto-refresh stopped");
        }
    }

    #[must_use]
    pub fn is_auto_refresh_running(&self) -> bool {
        self.auto_refresh.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn auto_refresh_loop(manager: Weak<Self>, lookahead: Duration) {
        let mut floor = std::time::Duration::ZERO;

        loop {
            let Some(delay) = manager.upgrade().map(|m| m.next_refresh_delay(lookahead)) else {
                break;
            };
            let delay = delay.max(floor);
            debug!(delay_secs = delay.as_secs(), "Auto-refresh sleeping");
            tokio::time::sleep(delay).await;

            let Some(session) = manager.upgrade() else {
                break;
            };
            floor = session.auto_refresh_tick(lookahead).await;
        }

        debug!("Session manager dropped; auto-refresh exiting");
    }

    /// One background attempt. Returns the minimum wait before the next one.
    async fn auto_refresh_tick(&self, lookahead: Duration) -> std::time::Duration {
        if !self.is_initialized() {
            return std::time::Duration::ZERO;
        }
        let holds_tokens = self.tokens.read().is_some();
        if !holds_tokens && !self.has_usable_refresh_token(lookahead).await {
            return std::time::Duration::ZERO;
        }

        match self.update_token(lookahead).await {
            Ok(AuthState::Authenticated) => {
                debug!("Auto-refresh renewed tokens");
                MIN_REFRESH_INTERVAL
            }
            Ok(state) => {
                warn!(state = %state, "Auto-refresh did not renew tokens");
                RETRY_DELAY
            }
            Err(AuthError::Busy) => {
                debug!("Auto-refresh skipped; operation in progress");
                MIN_REFRESH_INTERVAL
            }
            Err(err) => {
                error!(error = %err, "Auto-refresh failed");
                RETRY_DELAY
            }
        }
    }

    async fn has_usable_refresh_token(&self, lookahead: Duration) -> bool {
        match self.collaborators.secure_store.read(REFRESH_TOKEN_KEY).await {
            Ok(Some(token)) => self
                .collaborators
                .decoder
                .decode(&token)
                .is_ok_and(|decoded| !decoded.will_expire(lookahead)),
            Ok(None) => false,
            Err(err) => {
                debug!(error = %err, "Auto-refresh could not read the stored refresh token");
                false
            }
        }
    }

    fn next_refresh_delay(&self, lookahead: Duration) -> std::time::Duration {
        match self.tokens.read().as_ref() {
            Some(tokens) => (tokens.access_token_expires_at - lookahead - chrono::Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO),
            None => IDLE_RECHECK,
        }
    }

    async fn run_login(&self) -> Result<AuthState> {
        let request = AuthorizationRequest::login(&self.config)?;
        let result = self.collaborators.agent.authorize_and_exchange_code(request).await?;
        self.apply_token_result(result).await
    }

    async fn run_logout(&self) -> Result<()> {
        let request = EndSessionRequest::new(&self.config, self.id_token())?;
        self.collaborators.agent.end_session(request).await?;
        self.collaborators.secure_store.delete_all().await
    }

    async fn fetch_user_info(&self) -> Result<Map<String, Value>> {
        let token = self.access_token().ok_or(AuthError::NotAuthenticated)?;
        let url = self.config.userinfo_url()?;
        self.collaborators.user_info.get_json(&url, &token).await
    }

    async fn reset_storage_on_first_run(&self) -> Result<()> {
        let has_run_before =
            self.collaborators.preferences.get_bool(HAS_RUN_BEFORE_KEY).await?.unwrap_or(false);

        if !has_run_before {
            info!("First run detected; purging secure storage");
            self.collaborators.secure_store.delete_all().await?;
            self.collaborators.preferences.set_bool(HAS_RUN_BEFORE_KEY, true).await?;
        }

        Ok(())
    }

    /// Refresh with the operation guard already held. Emits `Pending` and
    /// exactly one terminal state, also on error.
    ///
    /// A collaborator error leaves the held token set alone: a still-valid
    /// access token stays usable and the stored refresh token can be retried.
    async fn refresh_locked(&self, lookahead: Duration) -> Result<AuthState> {
        self.state.emit(AuthState::Pending);

        match self.try_refresh(lookahead).await {
            Ok(state) => Ok(state),
            Err(err) => {
                self.state.emit(AuthState::Unauthenticated);
                Err(err)
            }
        }
    }

    async fn try_refresh(&self, lookahead: Duration) -> Result<AuthState> {
        let Some(refresh_token) = self.collaborators.secure_store.read(REFRESH_TOKEN_KEY).await?
        else {
            debug!("No stored refresh token");
            return Ok(self.finish_unauthenticated());
        };

        let expiring = match self.collaborators.decoder.decode(&refresh_token) {
            Ok(decoded) => decoded.will_expire(lookahead),
            Err(err) => {
                warn!(error = %err, "Stored refresh token is unreadable; treating as expired");
                true
            }
        };

        if expiring {
            info!("Stored refresh token expired; login required");
            return Ok(self.finish_unauthenticated());
        }

        if !self.collaborators.connectivity.has_network().await {
            info!("Network unavailable; keeping current session state");
            self.state.emit(AuthState::Unavailable);
            return Ok(AuthState::Unavailable);
        }

        let request = TokenRequest::refresh(&self.config, refresh_token)?;
        let result = self.collaborators.agent.token(request).await?;
        self.apply_token_result(result).await
    }

    /// Adopt an agent result: persist and authenticate when usable,
    /// otherwise drop to `Unauthenticated` with a diagnostic.
    async fn apply_token_result(&self, result: TokenResult) -> Result<AuthState> {
        let Some(tokens) = result.into_token_set().filter(TokenSet::is_valid) else {
            warn!("Invalid token response");
            return Ok(self.finish_unauthenticated());
        };

        if let Some(refresh_token) = tokens.refresh_token.as_deref() {
            self.collaborators.secure_store.write(REFRESH_TOKEN_KEY, refresh_token).await?;
            debug!("Refresh token persisted");
        }

        debug!(expires_in_secs = tokens.seconds_until_expiry(), "Token set replaced");
        *self.tokens.write() = Some(tokens);
        self.state.emit(AuthState::Authenticated);
        Ok(AuthState::Authenticated)
    }

    fn finish_unauthenticated(&self) -> AuthState {
        *self.tokens.write() = None;
        self.state.emit(AuthState::Unauthenticated);
        AuthState::Unauthenticated
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AuthError::NotInitialized)
        }
    }

    fn begin_operation(&self) -> Result<AsyncMutexGuard<'_, ()>> {
        self.operation.try_lock().map_err(|_| {
            debug!("Rejecting overlapping session operation");
            AuthError::Busy
        })
    }

    fn report(&self, message: &str, error: &AuthError) {
        let sink = Arc::clone(&*self.error_sink.read());
        sink.report(message, error, &Backtrace::capture());
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.auto_refresh.get_mut().take() {
            handle.abort();
        }
    }
}
