//! Shared test helpers for `realmkey-core` integration tests.
//!
//! In-memory implementations of every session port plus a harness that wires
//! them into a `SessionManager`, so tests can focus on behaviour instead of
//! boilerplate.

#![allow(dead_code)]

use std::backtrace::Backtrace;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use realmkey_core::{
    AuthStateStream, AuthorizationAgent, ConnectivityProbe, ErrorSink, PreferenceStore,
    SecureStore, SessionCollaborators, SessionManager, TokenDecoder, UserInfoClient,
};
use realmkey_domain::constants::{HAS_RUN_BEFORE_KEY, REFRESH_TOKEN_KEY};
use realmkey_domain::{
    AuthConfig, AuthError, AuthState, AuthorizationRequest, DecodedToken, EndSessionRequest,
    Result as DomainResult, TokenRequest, TokenResult,
};
use serde_json::{Map, Value};
use tokio::sync::Notify;

/// Token string the mock decoder reports as long-lived.
pub const FRESH_REFRESH_TOKEN: &str = "rt-fresh";
/// Token string the mock decoder reports as already expired.
pub const EXPIRED_REFRESH_TOKEN: &str = "rt-expired";
/// Token string the mock decoder cannot read.
pub const GARBLED_REFRESH_TOKEN: &str = "rt-garbled";
/// Refresh token returned by successful agent exchanges.
pub const ISSUED_REFRESH_TOKEN: &str = "rt-issued";

/// Test realm configuration.
pub fn test_config() -> AuthConfig {
    AuthConfig::new(
        "desktop-app",
        "http://127.0.0.1:10000/callback",
        "https://sso.example.com",
        "acme",
    )
}

/// Agent result carrying a full token set expiring in `expires_in` seconds.
pub fn token_result(expires_in: i64) -> TokenResult {
    TokenResult {
        access_token: Some(format!("at-{expires_in}")),
        id_token: Some("id-token".to_string()),
        refresh_token: Some(ISSUED_REFRESH_TOKEN.to_string()),
        access_token_expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
        scope: Some("openid".to_string()),
    }
}

/// Pauses an agent call until released, signalling when it was entered.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Scripted `AuthorizationAgent`.
#[derive(Default)]
pub struct MockAgent {
    authorize_results: Mutex<VecDeque<DomainResult<TokenResult>>>,
    token_results: Mutex<VecDeque<DomainResult<TokenResult>>>,
    end_session_results: Mutex<VecDeque<DomainResult<()>>>,
    pub authorize_calls: Mutex<Vec<AuthorizationRequest>>,
    pub token_calls: Mutex<Vec<TokenRequest>>,
    pub end_session_calls: Mutex<Vec<EndSessionRequest>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl MockAgent {
    pub fn push_authorize(&self, result: DomainResult<TokenResult>) {
        self.authorize_results.lock().push_back(result);
    }

    pub fn push_token(&self, result: DomainResult<TokenResult>) {
        self.token_results.lock().push_back(result);
    }

    pub fn push_end_session(&self, result: DomainResult<()>) {
        self.end_session_results.lock().push_back(result);
    }

    /// Hold the next agent call until `gate.release` is notified.
    pub fn install_gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn network_calls(&self) -> usize {
        self.authorize_calls.lock().len()
            + self.token_calls.lock().len()
            + self.end_session_calls.lock().len()
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl AuthorizationAgent for MockAgent {
    async fn authorize_and_exchange_code(
        &self,
        request: AuthorizationRequest,
    ) -> DomainResult<TokenResult> {
        self.authorize_calls.lock().push(request);
        self.pass_gate().await;
        self.authorize_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Agent("no scripted authorize result".into())))
    }

    async fn token(&self, request: TokenRequest) -> DomainResult<TokenResult> {
        self.token_calls.lock().push(request);
        self.pass_gate().await;
        self.token_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Agent("no scripted token result".into())))
    }

    async fn end_session(&self, request: EndSessionRequest) -> DomainResult<()> {
        self.end_session_calls.lock().push(request);
        self.pass_gate().await;
        self.end_session_results.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// In-memory `SecureStore` with injectable failures.
#[derive(Default)]
pub struct MemorySecureStore {
    values: Mutex<HashMap<String, String>>,
    pub fail_delete: AtomicBool,
    pub fail_write: AtomicBool,
    pub delete_calls: AtomicUsize,
}

impl MemorySecureStore {
    pub fn seed(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn read(&self, key: &str) -> DomainResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> DomainResult<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("keychain locked".into()));
        }
        self.seed(key, value);
        Ok(())
    }

    async fn delete_all(&self) -> DomainResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("keychain locked".into()));
        }
        self.values.lock().clear();
        Ok(())
    }
}

/// In-memory `PreferenceStore`.
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, bool>>,
    pub fail_reads: AtomicBool,
}

impl MemoryPreferences {
    pub fn mark_has_run_before(&self) {
        self.values.lock().insert(HAS_RUN_BEFORE_KEY.to_string(), true);
    }

    pub fn has_run_before(&self) -> bool {
        self.values.lock().get(HAS_RUN_BEFORE_KEY).copied().unwrap_or(false)
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn get_bool(&self, key: &str) -> DomainResult<Option<bool>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("preferences unreadable".into()));
        }
        Ok(self.values.lock().get(key).copied())
    }

    async fn set_bool(&self, key: &str, value: bool) -> DomainResult<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// Decoder that knows the fixture refresh tokens.
pub struct FixtureDecoder;

impl TokenDecoder for FixtureDecoder {
    fn decode(&self, jwt: &str) -> DomainResult<DecodedToken> {
        let expires_at: DateTime<Utc> = match jwt {
            FRESH_REFRESH_TOKEN | ISSUED_REFRESH_TOKEN => Utc::now() + Duration::days(30),
            EXPIRED_REFRESH_TOKEN => Utc::now() - Duration::minutes(5),
            _ => return Err(AuthError::Decode(format!("not a JWT: {jwt}"))),
        };
        Ok(DecodedToken { expires_at: Some(expires_at), claims: Map::new() })
    }
}

/// Switchable reachability.
pub struct MockConnectivity {
    pub online: AtomicBool,
}

impl Default for MockConnectivity {
    fn default() -> Self {
        Self { online: AtomicBool::new(true) }
    }
}

#[async_trait]
impl ConnectivityProbe for MockConnectivity {
    async fn has_network(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Scripted user-info endpoint.
#[derive(Default)]
pub struct MockUserInfo {
    response: Mutex<Option<DomainResult<Map<String, Value>>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockUserInfo {
    pub fn respond_with(&self, response: DomainResult<Map<String, Value>>) {
        *self.response.lock() = Some(response);
    }
}

#[async_trait]
impl UserInfoClient for MockUserInfo {
    async fn get_json(&self, url: &str, bearer_token: &str) -> DomainResult<Map<String, Value>> {
        self.calls.lock().push((url.to_string(), bearer_token.to_string()));
        self.response
            .lock()
            .take()
            .unwrap_or_else(|| Err(AuthError::Network("connection refused".into())))
    }
}

/// Error sink that records every report.
#[derive(Default)]
pub struct RecordingSink {
    pub reports: Mutex<Vec<(String, AuthError)>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, message: &str, error: &AuthError, _backtrace: &Backtrace) {
        self.reports.lock().push((message.to_string(), error.clone()));
    }
}

/// A session manager wired to in-memory collaborators.
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub agent: Arc<MockAgent>,
    pub store: Arc<MemorySecureStore>,
    pub preferences: Arc<MemoryPreferences>,
    pub connectivity: Arc<MockConnectivity>,
    pub user_info: Arc<MockUserInfo>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        let agent = Arc::new(MockAgent::default());
        let store = Arc::new(MemorySecureStore::default());
        let preferences = Arc::new(MemoryPreferences::default());
        let connectivity = Arc::new(MockConnectivity::default());
        let user_info = Arc::new(MockUserInfo::default());
        let sink = Arc::new(RecordingSink::default());

        let collaborators = SessionCollaborators {
            agent: agent.clone(),
            secure_store: store.clone(),
            preferences: preferences.clone(),
            decoder: Arc::new(FixtureDecoder),
            connectivity: connectivity.clone(),
            user_info: user_info.clone(),
        };

        let manager = Arc::new(
            SessionManager::new(test_config(), collaborators).expect("test config is valid"),
        );
        manager.set_error_sink(sink.clone());

        Self { manager, agent, store, preferences, connectivity, user_info, sink }
    }

    /// Harness that has run before, holding a usable stored refresh token,
    /// initialized offline so no agent call is consumed.
    pub async fn initialized() -> Self {
        let harness = Self::new();
        harness.preferences.mark_has_run_before();
        harness.connectivity.online.store(false, Ordering::SeqCst);
        harness.store.seed(REFRESH_TOKEN_KEY, FRESH_REFRESH_TOKEN);
        harness.manager.initialize().await.expect("initialize");
        harness.connectivity.online.store(true, Ordering::SeqCst);
        harness
    }

    /// Initialized harness that holds a live session.
    pub async fn authenticated() -> Self {
        let harness = Self::initialized().await;
        harness.agent.push_authorize(Ok(token_result(3600)));
        assert!(harness.manager.login().await.expect("login"));
        harness
    }
}

/// Take the next `count` states from a stream, failing on a stall.
pub async fn next_states(stream: &mut AuthStateStream, count: usize) -> Vec<AuthState> {
    let mut states = Vec::with_capacity(count);
    for _ in 0..count {
        let state = tokio::time::timeout(StdDuration::from_secs(1), stream.next())
            .await
            .expect("state stream stalled")
            .expect("state stream closed");
        states.push(state);
    }
    states
}

/// Assert that no further state arrives promptly.
pub async fn assert_quiet(stream: &mut AuthStateStream) {
    let next = tokio::time::timeout(StdDuration::from_millis(50), stream.next()).await;
    assert!(next.is_err(), "unexpected state emitted: {next:?}");
}
