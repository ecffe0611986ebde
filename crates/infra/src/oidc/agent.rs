//! OIDC authorization agent
//!
//! Implements the interactive authorization-code flow with PKCE (RFC 7636)
//! through the system browser and a loopback redirect, the refresh-token
//! grant, and RP-initiated logout.
//!
//! ## Flow
//! 1. Resolve endpoints (custom pair, or discovery)
//! 2. Bind the loopback redirect server
//! 3. Open the authorize URL with PKCE challenge, CSRF state and `prompt`
//! 4. Wait for the redirect, check state, exchange the code

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::{CsrfToken, PkceCodeChallenge};
use realmkey_core::AuthorizationAgent;
use realmkey_domain::{
    AuthError, AuthorizationRequest, EndSessionRequest, ProviderLocation, Result, TokenRequest,
    TokenResult,
};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::browser::BrowserLauncher;
use super::callback::LoopbackCallbackServer;
use super::discovery::DiscoveryClient;
use crate::errors::to_auth;
use crate::http::HttpClient;

const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
const PKCE_METHOD: &str = "S256";

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenEndpointResponse {
    fn into_result(self, issued_at: DateTime<Utc>) -> TokenResult {
        TokenResult {
            access_token: Some(self.access_token),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            access_token_expires_at: self
                .expires_in
                .map(|seconds| issued_at + chrono::Duration::seconds(seconds)),
            scope: self.scope,
        }
    }
}

/// Error response (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

struct Endpoints {
    authorization: String,
    token: String,
}

/// `AuthorizationAgent` driving the system browser.
pub struct OidcAuthorizationAgent {
    http: HttpClient,
    discovery: DiscoveryClient,
    browser: Arc<dyn BrowserLauncher>,
    callback_timeout: Duration,
}

impl OidcAuthorizationAgent {
    pub fn new(http: HttpClient, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            discovery: DiscoveryClient::new(http.clone()),
            http,
            browser,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    /// How long to wait for the user to finish in the browser.
    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    async fn endpoints(&self, provider: &ProviderLocation) -> Result<Endpoints> {
        if let Some(custom) = &provider.endpoints {
            debug!("Using custom authorization and token endpoints");
            return Ok(Endpoints {
                authorization: custom.authorization_endpoint.clone(),
                token: custom.token_endpoint.clone(),
            });
        }

        let metadata = self.discovery.fetch(&provider.discovery_url).await?;
        metadata.ensure_secure(provider.allow_insecure_connections)?;
        Ok(Endpoints {
            authorization: metadata.authorization_endpoint.clone(),
            token: metadata.token_endpoint.clone(),
        })
    }

    async fn request_tokens(
        &self,
        token_endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<TokenResult> {
        let issued_at = Utc::now();
        let request = self.http.request(Method::POST, token_endpoint).form(form);
        let response = self.http.send_non_idempotent(request).await?;

        let status = response.status();
        let body = response.bytes().await.map_err(to_auth)?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<OAuthErrorBody>(&body) {
                Ok(error) => {
                    warn!(error = %error.error, "Token endpoint rejected the request");
                    AuthError::Agent(error.to_string())
                }
                Err(_) => AuthError::Network(format!(
                    "token endpoint returned HTTP {}",
                    status.as_u16()
                )),
            });
        }

        let parsed: TokenEndpointResponse = serde_json::from_slice(&body).map_err(to_auth)?;
        Ok(parsed.into_result(issued_at))
    }

    /// Run a browser round-trip to `url`, returning the redirect parameters.
    async fn browser_round_trip(
        &self,
        server: LoopbackCallbackServer,
        url: &Url,
        ephemeral: bool,
    ) -> Result<super::callback::CallbackParams> {
        let mut server = server;
        let outcome = match self.browser.open(url.as_str(), ephemeral).await {
            Ok(()) => server.wait_for_callback(self.callback_timeout).await,
            Err(err) => Err(err),
        };
        server.shutdown().await?;
        outcome
    }
}

#[async_trait]
impl AuthorizationAgent for OidcAuthorizationAgent {
    async fn authorize_and_exchange_code(
        &self,
        request: AuthorizationRequest,
    ) -> Result<TokenResult> {
        let endpoints = self.endpoints(&request.provider).await?;

        let redirect = Url::parse(&request.redirect_uri).map_err(to_auth)?;
        let server = LoopbackCallbackServer::start(request.redirect_port, redirect.path()).await?;
        let redirect_uri = effective_redirect_uri(redirect, request.redirect_port, server.port())?;

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let csrf = CsrfToken::new_random();

        let mut url = Url::parse(&endpoints.authorization).map_err(to_auth)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &request.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("scope", &request.scopes.join(" "))
                .append_pair("state", csrf.secret())
                .append_pair("code_challenge", challenge.as_str())
                .append_pair("code_challenge_method", PKCE_METHOD);
            if let Some(prompt) = &request.prompt {
                query.append_pair("prompt", prompt);
            }
        }

        info!(client_id = %request.client_id, "Starting authorization code flow");
        let params =
            self.browser_round_trip(server, &url, request.prefer_ephemeral_session).await?;
        let code = params.into_code(csrf.secret())?;
        debug!("Authorization code received; exchanging");

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code),
            ("redirect_uri", redirect_uri.to_string()),
            ("client_id", request.client_id.clone()),
            ("code_verifier", verifier.secret().clone()),
        ];
        if let Some(secret) = &request.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        self.request_tokens(&endpoints.token, &form).await
    }

    async fn token(&self, request: TokenRequest) -> Result<TokenResult> {
        let endpoints = self.endpoints(&request.provider).await?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", request.refresh_token.clone()),
            ("client_id", request.client_id.clone()),
            ("scope", request.scopes.join(" ")),
        ];
        if let Some(secret) = &request.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        debug!(client_id = %request.client_id, "Requesting refresh-token grant");
        self.request_tokens(&endpoints.token, &form).await
    }

    async fn end_session(&self, request: EndSessionRequest) -> Result<()> {
        let metadata = self.discovery.fetch(&request.provider.discovery_url).await?;
        metadata.ensure_secure(request.provider.allow_insecure_connections)?;
        let endpoint = metadata.end_session_endpoint.as_deref().ok_or_else(|| {
            AuthError::Agent("identity provider does not advertise an end_session_endpoint".into())
        })?;

        let redirect = Url::parse(&request.post_logout_redirect_uri).map_err(to_auth)?;
        let server = LoopbackCallbackServer::start(request.redirect_port, redirect.path()).await?;
        let post_logout_redirect =
            effective_redirect_uri(redirect, request.redirect_port, server.port())?;

        let state = CsrfToken::new_random();
        let mut url = Url::parse(endpoint).map_err(to_auth)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &request.client_id)
                .append_pair("post_logout_redirect_uri", post_logout_redirect.as_str())
                .append_pair("state", state.secret());
            if let Some(hint) = &request.id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }

        info!(client_id = %request.client_id, "Starting end-session flow");
        let params =
            self.browser_round_trip(server, &url, request.prefer_ephemeral_session).await?;
        params.ensure_no_error()?;

        if params.state.as_deref().is_some_and(|returned| returned != state.secret()) {
            return Err(AuthError::Agent("end-session state mismatch".into()));
        }

        Ok(())
    }
}

/// Redirect URI to advertise: the configured one, with the bound port
/// substituted when an ephemeral port was requested.
fn effective_redirect_uri(mut redirect: Url, configured_port: u16, bound_port: u16) -> Result<Url> {
    if configured_port == 0 {
        redirect
            .set_port(Some(bound_port))
            .map_err(|()| AuthError::Config("redirect URI cannot carry a port".into()))?;
    }
    Ok(redirect)
}
