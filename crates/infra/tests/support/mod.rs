//! Shared fixtures for infra integration tests: a wiremock identity
//! provider, a browser that follows redirects itself, and an in-memory
//! secure store standing in for the OS keychain.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use realmkey_core::SecureStore;
use realmkey_domain::{AuthConfig, AuthError, Result};
use realmkey_infra::BrowserLauncher;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "acme";
pub const AUTH_CODE: &str = "auth-code-1";

/// Unsigned JWT whose `exp` lies `expires_in_secs` from now.
pub fn jwt(expires_in_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let exp = (Utc::now() + Duration::seconds(expires_in_secs)).timestamp();
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "sub": "user-1" }).to_string());
    format!("{header}.{payload}.sig")
}

pub fn realm_path(suffix: &str) -> String {
    format!("/realms/{REALM}{suffix}")
}

/// Config pointing at the mock provider with an ephemeral redirect port.
pub fn config_for(server: &MockServer) -> AuthConfig {
    AuthConfig::new("desktop-app", "http://127.0.0.1:0/callback", server.uri(), REALM)
        .with_redirect_port(0)
        .with_insecure_connections(true)
        .with_scopes(["openid", "offline_access"])
}

pub async fn mount_discovery(server: &MockServer) {
    let issuer = format!("{}{}", server.uri(), realm_path(""));
    Mock::given(method("GET"))
        .and(path(realm_path("/.well-known/openid-configuration")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/protocol/openid-connect/auth"),
            "token_endpoint": format!("{issuer}/protocol/openid-connect/token"),
            "userinfo_endpoint": format!("{issuer}/protocol/openid-connect/userinfo"),
            "end_session_endpoint": format!("{issuer}/protocol/openid-connect/logout"),
        })))
        .mount(server)
        .await;
}

pub fn token_body(access_token: &str, refresh_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "id_token": jwt(300),
        "refresh_token": refresh_token,
        "token_type": "Bearer",
        "expires_in": 300,
    })
}

pub async fn mount_code_exchange(server: &MockServer, refresh_token: &str) {
    Mock::given(method("POST"))
        .and(path(realm_path("/protocol/openid-connect/token")))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={AUTH_CODE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-login", refresh_token)))
        .mount(server)
        .await;
}

pub async fn mount_refresh(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(realm_path("/protocol/openid-connect/token")))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(response)
        .mount(server)
        .await;
}

pub async fn mount_userinfo(server: &MockServer, bearer: &str) {
    Mock::given(method("GET"))
        .and(path(realm_path("/protocol/openid-connect/userinfo")))
        .and(header("authorization", format!("Bearer {bearer}").as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sub": "user-1", "email": "user@example.com" })),
        )
        .mount(server)
        .await;
}

/// Plays the user's part: follows the authorize or logout URL straight to
/// the loopback redirect.
#[derive(Default)]
pub struct RedirectingBrowser {
    pub opened: Mutex<Vec<Url>>,
}

impl RedirectingBrowser {
    pub fn opened_paths(&self) -> Vec<String> {
        self.opened.lock().iter().map(|url| url.path().to_string()).collect()
    }
}

#[async_trait]
impl BrowserLauncher for RedirectingBrowser {
    async fn open(&self, url: &str, _ephemeral: bool) -> Result<()> {
        let url = Url::parse(url).map_err(|err| AuthError::Internal(err.to_string()))?;
        self.opened.lock().push(url.clone());

        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let (target, code) = match pairs.get("redirect_uri") {
            Some(redirect) => (redirect.clone(), Some(AUTH_CODE)),
            None => (pairs["post_logout_redirect_uri"].clone(), None),
        };

        let mut redirect = Url::parse(&target).map_err(|err| AuthError::Internal(err.to_string()))?;
        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("state", &pairs["state"]);
            if let Some(code) = code {
                query.append_pair("code", code);
            }
        }

        reqwest::get(redirect.as_str())
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        Ok(())
    }
}

/// In-memory replacement for the OS keychain.
#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySecureStore {
    pub fn seeded(key: &str, value: &str) -> Arc<Self> {
        let store = Self::default();
        store.entries.lock().insert(key.to_string(), value.to_string());
        Arc::new(store)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
