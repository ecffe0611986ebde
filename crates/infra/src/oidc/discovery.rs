//! OIDC discovery

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use realmkey_domain::{AuthError, Result};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::http::{read_json, HttpClient};

/// Subset of the provider metadata document the agent needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

impl ProviderMetadata {
    /// Reject plain-HTTP endpoints unless insecure connections are allowed.
    ///
    /// # Errors
    /// `AuthError::InvalidResponse` naming the offending endpoint.
    pub fn ensure_secure(&self, allow_insecure_connections: bool) -> Result<()> {
        if allow_insecure_connections {
            return Ok(());
        }

        let endpoints = [
            Some(self.authorization_endpoint.as_str()),
            Some(self.token_endpoint.as_str()),
            self.userinfo_endpoint.as_deref(),
            self.end_session_endpoint.as_deref(),
        ];
        for endpoint in endpoints.into_iter().flatten() {
            let url = Url::parse(endpoint).map_err(|err| {
                AuthError::InvalidResponse(format!("discovery endpoint {endpoint} is invalid: {err}"))
            })?;
            if url.scheme() != "https" {
                return Err(AuthError::InvalidResponse(format!(
                    "discovery endpoint {endpoint} does not use https"
                )));
            }
        }
        Ok(())
    }
}

/// Fetches provider metadata once per discovery URL.
pub struct DiscoveryClient {
    http: HttpClient,
    cache: RwLock<HashMap<String, Arc<ProviderMetadata>>>,
}

impl DiscoveryClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http, cache: RwLock::new(HashMap::new()) }
    }

    /// Metadata for `discovery_url`, from cache when available.
    ///
    /// # Errors
    /// `AuthError::Network` on transport failure or non-2xx status and
    /// `AuthError::InvalidResponse` on an unreadable document.
    pub async fn fetch(&self, discovery_url: &str) -> Result<Arc<ProviderMetadata>> {
        if let Some(cached) = self.cache.read().get(discovery_url) {
            debug!(url = %discovery_url, "Discovery cache hit");
            return Ok(Arc::clone(cached));
        }

        let response = self.http.send(self.http.request(Method::GET, discovery_url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Network(format!(
                "discovery request failed with HTTP {}",
                status.as_u16()
            )));
        }

        let metadata: ProviderMetadata = read_json(response).await?;
        info!(issuer = %metadata.issuer, "Fetched OIDC discovery document");

        let metadata = Arc::new(metadata);
        self.cache.write().insert(discovery_url.to_string(), Arc::clone(&metadata));
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn document(base: &str) -> serde_json::Value {
        json!({
            "issuer": format!("{base}/realms/acme"),
            "authorization_endpoint": format!("{base}/realms/acme/protocol/openid-connect/auth"),
            "token_endpoint": format!("{base}/realms/acme/protocol/openid-connect/token"),
            "userinfo_endpoint": format!("{base}/realms/acme/protocol/openid-connect/userinfo"),
            "end_session_endpoint": format!("{base}/realms/acme/protocol/openid-connect/logout"),
            "jwks_uri": format!("{base}/realms/acme/protocol/openid-connect/certs")
        })
    }

    fn client() -> DiscoveryClient {
        DiscoveryClient::new(HttpClient::builder().retry_policy(crate::http::RetryPolicy::none()).build().unwrap())
    }

    #[tokio::test]
    async fn fetches_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/realms/acme/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document(&server.uri())))
            .expect(1)
            .mount(&server)
            .await;

        let discovery = client();
        let url = format!("{}/realms/acme/.well-known/openid-configuration", server.uri());

        let first = discovery.fetch(&url).await.unwrap();
        let second = discovery.fetch(&url).await.unwrap();

        assert_eq!(first, second);
        assert!(first.end_session_endpoint.as_deref().unwrap().ends_with("/logout"));
    }

    #[tokio::test]
    async fn missing_document_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client().fetch(&server.uri()).await;

        assert!(matches!(result, Err(AuthError::Network(_))));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document(&server.uri())))
            .mount(&server)
            .await;

        let discovery = client();
        let url = format!("{}/realms/acme/.well-known/openid-configuration", server.uri());

        assert!(matches!(discovery.fetch(&url).await, Err(AuthError::Network(_))));
        let metadata = discovery.fetch(&url).await.unwrap();

        assert!(metadata.issuer.ends_with("/realms/acme"));
    }

    #[test]
    fn insecure_endpoints_rejected_unless_allowed() {
        let metadata: ProviderMetadata =
            serde_json::from_value(document("http://sso.local")).unwrap();

        assert!(matches!(metadata.ensure_secure(false), Err(AuthError::InvalidResponse(_))));
        assert!(metadata.ensure_secure(true).is_ok());
    }
}
