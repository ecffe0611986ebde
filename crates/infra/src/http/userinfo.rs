//! User-info endpoint client

use async_trait::async_trait;
use realmkey_core::UserInfoClient;
use realmkey_domain::{AuthError, Result};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use super::client::{read_json, HttpClient};

/// `UserInfoClient` over [`HttpClient`].
#[derive(Clone)]
pub struct ReqwestUserInfoClient {
    http: HttpClient,
}

impl ReqwestUserInfoClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl UserInfoClient for ReqwestUserInfoClient {
    async fn get_json(&self, url: &str, bearer_token: &str) -> Result<Map<String, Value>> {
        let request = self
            .http
            .request(Method::GET, url)
            .bearer_auth(bearer_token)
            .header(reqwest::header::ACCEPT, "application/json");
        let response = self.http.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Network(format!(
                "user info request failed with HTTP {}",
                status.as_u16()
            )));
        }

        let claims: Map<String, Value> = read_json(response).await?;
        debug!(claims = claims.len(), "User info fetched");
        Ok(claims)
    }
}
