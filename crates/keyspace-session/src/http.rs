use std::time::Duration;

use async_trait::async_trait;
use keyspace_core::config::ApiConfig;
use keyspace_core::types::KeyauthToken;
use keyspace_core::{KeyspaceError, KeyspaceResult};
use tracing::debug;

use crate::transport::TokenService;

/// Shared HTTP client with the configured request timeout.
pub fn build_client(config: &ApiConfig) -> KeyspaceResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| KeyspaceError::Other(anyhow::anyhow!("building HTTP client: {e}")))
}

/// Keyauth token service reached over HTTPS (`GET https://<keyauth_host>/`).
#[derive(Clone)]
pub struct HttpTokenService {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenService {
    pub fn new(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            url: config.keyauth_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenService for HttpTokenService {
    async fn fetch_token(&self) -> KeyspaceResult<KeyauthToken> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| KeyspaceError::TokenServiceUnavailable(e.to_string()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(KeyspaceError::TokenServiceUnavailable(format!(
                "{} returned {status}",
                self.url
            )));
        }

        let token: KeyauthToken = resp
            .json()
            .await
            .map_err(|e| KeyspaceError::TokenServiceUnavailable(format!("token body: {e}")))?;
        debug!(version = %token.version, expiry = %token.expiry, "keyauth token fetched");
        Ok(token)
    }
}
