//! Vault API client.
//!
//! Records are sealed before they leave the client and opened as they
//! arrive. Every request is signed with a fresh keyauth token.

use std::sync::Arc;
use std::time::Duration;

use keyspace_core::config::{KeyspaceConfig, MissingFieldPolicy};
use keyspace_core::types::{RawServerItem, VaultItem};
use keyspace_core::{KeyspaceError, KeyspaceResult};
use keyspace_crypto::keys::UserSession;
use keyspace_crypto::{open_vault, seal_item, VaultLoad};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::auth_headers;
use crate::transport::TokenService;

const ITEMS_PATH: &str = "vaults/items";
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Deserialize)]
struct VaultItemsResponse {
    data: Vec<RawServerItem>,
}

/// Reply to add / edit / delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

enum Failure {
    Transient(KeyspaceError),
    Permanent(KeyspaceError),
}

pub struct VaultClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenService>,
    session: UserSession,
    policy: MissingFieldPolicy,
    max_retries: u32,
}

impl VaultClient {
    pub fn new(
        http: reqwest::Client,
        config: &KeyspaceConfig,
        tokens: Arc<dyn TokenService>,
        session: UserSession,
    ) -> Self {
        Self {
            http,
            base_url: config.api.api_base_url(),
            tokens,
            session,
            policy: config.vault.missing_field_policy,
            max_retries: config.api.max_retries,
        }
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    /// Fetch and open the whole vault. Records that fail to open are listed in
    /// [`VaultLoad::failures`] instead of failing the listing.
    pub async fn list_items(&self) -> KeyspaceResult<VaultLoad> {
        let resp: VaultItemsResponse = self
            .request(Method::GET, &format!("{ITEMS_PATH}?combined=true"), None)
            .await?;
        let key = self.session.keyring.vault_key()?;
        Ok(open_vault(resp.data, &key, self.policy))
    }

    pub async fn add_item(&self, item: &VaultItem) -> KeyspaceResult<MutationResponse> {
        let body = json!({ "data": self.seal(item)? });
        self.request(Method::POST, ITEMS_PATH, Some(body)).await
    }

    pub async fn edit_item(&self, item: &VaultItem) -> KeyspaceResult<MutationResponse> {
        let body = json!({ "data": self.seal(item)? });
        self.request(Method::PUT, ITEMS_PATH, Some(body)).await
    }

    pub async fn delete_item(&self, id: &str) -> KeyspaceResult<MutationResponse> {
        self.request(Method::DELETE, ITEMS_PATH, Some(json!({ "id": id })))
            .await
    }

    fn seal(&self, item: &VaultItem) -> KeyspaceResult<VaultItem> {
        let key = self.session.keyring.vault_key()?;
        seal_item(item, &key)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> KeyspaceResult<T> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(method.clone(), path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(Failure::Permanent(e)) => return Err(e),
                Err(Failure::Transient(e)) if attempt >= self.max_retries => return Err(e),
                Err(Failure::Transient(e)) => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    warn!(%method, path, attempt, error = %e, "vault request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, Failure> {
        let headers = auth_headers(self.tokens.as_ref(), &self.session.keyring)
            .await
            .map_err(|e| match e {
                KeyspaceError::TokenServiceUnavailable(_) => Failure::Transient(e),
                other => Failure::Permanent(other),
            })?;

        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        request = headers.apply(request);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Failure::Transient(KeyspaceError::Api(e.to_string())))?;

        let status = resp.status();
        debug!(%method, path, status = status.as_u16(), "vault response");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::Transient(KeyspaceError::Api(format!(
                "{method} {path}: {status}"
            ))));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Failure::Permanent(KeyspaceError::Api(format!(
                "{method} {path}: {status} {text}"
            ))));
        }

        resp.json()
            .await
            .map_err(|e| Failure::Permanent(KeyspaceError::Decode(format!("{path}: {e}"))))
    }
}

/// Exponential backoff: 250ms, 500ms, 1s, ... capped at 8s.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
        .min(RETRY_MAX_DELAY)
}
