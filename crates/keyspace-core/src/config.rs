use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KeyspaceError, KeyspaceResult};

/// Top-level client configuration (loaded from keyspace.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyspaceConfig {
    pub api: ApiConfig,
    pub keyroute: KeyrouteConfig,
    pub vault: VaultConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Vault API and keyroute websocket host (no scheme)
    pub api_host: String,
    /// Keyauth token service host (no scheme)
    pub keyauth_host: String,
    /// Retry limit for transient vault API failures
    pub max_retries: u32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyrouteConfig {
    /// QR / token / ephemeral keypair lifetime in seconds (default: 60)
    pub refresh_interval_secs: u32,
    /// Initial reconnect delay for the keyroute channel in milliseconds
    pub reconnect_backoff_ms: u64,
    /// Upper bound for the reconnect delay in milliseconds
    pub reconnect_backoff_max_ms: u64,
    /// Consecutive failed reconnects before the channel error is surfaced
    pub max_reconnect_failures: u32,
    /// Require `signedToken` in the payload to verify against the recovered keyring
    pub verify_signed_token: bool,
}

/// How the envelope engine treats a sensitive field that is empty or absent
/// when a record is decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Treat the record as corrupt
    #[default]
    Reject,
    /// Treat the record as legacy and leave the field empty
    Tolerate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub missing_field_policy: MissingFieldPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session store file (hex-encoded keyring)
    pub store_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_host: "api.keyspace.cloud".into(),
            keyauth_host: "keyauth.keyspace.cloud".into(),
            max_retries: 6,
            request_timeout_secs: 30,
        }
    }
}

impl Default for KeyrouteConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            reconnect_backoff_ms: 500,
            reconnect_backoff_max_ms: 8000,
            max_reconnect_failures: 5,
            verify_signed_token: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("~/.local/share/keyspace/session.json"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ApiConfig {
    pub fn api_base_url(&self) -> String {
        format!("https://{}/", self.api_host)
    }

    pub fn keyauth_url(&self) -> String {
        format!("https://{}/", self.keyauth_host)
    }

    pub fn keyroute_url(&self, route_id: &str) -> String {
        format!("wss://{}/ws/keyroute/{}", self.api_host, route_id)
    }
}

impl KeyspaceConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> KeyspaceResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KeyspaceError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KeyspaceResult<()> {
        if self.keyroute.refresh_interval_secs == 0 {
            return Err(KeyspaceError::Config(
                "keyroute.refresh_interval_secs must be at least 1".into(),
            ));
        }
        if self.api.api_host.contains("://") || self.api.keyauth_host.contains("://") {
            return Err(KeyspaceError::Config(
                "api hosts are bare host names, without a scheme".into(),
            ));
        }
        Ok(())
    }
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}
