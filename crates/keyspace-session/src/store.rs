//! Session persistence boundary.
//!
//! Callers hand a session to the store and get it back later; the store
//! never inspects key material, which crosses the boundary hex-encoded.
//! [`handle_command`] speaks the small message protocol used between the
//! pairing UI and its background holder:
//!
//! ```text
//! {"cmd":"saveSession","message":{...}} -> {"result":"success"}
//! {"cmd":"getSession"}                  -> {"result":"success","message":{...}}
//!                                        | {"result":"error","message":"no session available"}
//! {"cmd":"removeSession"}               -> {"result":"success"}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keyspace_core::{KeyspaceError, KeyspaceResult};
use keyspace_crypto::keys::{HexKeyRing, UserSession};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Persisted form of a [`UserSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub email: String,
    pub keyring: HexKeyRing,
}

impl StoredSession {
    pub fn from_session(session: &UserSession) -> Self {
        Self {
            email: session.email.clone(),
            keyring: session.keyring.to_hex(),
        }
    }

    /// Decode back into a live session. Any malformed keyring field fails the
    /// whole session.
    pub fn to_session(&self) -> KeyspaceResult<UserSession> {
        if self.email.is_empty() {
            return Err(KeyspaceError::SessionStore("stored session has no email".into()));
        }
        Ok(UserSession {
            email: self.email.clone(),
            keyring: self.keyring.decode()?,
        })
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &StoredSession) -> KeyspaceResult<()>;
    async fn load(&self) -> KeyspaceResult<Option<StoredSession>>;
    async fn remove(&self) -> KeyspaceResult<()>;
}

/// Store a live session.
pub async fn save_session(store: &dyn SessionStore, session: &UserSession) -> KeyspaceResult<()> {
    store.save(&StoredSession::from_session(session)).await
}

/// Restore a live session, if one is stored.
pub async fn restore_session(store: &dyn SessionStore) -> KeyspaceResult<Option<UserSession>> {
    store.load().await?.map(|s| s.to_session()).transpose()
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// Process-lifetime store, the equivalent of a background page variable.
#[derive(Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: &StoredSession) -> KeyspaceResult<()> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> KeyspaceResult<Option<StoredSession>> {
        Ok(self.session.read().await.clone())
    }

    async fn remove(&self) -> KeyspaceResult<()> {
        *self.session.write().await = None;
        Ok(())
    }
}

// ── File store ───────────────────────────────────────────────────────────────

/// JSON file store. Writes go through a temp file and a rename so readers
/// never observe a partial session; on Unix the file is owner-only.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        parent.join(format!(
            ".{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &StoredSession) -> KeyspaceResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| KeyspaceError::SessionStore(format!("serializing session: {e}")))?;

        let tmp = self.tmp_path();
        write_private(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn load(&self) -> KeyspaceResult<Option<StoredSession>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let session = serde_json::from_slice(&content).map_err(|e| {
            KeyspaceError::SessionStore(format!("parsing {}: {e}", self.path.display()))
        })?;
        Ok(Some(session))
    }

    async fn remove(&self) -> KeyspaceResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "session removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
async fn write_private(path: &Path, content: &[u8]) -> KeyspaceResult<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_private(path: &Path, content: &[u8]) -> KeyspaceResult<()> {
    tokio::fs::write(path, content).await?;
    Ok(())
}

// ── Command protocol ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum SessionCommand {
    SaveSession { message: StoredSession },
    GetSession,
    RemoveSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandResult {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub result: CommandResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
}

impl SessionResponse {
    fn success(message: Option<serde_json::Value>) -> Self {
        Self {
            result: CommandResult::Success,
            message,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            result: CommandResult::Error,
            message: Some(serde_json::Value::String(message.into())),
        }
    }
}

pub async fn handle_command(store: &dyn SessionStore, command: SessionCommand) -> SessionResponse {
    let outcome = match command {
        SessionCommand::SaveSession { message } => store.save(&message).await.map(|_| None),
        SessionCommand::GetSession => match store.load().await {
            Ok(Some(session)) => serde_json::to_value(&session)
                .map(Some)
                .map_err(KeyspaceError::from),
            Ok(None) => return SessionResponse::error("no session available"),
            Err(e) => Err(e),
        },
        SessionCommand::RemoveSession => store.remove().await.map(|_| None),
    };

    match outcome {
        Ok(message) => SessionResponse::success(message),
        Err(e) => {
            debug!(error = %e, "session command failed");
            SessionResponse::error(e.to_string())
        }
    }
}

/// Entry point for untyped messages; anything that is not a known command
/// gets an error response.
pub async fn handle_raw_command(
    store: &dyn SessionStore,
    request: serde_json::Value,
) -> SessionResponse {
    match serde_json::from_value::<SessionCommand>(request) {
        Ok(command) => handle_command(store, command).await,
        Err(_) => SessionResponse::error("Invalid 'cmd'"),
    }
}
