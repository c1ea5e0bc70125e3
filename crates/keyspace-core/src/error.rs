use thiserror::Error;

pub type KeyspaceResult<T> = Result<T, KeyspaceError>;

#[derive(Debug, Error)]
pub enum KeyspaceError {
    /// The OS random source could not produce key material.
    #[error("entropy source failure: {0}")]
    EntropyFailure(String),

    #[error("token service unavailable: {0}")]
    TokenServiceUnavailable(String),

    /// AEAD tag mismatch or signature verification failure.
    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),

    /// Malformed hex, base64, UTF-8, or JSON.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("unknown vault item type: {0:?}")]
    UnknownItemType(String),

    #[error("vault item {item_id} is missing encrypted field {field}")]
    MissingField { item_id: String, field: String },

    #[error("invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("session store error: {0}")]
    SessionStore(String),

    #[error("vault API error: {0}")]
    Api(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KeyspaceError {
    /// Errors after which pairing must be abandoned entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KeyspaceError::EntropyFailure(_))
    }

    /// Errors that restart the pairing cycle instead of aborting it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KeyspaceError::TokenServiceUnavailable(_)
                | KeyspaceError::AuthenticationFailure(_)
                | KeyspaceError::Decode(_)
                | KeyspaceError::Channel(_)
                | KeyspaceError::InvalidKey { .. }
        )
    }
}

impl From<serde_json::Error> for KeyspaceError {
    fn from(e: serde_json::Error) -> Self {
        KeyspaceError::Decode(format!("json: {e}"))
    }
}
