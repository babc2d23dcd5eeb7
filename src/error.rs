//! Error types for govchain

use thiserror::Error;

/// Crate-wide error. Every fallible operation returns this type; callers can
/// branch on the variant to tell recoverable input problems apart from
/// integrity failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient balance for {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: String,
        required: u64,
        available: u64,
    },

    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity error: {0}")]
    IntegrityError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Mining error: {0}")]
    MiningError(String),

    #[error("Import error: {0}")]
    ImportError(String),

    #[error("Mempool is full")]
    MempoolFull,

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ChainError {
    /// JSON-RPC error code for this error. Codes in the -32000..-32099 range
    /// are server-defined.
    pub fn rpc_code(&self) -> i64 {
        match self {
            ChainError::ValidationError(_) => -32602,
            ChainError::AuthorizationError(_) => -32001,
            ChainError::StateError(_) => -32002,
            ChainError::IntegrityError(_) | ChainError::ImportError(_) => -32003,
            ChainError::NotFound(_) => -32004,
            ChainError::MiningError(_) => -32005,
            ChainError::InsufficientBalance { .. } => -32006,
            ChainError::MempoolFull => -32007,
            ChainError::CryptoError(_) => -32008,
            ChainError::PersistenceError(_) | ChainError::ConfigError(_) => -32603,
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ChainError::IntegrityError(_) | ChainError::PersistenceError(_)
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::PersistenceError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::ValidationError(format!("Encoding failed: {}", err))
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::ImportError(format!("Malformed JSON: {}", err))
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::PersistenceError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
