use thiserror::Error;

/// Main error type for the wallet observer
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("System error: {0}")]
    System(#[from] std::io::Error),
}

/// Errors produced by a JSON-RPC round trip.
///
/// Every variant belongs to exactly one [`RpcErrorKind`], so callers can tell a
/// node-reported failure apart from a broken transport or a malformed reply.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timeout after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i64, message: String },

    #[error("Block not found: {block_number}")]
    BlockNotFound { block_number: u64 },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Response id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: u64, got: u64 },
}

/// Coarse classification of [`RpcError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Network failure, timeout or non-success HTTP status
    Transport,
    /// The node answered with an `error` object
    Node,
    /// The reply could not be decoded into the expected shape
    Decode,
}

impl RpcError {
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            RpcError::Http(e) if e.is_decode() => RpcErrorKind::Decode,
            RpcError::Http(_) | RpcError::Timeout { .. } | RpcError::Connection(_) => {
                RpcErrorKind::Transport
            }
            RpcError::Method { .. } | RpcError::BlockNotFound { .. } => RpcErrorKind::Node,
            RpcError::InvalidResponse(_) | RpcError::IdMismatch { .. } => RpcErrorKind::Decode,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == RpcErrorKind::Transport
    }

    pub fn decode(message: impl Into<String>) -> Self {
        RpcError::InvalidResponse(message.into())
    }
}

/// Errors raised by a [`crate::index::TransactionStore`] backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("Stored row is corrupt: {0}")]
    Corrupt(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not readable: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ObserverError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl ObserverError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ObserverError::Config(_) => ErrorSeverity::Critical,
            ObserverError::Invariant(_) => ErrorSeverity::Critical,
            ObserverError::Storage(StorageError::Corrupt(_)) => ErrorSeverity::Critical,

            ObserverError::Storage(_) => ErrorSeverity::High,
            ObserverError::System(_) => ErrorSeverity::High,
            ObserverError::Rpc(e) if e.kind() == RpcErrorKind::Decode => ErrorSeverity::High,

            ObserverError::Rpc(RpcError::BlockNotFound { .. }) => ErrorSeverity::Low,
            ObserverError::Rpc(_) => ErrorSeverity::Medium,
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ObserverError::Rpc(e) => match e.kind() {
                RpcErrorKind::Transport => true,
                RpcErrorKind::Node => true,
                RpcErrorKind::Decode => false,
            },
            ObserverError::Storage(StorageError::Lock(_)) => true,
            ObserverError::Storage(_) => false,
            ObserverError::Config(_) => false,
            ObserverError::Invariant(_) => false,
            ObserverError::System(_) => false,
        }
    }
}
