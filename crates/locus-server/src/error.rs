// crates/locus-server/src/error.rs
// Standardized error types for the broker

use std::time::Duration;

use thiserror::Error;

/// Semantic error kinds exposed at the protocol boundary.
///
/// The JSON-RPC error code for a kind is `-32000 - index`, where `index` is
/// the kind's position in this enum. The mapping is part of the wire
/// contract; variants must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ToolNotFound,
    InvalidArguments,
    NoClientAvailable,
    ClientDisconnected,
    ClientTimeout,
    UpstreamError,
    UpstreamRateLimited,
    NotConfigured,
    Cancelled,
    TimedOut,
    QueueFull,
    EmptyClipboard,
    UndoNotSupported,
    Interrupted,
    Internal,
}

impl ErrorKind {
    pub fn index(self) -> i64 {
        self as i64
    }

    pub fn json_rpc_code(self) -> i64 {
        -32000 - self.index()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::NoClientAvailable => "NoClientAvailable",
            ErrorKind::ClientDisconnected => "ClientDisconnected",
            ErrorKind::ClientTimeout => "ClientTimeout",
            ErrorKind::UpstreamError => "UpstreamError",
            ErrorKind::UpstreamRateLimited => "UpstreamRateLimited",
            ErrorKind::NotConfigured => "NotConfigured",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::TimedOut => "TimedOut",
            ErrorKind::QueueFull => "QueueFull",
            ErrorKind::EmptyClipboard => "EmptyClipboard",
            ErrorKind::UndoNotSupported => "UndoNotSupported",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Kinds the task manager may retry; everything else is terminal.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamError | ErrorKind::UpstreamRateLimited
        )
    }
}

/// Main error type for the broker library.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("no client available: {0}")]
    NoClientAvailable(String),

    #[error("client disconnected: {0}")]
    ClientDisconnected(String),

    #[error("client call timed out after {0:?}")]
    ClientTimeout(Duration),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream rate limited (retry after {0} s)")]
    RateLimited(u64),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out")]
    TimedOut,

    #[error("task queue full")]
    QueueFull,

    #[error("clipboard is empty")]
    EmptyClipboard,

    #[error("undo not supported: {0}")]
    UndoNotSupported(String),

    #[error("interrupted by restart")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Result using BrokerError.
pub type Result<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            BrokerError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            BrokerError::NoClientAvailable(_) => ErrorKind::NoClientAvailable,
            BrokerError::ClientDisconnected(_) => ErrorKind::ClientDisconnected,
            BrokerError::ClientTimeout(_) => ErrorKind::ClientTimeout,
            BrokerError::Upstream(_) | BrokerError::Http(_) => ErrorKind::UpstreamError,
            BrokerError::RateLimited(_) => ErrorKind::UpstreamRateLimited,
            BrokerError::NotConfigured(_) => ErrorKind::NotConfigured,
            BrokerError::Cancelled => ErrorKind::Cancelled,
            BrokerError::TimedOut => ErrorKind::TimedOut,
            BrokerError::QueueFull => ErrorKind::QueueFull,
            BrokerError::EmptyClipboard => ErrorKind::EmptyClipboard,
            BrokerError::UndoNotSupported(_) => ErrorKind::UndoNotSupported,
            BrokerError::Interrupted => ErrorKind::Interrupted,
            BrokerError::Io(_) | BrokerError::Json(_) | BrokerError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Shape this error as a handler-style failure payload:
    /// `{ "success": false, "error": { "kind", "message" } }`.
    pub fn to_failure_value(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "kind": self.kind().as_str(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<String> for BrokerError {
    fn from(s: String) -> Self {
        BrokerError::Internal(s)
    }
}

impl From<tokio::task::JoinError> for BrokerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            BrokerError::Cancelled
        } else {
            BrokerError::Internal(err.to_string())
        }
    }
}
