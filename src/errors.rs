//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure. Fatal at startup.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Network, timeout or upstream-busy failure that is worth retrying.
    Transient(String),
    /// Credentials rejected by an external service. Never retried.
    Auth(String),
    /// Malformed task file or missing required header field.
    Data(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Event journal read or write failure.
    Journal(String),
    /// Version-control replication failure.
    Sync(String),
    /// Child process spawn, exit or supervision failure.
    Process(String),
    /// Call rejected because the service circuit breaker is open.
    CircuitOpen(String),
    /// Call rejected because the service rate limit is exhausted.
    RateLimited(String),
}

impl AppError {
    /// Whether the failure is transient and the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the call was refused locally before reaching the service.
    ///
    /// Deferred calls had no side effect and can be attempted again later.
    #[must_use]
    pub fn is_deferral(&self) -> bool {
        matches!(self, Self::CircuitOpen(_) | Self::RateLimited(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::Data(msg) => write!(f, "data: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Journal(msg) => write!(f, "journal: {msg}"),
            Self::Sync(msg) => write!(f, "sync: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::CircuitOpen(msg) => write!(f, "circuit open: {msg}"),
            Self::RateLimited(msg) => write!(f, "rate limited: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Data(format!("invalid json: {err}"))
    }
}
