//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A rejection rule carries a pattern that is not a valid regular expression.
    InvalidRule {
        /// Name of the offending rule.
        rule: String,
        /// The pattern text as written in the configuration.
        pattern: String,
        /// Parser diagnostic from the regex engine.
        reason: String,
    },
    /// Connection or subscription to the access plane failed or was lost.
    Connection(String),
    /// Identity material could not be read or parsed.
    Credential(String),
    /// A single access-request call (e.g. a deny transition) failed.
    Request(String),
    /// Health endpoint bind or serve failure.
    Health(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidRule {
                rule,
                pattern,
                reason,
            } => write!(f, "invalid rule '{rule}': pattern '{pattern}': {reason}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Credential(msg) => write!(f, "credential: {msg}"),
            Self::Request(msg) => write!(f, "request: {msg}"),
            Self::Health(msg) => write!(f, "health: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
