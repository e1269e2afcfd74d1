//! Error types shared across the crate.
//!
//! Reply-level failures (timeout, modem `ERROR`, closed link) are not errors:
//! they come back as [`Verdict::Failure`](crate::models::verdict::Verdict)
//! values carrying the partial reply. [`AppError`] covers precondition
//! violations, configuration problems and transport failures.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering all crate failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The serial transport could not be acquired, read, or written.
    Transport(String),
    /// A command was submitted while the link is closed.
    NotOpen,
    /// A command was submitted while another one is still pending.
    Busy(String),
    /// The command text cannot be sent (empty or contains a line break).
    InvalidCommand(String),
    /// A command resolved to a failure verdict and the caller asked for `Result`.
    Command(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::NotOpen => write!(f, "not open: link is closed"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::InvalidCommand(msg) => write!(f, "invalid command: {msg}"),
            Self::Command(msg) => write!(f, "command: {msg}"),
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
