//! Modem configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Serial device settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SerialConfig {
    /// Device path (e.g. `/dev/ttyUSB2`, `COM4`).
    pub port: String,
    /// Line speed in baud.
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB2".into(),
            baud_rate: 115_200,
        }
    }
}

/// Framing and timing of the command/response link.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct LinkConfig {
    /// Default per-command deadline in milliseconds.
    pub timeout_ms: u64,
    /// Bytes appended to every command line.
    pub line_terminator: String,
    /// Control byte closing a raw payload (Ctrl-Z).
    pub trailer_byte: u8,
    /// Longest inbound line kept; longer lines are discarded.
    pub max_line_bytes: usize,
    /// Buffered unsolicited lines before overflow is only logged.
    pub unsolicited_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            line_terminator: "\r\n".into(),
            trailer_byte: 0x1A,
            max_line_bytes: 4_096,
            unsolicited_capacity: 64,
        }
    }
}

impl LinkConfig {
    /// Default command deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Lines that end collection for the current command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TerminalConfig {
    /// Tokens resolving the command as a success.
    pub success: Vec<String>,
    /// Tokens resolving the command as a modem error.
    pub failure: Vec<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            success: vec!["OK".into()],
            failure: vec!["ERROR".into()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".into(),
        }
    }
}

/// Complete configuration parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ModemConfig {
    /// Serial device settings.
    pub serial: SerialConfig,
    /// Framing and timing.
    pub link: LinkConfig,
    /// Terminal tokens.
    pub terminals: TerminalConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl ModemConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(AppError::Config("serial.port must not be empty".into()));
        }

        if self.serial.baud_rate == 0 {
            return Err(AppError::Config(
                "serial.baud_rate must be greater than zero".into(),
            ));
        }

        if self.link.timeout_ms == 0 {
            return Err(AppError::Config(
                "link.timeout_ms must be greater than zero".into(),
            ));
        }

        if !self.link.line_terminator.ends_with('\n') {
            return Err(AppError::Config(
                "link.line_terminator must end with a newline".into(),
            ));
        }

        if self.link.max_line_bytes == 0 {
            return Err(AppError::Config(
                "link.max_line_bytes must be greater than zero".into(),
            ));
        }

        if self.link.unsolicited_capacity == 0 {
            return Err(AppError::Config(
                "link.unsolicited_capacity must be greater than zero".into(),
            ));
        }

        if self.terminals.success.is_empty() || self.terminals.failure.is_empty() {
            return Err(AppError::Config(
                "terminals.success and terminals.failure must not be empty".into(),
            ));
        }

        let blank = self
            .terminals
            .success
            .iter()
            .chain(&self.terminals.failure)
            .any(|token| token.trim().is_empty());
        if blank {
            return Err(AppError::Config("terminal tokens must not be blank".into()));
        }

        if let Some(token) = self
            .terminals
            .success
            .iter()
            .find(|token| self.terminals.failure.contains(token))
        {
            return Err(AppError::Config(format!(
                "terminal token {token:?} is listed as both success and failure"
            )));
        }

        Ok(())
    }
}
