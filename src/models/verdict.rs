//! Resolved outcome of one command.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// Why a command resolved as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The deadline elapsed before a terminal token arrived.
    Timeout,
    /// The modem answered with a failure terminal token.
    ModemError,
    /// The link failed or was closed while the command was pending.
    TransportClosed,
    /// The caller cancelled the command before it resolved.
    Cancelled,
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Timeout => "timeout",
            Self::ModemError => "modem error",
            Self::TransportClosed => "transport closed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Outcome of a command: the reply lines plus success or failure.
///
/// Reply lines never include the echoed command or the terminal token.
/// A failure keeps every line collected up to the failure point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A success terminal token ended the reply.
    Success(Vec<String>),
    /// The command failed; `lines` holds the partial reply.
    Failure {
        /// Lines collected before the failure.
        lines: Vec<String>,
        /// Failure cause.
        reason: FailureReason,
    },
}

impl Verdict {
    /// Build a failure verdict.
    #[must_use]
    pub fn failure(lines: Vec<String>, reason: FailureReason) -> Self {
        Self::Failure { lines, reason }
    }

    /// `true` for [`Verdict::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Reply lines in arrival order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        match self {
            Self::Success(lines) | Self::Failure { lines, .. } => lines,
        }
    }

    /// Failure cause, or `None` on success.
    #[must_use]
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success(_) => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }

    /// Split into the `(success, lines)` pair consumed by command builders.
    #[must_use]
    pub fn into_parts(self) -> (bool, Vec<String>) {
        match self {
            Self::Success(lines) => (true, lines),
            Self::Failure { lines, .. } => (false, lines),
        }
    }

    /// Convert into a `Result`, folding the reason and partial reply into
    /// [`AppError::Command`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Command` for any failure verdict.
    pub fn into_result(self) -> Result<Vec<String>> {
        match self {
            Self::Success(lines) => Ok(lines),
            Self::Failure { lines, reason } if lines.is_empty() => {
                Err(AppError::Command(reason.to_string()))
            }
            Self::Failure { lines, reason } => Err(AppError::Command(format!(
                "{reason}: {}",
                lines.join(" | ")
            ))),
        }
    }
}
