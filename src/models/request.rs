//! In-flight command state and per-send options.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::line::Line;

/// Prompt the modem prints when it is ready for a raw payload.
pub const INPUT_PROMPT: &str = ">";

/// Per-command overrides for [`Modem::send_with`](crate::modem::Modem::send_with).
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Deadline override; `None` uses the configured default.
    pub timeout: Option<Duration>,
    /// Token aborting the command with `FailureReason::Cancelled`.
    pub cancel: Option<CancellationToken>,
    /// Raw payload sent after the command line and closed by the trailer byte
    /// instead of a line terminator (e.g. `AT+CMGS` message text).
    pub trailer: Option<String>,
}

impl SendOptions {
    /// Options with every field left at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the deadline for this command.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Send `payload` in raw trailer mode after the command line.
    #[must_use]
    pub fn trailer(mut self, payload: impl Into<String>) -> Self {
        self.trailer = Some(payload.into());
        self
    }
}

/// The single command awaiting its terminal token.
///
/// Holds the exact text sent so echoes can be recognised; the value is
/// scoped to one request and consumed when the request resolves.
#[derive(Debug)]
pub struct PendingRequest {
    command: String,
    payload: Option<String>,
    lines: Vec<String>,
    deadline: Instant,
    armed: bool,
    held_terminal: Option<Line>,
    payload_echoed: bool,
    cancel: CancellationToken,
}

impl PendingRequest {
    /// Create a request whose deadline is `timeout` from now.
    ///
    /// Requests carrying a raw payload start unarmed: terminal tokens are
    /// only acted on once the payload has been written.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        payload: Option<String>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let armed = payload.is_none();
        Self {
            command: command.into(),
            payload,
            lines: Vec::new(),
            deadline: Instant::now() + timeout,
            armed,
            held_terminal: None,
            payload_echoed: false,
            cancel,
        }
    }

    /// Command text as written to the transport, without terminator.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Raw payload for multi-stage commands.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Reply lines accumulated so far.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Instant at which the request times out.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether terminal tokens currently resolve the request.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Caller cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// `true` when `text` repeats what was written for this request.
    ///
    /// The command echo always matches. A payload echo, possibly behind the
    /// modem's `>` input prompt, matches only once and only before any reply
    /// line was collected, so a payload that reads like a terminal token
    /// (an SMS body of `OK`) cannot swallow the real terminal. A bare prompt
    /// counts as part of the echo.
    #[must_use]
    pub fn is_echo(&self, text: &str) -> bool {
        if text == self.command {
            return true;
        }
        let Some(payload) = self.payload.as_deref() else {
            return false;
        };
        match text.strip_prefix(INPUT_PROMPT).map(str::trim_start) {
            Some("") => true,
            Some(rest) => self.awaits_payload_echo() && rest == payload,
            None => self.awaits_payload_echo() && text == payload,
        }
    }

    /// Record `text` as echo if it is one; see [`is_echo`](Self::is_echo).
    pub(crate) fn take_echo(&mut self, text: &str) -> bool {
        if !self.is_echo(text) {
            return false;
        }
        if text != self.command && text.trim_end() != INPUT_PROMPT {
            self.payload_echoed = true;
        }
        true
    }

    fn awaits_payload_echo(&self) -> bool {
        !self.payload_echoed && self.lines.is_empty()
    }

    pub(crate) fn push(&mut self, line: Line) {
        self.lines.push(line.into_string());
    }

    pub(crate) fn hold_terminal(&mut self, line: Line) {
        if self.held_terminal.is_none() {
            self.held_terminal = Some(line);
        }
    }

    pub(crate) fn arm(&mut self) -> Option<Line> {
        self.armed = true;
        self.held_terminal.take()
    }

    pub(crate) fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
