//! Correlation engine: matches inbound lines to the one pending command.
//!
//! The protocol is strictly half-duplex, so the engine holds at most one
//! [`PendingRequest`]. [`Correlator`] is the synchronous state machine;
//! [`Engine`] runs it as a task that races three event sources in one
//! `select!`:
//!
//! - lines from the reader, in arrival order,
//! - control messages from the dispatcher (`Begin`, `Arm`, `Abort`),
//! - the pending request's deadline and cancellation token.
//!
//! Nothing is polled on a timer. When the reader's channel closes the
//! pending request resolves as [`FailureReason::TransportClosed`] and the
//! task exits.

use std::future;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::TerminalConfig;
use crate::models::line::Line;
use crate::models::request::PendingRequest;
use crate::models::verdict::{FailureReason, Verdict};
use crate::{AppError, Result};

// ── Terminal tokens ───────────────────────────────────────────────────────────

/// Kind of terminal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Ends the reply as a success (`OK`).
    Success,
    /// Ends the reply as a modem error (`ERROR`).
    Failure,
}

/// Configured success and failure tokens, matched against whole lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSet {
    success: Vec<String>,
    failure: Vec<String>,
}

impl TerminalSet {
    /// Build a set from explicit token lists.
    #[must_use]
    pub fn new(success: Vec<String>, failure: Vec<String>) -> Self {
        Self { success, failure }
    }

    /// Build a set from the `[terminals]` configuration section.
    #[must_use]
    pub fn from_config(config: &TerminalConfig) -> Self {
        Self::new(config.success.clone(), config.failure.clone())
    }

    /// Classify `text` as a terminal token, if it is one.
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<Terminal> {
        if self.success.iter().any(|token| token == text) {
            Some(Terminal::Success)
        } else if self.failure.iter().any(|token| token == text) {
            Some(Terminal::Failure)
        } else {
            None
        }
    }
}

impl Default for TerminalSet {
    fn default() -> Self {
        Self::from_config(&TerminalConfig::default())
    }
}

// ── State machine ─────────────────────────────────────────────────────────────

/// What the correlator did with one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// No command pending; the line belongs to the unsolicited sink.
    Unsolicited(Line),
    /// The line repeated the command (or payload) and was dropped.
    Echo,
    /// The line was appended to the pending reply.
    Collected,
    /// A terminal token arrived before the raw payload was written; it is
    /// applied when the request is armed.
    Held,
    /// A terminal token resolved the pending request.
    Resolved(Verdict),
}

/// Synchronous command/response state machine.
///
/// `Idle` when [`pending`](Self::pending) is `None`, `AwaitingTerminal`
/// otherwise.
#[derive(Debug, Default)]
pub struct Correlator {
    terminals: TerminalSet,
    pending: Option<PendingRequest>,
}

impl Correlator {
    /// Create an idle correlator.
    #[must_use]
    pub fn new(terminals: TerminalSet) -> Self {
        Self {
            terminals,
            pending: None,
        }
    }

    /// `true` when no command is outstanding.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// The outstanding request, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Install `request` as the pending command.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Busy`] if another request is still pending; the
    /// pending request is left untouched.
    pub fn begin(&mut self, request: PendingRequest) -> Result<()> {
        if let Some(current) = &self.pending {
            return Err(AppError::Busy(format!(
                "command {:?} is still awaiting its terminal token",
                current.command()
            )));
        }
        self.pending = Some(request);
        Ok(())
    }

    /// Start acting on terminal tokens for a raw-trailer request.
    ///
    /// Returns the verdict if a terminal token was held while unarmed.
    pub fn arm(&mut self) -> Option<Verdict> {
        let held = self.pending.as_mut()?.arm()?;
        let terminal = self.terminals.classify(held.as_str())?;
        self.resolve_terminal(terminal)
    }

    /// Classify one inbound line against the pending request.
    pub fn on_line(&mut self, line: Line) -> Disposition {
        let Some(request) = self.pending.as_mut() else {
            return Disposition::Unsolicited(line);
        };

        if request.take_echo(line.as_str()) {
            return Disposition::Echo;
        }

        match self.terminals.classify(line.as_str()) {
            Some(_) if !request.is_armed() => {
                request.hold_terminal(line);
                Disposition::Held
            }
            Some(terminal) => match self.resolve_terminal(terminal) {
                Some(verdict) => Disposition::Resolved(verdict),
                None => Disposition::Collected,
            },
            None => {
                request.push(line);
                Disposition::Collected
            }
        }
    }

    /// Resolve the pending request as timed out.
    pub fn expire(&mut self) -> Option<Verdict> {
        self.fail(FailureReason::Timeout)
    }

    /// Resolve the pending request as cancelled by the caller.
    pub fn cancel(&mut self) -> Option<Verdict> {
        self.fail(FailureReason::Cancelled)
    }

    /// Force-resolve the pending request with `reason`, keeping partial lines.
    pub fn fail(&mut self, reason: FailureReason) -> Option<Verdict> {
        let request = self.pending.take()?;
        Some(Verdict::failure(request.into_lines(), reason))
    }

    fn resolve_terminal(&mut self, terminal: Terminal) -> Option<Verdict> {
        let lines = self.pending.take()?.into_lines();
        Some(match terminal {
            Terminal::Success => Verdict::Success(lines),
            Terminal::Failure => Verdict::failure(lines, FailureReason::ModemError),
        })
    }
}

// ── Engine task ───────────────────────────────────────────────────────────────

/// Messages from the dispatcher to the engine task.
#[derive(Debug)]
pub enum Control {
    /// Install a pending request. `ack` reports whether it was accepted; the
    /// verdict is delivered later through `reply`.
    Begin {
        /// The new request.
        request: PendingRequest,
        /// Receives the verdict once the request resolves.
        reply: oneshot::Sender<Verdict>,
        /// Receives `Ok` once the request is installed.
        ack: oneshot::Sender<Result<()>>,
    },
    /// The raw payload has been written; watch for terminal tokens.
    Arm,
    /// Force-resolve the pending request (e.g. after a failed write).
    Abort(FailureReason),
}

/// Builder for the correlation engine task.
///
/// Call [`spawn`](Self::spawn) to start it.
pub struct Engine {
    terminals: TerminalSet,
    line_rx: mpsc::UnboundedReceiver<Line>,
    unsolicited_tx: mpsc::Sender<Line>,
}

impl Engine {
    /// Construct an engine fed by `line_rx` (does not start the task yet).
    #[must_use]
    pub fn new(
        terminals: TerminalSet,
        line_rx: mpsc::UnboundedReceiver<Line>,
        unsolicited_tx: mpsc::Sender<Line>,
    ) -> Self {
        Self {
            terminals,
            line_rx,
            unsolicited_tx,
        }
    }

    /// Spawn the engine task and return a handle for controlling it.
    #[must_use]
    pub fn spawn(self) -> EngineHandle {
        let (control_tx, control_rx) = mpsc::channel(8);
        let task = EngineTask {
            correlator: Correlator::new(self.terminals),
            reply: None,
            line_rx: self.line_rx,
            control_rx,
            unsolicited_tx: self.unsolicited_tx,
        };
        let join_handle = tokio::spawn(task.run().instrument(info_span!("correlation_engine")));

        EngineHandle {
            control_tx,
            join_handle,
        }
    }
}

/// Handle to a running engine task.
#[derive(Debug)]
pub struct EngineHandle {
    control_tx: mpsc::Sender<Control>,
    join_handle: JoinHandle<()>,
}

impl EngineHandle {
    /// Split into the control sender and the task's join handle.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Sender<Control>, JoinHandle<()>) {
        (self.control_tx, self.join_handle)
    }
}

struct EngineTask {
    correlator: Correlator,
    reply: Option<oneshot::Sender<Verdict>>,
    line_rx: mpsc::UnboundedReceiver<Line>,
    control_rx: mpsc::Receiver<Control>,
    unsolicited_tx: mpsc::Sender<Line>,
}

impl EngineTask {
    async fn run(mut self) {
        debug!("engine started");

        loop {
            let deadline = self.correlator.pending().map(PendingRequest::deadline);
            let cancel = self
                .correlator
                .pending()
                .map(|request| request.cancel_token().clone());

            tokio::select! {
                biased;

                control = self.control_rx.recv() => {
                    let Some(control) = control else {
                        debug!("engine: dispatcher gone, stopping");
                        self.settle(FailureReason::TransportClosed);
                        break;
                    };
                    self.on_control(control);
                }

                line = self.line_rx.recv() => {
                    let Some(line) = line else {
                        debug!("engine: line channel closed, stopping");
                        self.settle(FailureReason::TransportClosed);
                        break;
                    };
                    self.on_line(line);
                }

                () = until_deadline(deadline) => {
                    if let Some(verdict) = self.correlator.expire() {
                        info!(lines = verdict.lines().len(), "engine: command timed out");
                        self.deliver(verdict);
                    }
                }

                () = until_cancelled(cancel) => {
                    if let Some(verdict) = self.correlator.cancel() {
                        info!(lines = verdict.lines().len(), "engine: command cancelled");
                        self.deliver(verdict);
                    }
                }
            }
        }

        debug!("engine stopped");
    }

    fn on_control(&mut self, control: Control) {
        match control {
            Control::Begin {
                request,
                reply,
                ack,
            } => {
                // Anything already queued arrived before the command was written.
                while let Ok(line) = self.line_rx.try_recv() {
                    self.route_unsolicited(line);
                }

                // A caller that gave up waiting leaves its request behind.
                if self.reply.as_ref().is_some_and(oneshot::Sender::is_closed) {
                    debug!("engine: dropping request abandoned by its caller");
                    self.reply = None;
                    let _ = self.correlator.cancel();
                }

                let command = request.command().to_owned();
                let outcome = self.correlator.begin(request);
                if outcome.is_ok() {
                    debug!(command, "engine: awaiting terminal token");
                    self.reply = Some(reply);
                }
                if ack.send(outcome).is_err() {
                    debug!(command, "engine: dispatcher dropped begin ack");
                    if let Some(verdict) = self.correlator.cancel() {
                        self.deliver(verdict);
                    }
                }
            }
            Control::Arm => {
                debug!("engine: raw payload written, armed");
                if let Some(verdict) = self.correlator.arm() {
                    self.deliver(verdict);
                }
            }
            Control::Abort(reason) => {
                if let Some(verdict) = self.correlator.fail(reason) {
                    warn!(%reason, "engine: pending command aborted");
                    self.deliver(verdict);
                }
            }
        }
    }

    fn on_line(&mut self, line: Line) {
        match self.correlator.on_line(line) {
            Disposition::Unsolicited(line) => self.route_unsolicited(line),
            Disposition::Echo => debug!("engine: echo suppressed"),
            Disposition::Collected => {}
            Disposition::Held => debug!("engine: terminal token held until armed"),
            Disposition::Resolved(verdict) => {
                debug!(
                    success = verdict.is_success(),
                    lines = verdict.lines().len(),
                    "engine: command resolved"
                );
                self.deliver(verdict);
            }
        }
    }

    fn route_unsolicited(&self, line: Line) {
        debug!(line = %line, "engine: unsolicited line");
        match self.unsolicited_tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(line)) => {
                warn!(line = %line, "engine: unsolicited sink full, line not buffered");
            }
            Err(mpsc::error::TrySendError::Closed(line)) => {
                info!(line = %line, "engine: unsolicited line with no subscriber");
            }
        }
    }

    /// Deliver lines still queued, then fail whatever is pending.
    fn settle(&mut self, reason: FailureReason) {
        while let Ok(line) = self.line_rx.try_recv() {
            self.on_line(line);
        }
        if let Some(verdict) = self.correlator.fail(reason) {
            info!(%reason, lines = verdict.lines().len(), "engine: pending command failed");
            self.deliver(verdict);
        }
    }

    fn deliver(&mut self, verdict: Verdict) {
        match self.reply.take() {
            Some(reply) => {
                if reply.send(verdict).is_err() {
                    debug!("engine: caller stopped waiting for verdict");
                }
            }
            None => warn!("engine: verdict without a waiting caller"),
        }
    }
}

async fn until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn until_cancelled(token: Option<CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => future::pending().await,
    }
}
