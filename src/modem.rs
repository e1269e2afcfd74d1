//! Command dispatcher: the public `open` / `send` / `close` surface.
//!
//! A [`Modem`] owns one open link: the line reader task, the correlation
//! engine task, and the transport's write half. `send` is serialised by an
//! async mutex so at most one command is ever pending; the caller is
//! suspended on a `oneshot` until the engine resolves the command by
//! terminal token, deadline, cancellation, or link loss.
//!
//! # Send sequence
//!
//! 1. Take the send gate.
//! 2. Hand the [`PendingRequest`] to the engine and wait for its ack, so a
//!    reply can never race ahead of the request it belongs to.
//! 3. Write the command line (and, in raw trailer mode, the payload followed
//!    by the trailer byte, then arm the engine).
//! 4. Await the verdict.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ModemConfig;
use crate::link::codec::LineCodec;
use crate::link::engine::{Control, Engine, TerminalSet};
use crate::link::reader::{run_reader, ReaderExit};
use crate::link::writer::CommandWriter;
use crate::models::line::Line;
use crate::models::request::{PendingRequest, SendOptions};
use crate::models::verdict::{FailureReason, Verdict};
use crate::transport::{self, Transport};
use crate::{AppError, Result};

/// Lifecycle state of a [`Modem`] link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Reader and engine are running; commands may be sent.
    Open,
    /// The link was closed or the transport went away.
    Closed,
}

type SharedWriter = Arc<Mutex<Option<CommandWriter>>>;

/// How long `close` waits for buffered command bytes to drain.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Tasks and handles of one open link.
struct Connection {
    control_tx: mpsc::Sender<Control>,
    writer: SharedWriter,
    /// Fires on `close`; in-flight writes race against it.
    cancel: CancellationToken,
    /// Cancels the reader when the connection is dropped without `close`.
    shutdown: DropGuard,
    reader: JoinHandle<ReaderExit>,
    engine: JoinHandle<()>,
}

/// AT command link to a modem.
pub struct Modem {
    default_timeout: Duration,
    trailer_byte: u8,
    gate: Mutex<()>,
    connection: Mutex<Option<Connection>>,
    unsolicited: std::sync::Mutex<Option<mpsc::Receiver<Line>>>,
}

impl Modem {
    /// Open the serial port named in `config` and start the link.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `config` is invalid and
    /// `AppError::Transport` if the serial port cannot be acquired.
    pub async fn open(config: &ModemConfig) -> Result<Self> {
        config.validate()?;
        let stream = transport::open_serial(&config.serial)?;
        Ok(Self::with_transport(stream, config))
    }

    /// Start the link over an already-open transport.
    ///
    /// Spawns the line reader and correlation engine; must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn with_transport<T: Transport>(transport: T, config: &ModemConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let codec = LineCodec::from_config(&config.link);

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (unsolicited_tx, unsolicited_rx) =
            mpsc::channel(config.link.unsolicited_capacity.max(1));

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(
            run_reader(read_half, codec.clone(), line_tx, cancel.clone())
                .instrument(info_span!("line_reader")),
        );
        let (control_tx, engine) = Engine::new(
            TerminalSet::from_config(&config.terminals),
            line_rx,
            unsolicited_tx,
        )
        .spawn()
        .into_parts();

        let writer = CommandWriter::new(Box::new(write_half), codec);
        info!("modem link open");

        Self {
            default_timeout: config.link.timeout(),
            trailer_byte: config.link.trailer_byte,
            gate: Mutex::new(()),
            connection: Mutex::new(Some(Connection {
                control_tx,
                writer: Arc::new(Mutex::new(Some(writer))),
                cancel: cancel.clone(),
                shutdown: cancel.drop_guard(),
                reader,
                engine,
            })),
            unsolicited: std::sync::Mutex::new(Some(unsolicited_rx)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub async fn state(&self) -> LinkState {
        match self.connection.lock().await.as_ref() {
            Some(connection) if !connection.engine.is_finished() => LinkState::Open,
            _ => LinkState::Closed,
        }
    }

    /// Take the receiver of lines that arrived while no command was pending.
    ///
    /// Returns `None` after the first call. Lines arriving once the buffer is
    /// full, or after the receiver is dropped, are logged instead.
    #[must_use]
    pub fn take_unsolicited(&self) -> Option<mpsc::Receiver<Line>> {
        self.unsolicited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Send `command` with the default deadline and wait for its verdict.
    ///
    /// # Errors
    ///
    /// See [`send_with`](Self::send_with).
    pub async fn send(&self, command: &str) -> Result<Verdict> {
        self.send_with(command, SendOptions::default()).await
    }

    /// Send `command`, then `payload` closed by the trailer byte (e.g. message
    /// text for `AT+CMGS`), and wait for the verdict.
    ///
    /// # Errors
    ///
    /// See [`send_with`](Self::send_with).
    pub async fn send_payload(&self, command: &str, payload: &str) -> Result<Verdict> {
        self.send_with(command, SendOptions::new().trailer(payload))
            .await
    }

    /// Send `command` with per-command options and wait for its verdict.
    ///
    /// Never returns before the engine has resolved the command. Reply-level
    /// failures (timeout, modem error, cancellation, link loss) come back as
    /// `Ok(Verdict::Failure { .. })` with the partial reply.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidCommand` if `command` is empty or spans lines, or
    ///   the payload contains the trailer byte.
    /// - `AppError::NotOpen` if the link was closed or the transport is gone.
    /// - `AppError::Busy` if the engine still holds another request.
    pub async fn send_with(&self, command: &str, options: SendOptions) -> Result<Verdict> {
        let command = validate_command(command)?;
        if let Some(payload) = options.trailer.as_deref() {
            self.validate_payload(payload)?;
        }

        let span = info_span!("send", command);
        self.dispatch(command, options).instrument(span).await
    }

    /// Stop the reader, fail any pending command with `TransportClosed`, and
    /// release the transport.
    ///
    /// Idempotent and safe to call while a `send` is in flight; that `send`
    /// returns a `TransportClosed` failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if a background task panicked.
    pub async fn close(&self) -> Result<()> {
        let Some(connection) = self.connection.lock().await.take() else {
            debug!("close on already closed link");
            return Ok(());
        };

        let Connection {
            control_tx,
            writer,
            cancel: _,
            shutdown,
            reader,
            engine,
        } = connection;

        // Cancelling the reader drops the line sender; the engine then
        // delivers what is queued, fails the pending command, and exits.
        drop(shutdown);
        let exit = reader
            .await
            .map_err(|e| AppError::Transport(format!("line reader task failed: {e}")))?;
        debug!(?exit, "line reader joined");

        drop(control_tx);
        engine
            .await
            .map_err(|e| AppError::Transport(format!("engine task failed: {e}")))?;

        // A send still holding the writer has already been cancelled; its
        // clone of the handle releases the write half when it returns.
        let taken = match writer.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                debug!("writer busy at close, leaving it to the cancelled send");
                None
            }
        };
        if let Some(mut writer) = taken {
            match time::timeout(WRITER_SHUTDOWN_GRACE, writer.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%err, "transport shutdown failed"),
                Err(_) => warn!("transport did not drain before shutdown, dropping it"),
            }
        }

        info!("modem link closed");
        Ok(())
    }

    async fn dispatch(&self, command: &str, options: SendOptions) -> Result<Verdict> {
        let _turn = self.gate.lock().await;

        let (control_tx, writer, closing) = {
            let guard = self.connection.lock().await;
            let connection = guard
                .as_ref()
                .filter(|connection| !connection.engine.is_finished())
                .ok_or(AppError::NotOpen)?;
            (
                connection.control_tx.clone(),
                Arc::clone(&connection.writer),
                connection.cancel.clone(),
            )
        };

        let SendOptions {
            timeout,
            cancel,
            trailer,
        } = options;
        let request = PendingRequest::new(
            command,
            trailer.clone(),
            timeout.unwrap_or(self.default_timeout),
            cancel.unwrap_or_default(),
        );

        let (reply_tx, reply_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        let begin = Control::Begin {
            request,
            reply: reply_tx,
            ack: ack_tx,
        };
        if control_tx.send(begin).await.is_err() {
            debug!("engine gone before command was registered");
            return Ok(link_lost());
        }
        match ack_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Ok(link_lost()),
        }

        let written = tokio::select! {
            biased;
            () = closing.cancelled() => {
                debug!("link closed while writing, awaiting verdict");
                None
            }
            written = write_request(&writer, command, trailer.as_deref()) => Some(written),
        };

        match written {
            None => {}
            Some(Ok(())) if trailer.is_some() => {
                let _ = control_tx.send(Control::Arm).await;
            }
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!(%err, "command write failed");
                let _ = control_tx
                    .send(Control::Abort(FailureReason::TransportClosed))
                    .await;
            }
        }

        let verdict = reply_rx.await.unwrap_or_else(|_| link_lost());
        debug!(
            success = verdict.is_success(),
            lines = verdict.lines().len(),
            "command finished"
        );
        Ok(verdict)
    }

    fn validate_payload(&self, payload: &str) -> Result<()> {
        if payload.as_bytes().contains(&self.trailer_byte) {
            return Err(AppError::InvalidCommand(format!(
                "payload contains the trailer byte 0x{:02X}",
                self.trailer_byte
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Modem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modem")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Trim `command` and reject text that cannot be sent as one line.
fn validate_command(command: &str) -> Result<&str> {
    let command = command.trim();
    if command.is_empty() {
        return Err(AppError::InvalidCommand("command text is empty".into()));
    }
    if command.contains(['\r', '\n']) {
        return Err(AppError::InvalidCommand(
            "command text must be a single line".into(),
        ));
    }
    Ok(command)
}

async fn write_request(writer: &SharedWriter, command: &str, payload: Option<&str>) -> Result<()> {
    let mut guard = writer.lock().await;
    let writer = guard
        .as_mut()
        .ok_or_else(|| AppError::Transport("link closed".into()))?;

    writer.write_command(command).await?;
    if let Some(payload) = payload {
        writer.write_payload(payload).await?;
    }
    Ok(())
}

fn link_lost() -> Verdict {
    Verdict::failure(Vec::new(), FailureReason::TransportClosed)
}
