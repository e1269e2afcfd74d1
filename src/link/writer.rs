//! Command write path.
//!
//! Command text goes from the dispatcher straight to the transport; the
//! engine never writes. Each write is flushed before returning so the
//! dispatcher knows the bytes have left the process before it arms the
//! engine for a multi-stage command.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use crate::link::codec::{LineCodec, Outbound};
use crate::{AppError, Result};

/// Type-erased write half of a transport.
pub type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes command lines and raw payloads to the transport.
pub struct CommandWriter {
    sink: FramedWrite<BoxedWrite, LineCodec>,
}

impl CommandWriter {
    /// Wrap the write half of a transport.
    #[must_use]
    pub fn new(sink: BoxedWrite, codec: LineCodec) -> Self {
        Self {
            sink: FramedWrite::new(sink, codec),
        }
    }

    /// Write `command` followed by the line terminator and flush.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the write or flush fails.
    pub async fn write_command(&mut self, command: &str) -> Result<()> {
        debug!(command, "writer: sending command");
        self.write(Outbound::Command(command.to_owned())).await
    }

    /// Write `payload` followed by the trailer byte and flush.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the write or flush fails.
    pub async fn write_payload(&mut self, payload: &str) -> Result<()> {
        debug!(len = payload.len(), "writer: sending raw payload");
        self.write(Outbound::Payload(payload.to_owned())).await
    }

    /// Flush and shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| AppError::Transport(format!("shutdown failed: {e}")))
    }

    async fn write(&mut self, item: Outbound) -> Result<()> {
        self.sink.send(item).await.map_err(|e| {
            warn!(error = %e, "writer: write to transport failed");
            AppError::Transport(format!("write failed: {e}"))
        })
    }
}

impl std::fmt::Debug for CommandWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandWriter").finish_non_exhaustive()
    }
}
