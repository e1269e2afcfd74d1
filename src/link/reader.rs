//! Line reader task.
//!
//! Drives a [`FramedRead`] over the transport's read half and forwards every
//! decoded [`Line`] to the correlation engine through an unbounded
//! [`mpsc`] channel. The reader never waits on the engine, so a busy engine
//! cannot stall the serial stream, and channel order is arrival order.
//!
//! Undecodable frames (invalid UTF-8, over-long lines) are logged and skipped;
//! they never stop the reader.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::link::codec::{Inbound, LineCodec};
use crate::models::line::Line;

/// Why the reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The transport reached end of stream.
    Eof,
    /// The transport returned an I/O error.
    Failed(String),
    /// The connection was closed.
    Cancelled,
    /// The engine dropped its receiver.
    EngineGone,
}

/// Line reader task: reads framed lines from `source` until EOF, an I/O
/// error, or cancellation, pushing each onto `line_tx`.
///
/// Dropping `line_tx` on return is what tells the engine the transport is
/// gone; lines already queued stay deliverable.
pub async fn run_reader<R>(
    source: R,
    codec: LineCodec,
    line_tx: mpsc::UnboundedSender<Line>,
    cancel: CancellationToken,
) -> ReaderExit
where
    R: AsyncRead + Unpin + Send,
{
    let codec_limit = codec.max_line_bytes();
    let mut framed = FramedRead::new(source, codec);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("line reader: cancellation received, stopping");
                return ReaderExit::Cancelled;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("line reader: EOF detected");
                        return ReaderExit::Eof;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "line reader: transport error, stopping");
                        return ReaderExit::Failed(e.to_string());
                    }

                    Some(Ok(Inbound::InvalidUtf8 { len })) => {
                        warn!(len, "line reader: line is not valid UTF-8, discarded");
                    }

                    Some(Ok(Inbound::Overlong)) => {
                        warn!(
                            max = codec_limit,
                            "line reader: line exceeds limit, discarded"
                        );
                    }

                    Some(Ok(Inbound::Line(text))) => {
                        trace!(line = %text, "line reader: line received");
                        if line_tx.send(Line::new(text)).is_err() {
                            debug!("line reader: engine receiver closed, stopping");
                            return ReaderExit::EngineGone;
                        }
                    }
                }
            }
        }
    }
}
