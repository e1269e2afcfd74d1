//! Line codec for the modem's serial stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length. Inbound, each `\n`-terminated frame is trimmed and blank frames
//! are skipped. Content problems never surface as errors: a line that is not
//! valid UTF-8 or exceeds the limit comes out as [`Inbound::InvalidUtf8`] or
//! [`Inbound::Overlong`] so the reader can log it and keep going.
//!
//! Outbound, a command is written followed by the configured line terminator,
//! while a raw payload (multi-stage commands such as `AT+CMGS`) is closed by
//! the trailer control byte instead.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use quectel_at::link::codec::LineCodec;
//!
//! let lines = FramedRead::new(read_half, LineCodec::from_config(&config.link));
//! ```

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::config::LinkConfig;
use crate::{AppError, Result};

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Trimmed, non-empty line text.
    Line(String),
    /// A line that was not valid UTF-8.
    InvalidUtf8 {
        /// Number of bytes dropped, terminator included.
        len: usize,
    },
    /// A line longer than the limit; it is skipped up to the next `\n`.
    Overlong,
}

/// One outbound write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Command text, written followed by the line terminator.
    Command(String),
    /// Raw payload, written followed by the trailer byte.
    Payload(String),
}

/// Line-oriented codec with a bounded line length.
#[derive(Debug, Clone)]
pub struct LineCodec {
    lines: LinesCodec,
    line_terminator: Vec<u8>,
    trailer_byte: u8,
}

impl LineCodec {
    /// Create a codec with explicit framing parameters.
    #[must_use]
    pub fn new(max_line_bytes: usize, line_terminator: &str, trailer_byte: u8) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_bytes),
            line_terminator: line_terminator.as_bytes().to_vec(),
            trailer_byte,
        }
    }

    /// Create a codec from the `[link]` configuration section.
    #[must_use]
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(
            config.max_line_bytes,
            &config.line_terminator,
            config.trailer_byte,
        )
    }

    /// Longest line accepted before discarding.
    #[must_use]
    pub fn max_line_bytes(&self) -> usize {
        self.lines.max_length()
    }

    fn next_frame(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<Inbound>> {
        loop {
            let before = src.len();
            let frame = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };

            match frame {
                Ok(Some(text)) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(Some(Inbound::Line(text.to_owned())));
                    }
                }
                Ok(None) => return Ok(None),
                // The inner codec is now discarding up to the next newline.
                Err(LinesCodecError::MaxLineLengthExceeded) => return Ok(Some(Inbound::Overlong)),
                // Raised after the frame was consumed.
                Err(LinesCodecError::Io(err)) if err.kind() == io::ErrorKind::InvalidData => {
                    return Ok(Some(Inbound::InvalidUtf8 {
                        len: before - src.len(),
                    }));
                }
                Err(LinesCodecError::Io(err)) => return Err(err.into()),
            }
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

impl Decoder for LineCodec {
    type Item = Inbound;
    type Error = AppError;

    /// Decode the next complete line from `src`.
    ///
    /// Returns `Ok(None)` while no terminator is buffered yet. Never returns
    /// `Err` for content problems.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        self.next_frame(src, false)
    }

    /// Flush an unterminated final line when the stream ends.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        self.next_frame(src, true)
    }
}

impl Encoder<Outbound> for LineCodec {
    type Error = AppError;

    /// Encode a command line or a raw payload into `dst`.
    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<()> {
        match item {
            Outbound::Command(text) => {
                dst.reserve(text.len() + self.line_terminator.len());
                dst.put_slice(text.as_bytes());
                dst.put_slice(&self.line_terminator);
            }
            Outbound::Payload(text) => {
                dst.reserve(text.len() + 1);
                dst.put_slice(text.as_bytes());
                dst.put_u8(self.trailer_byte);
            }
        }
        Ok(())
    }
}
