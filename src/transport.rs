//! Byte-stream transports the link can run over.
//!
//! Any duplex tokio stream works: a serial port in production, an in-memory
//! [`tokio::io::duplex`] pipe in tests, or a TCP socket to a serial bridge.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::info;

use crate::config::SerialConfig;
use crate::{AppError, Result};

/// Duplex byte stream carrying the AT dialogue.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Open the configured serial device as 8N1 without flow control.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`AppError::Transport`] if the device cannot be opened.
pub fn open_serial(config: &SerialConfig) -> Result<SerialStream> {
    let stream = tokio_serial::new(config.port.as_str(), config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|err| AppError::Transport(format!("cannot open {}: {err}", config.port)))?;

    info!(port = %config.port, baud_rate = config.baud_rate, "serial port opened");
    Ok(stream)
}
