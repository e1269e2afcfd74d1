#![forbid(unsafe_code)]

//! Reliable AT command/response correlation over a serial link.
//!
//! [`Modem`] writes one command at a time and collects the reply lines until
//! a terminal token (`OK`, `ERROR`), the deadline, cancellation, or loss of
//! the link resolves it into a [`Verdict`]. Lines arriving while no command
//! is pending are routed to an unsolicited sink.

pub mod config;
pub mod errors;
pub mod link;
pub mod logging;
pub mod models;
pub mod modem;
pub mod transport;

pub use config::ModemConfig;
pub use errors::{AppError, Result};
pub use models::{FailureReason, Line, SendOptions, Verdict};
pub use modem::{LinkState, Modem};
