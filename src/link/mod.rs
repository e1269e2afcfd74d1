//! Serial link plumbing between the transport and the dispatcher.
//!
//! - `codec`: line framing ([`LineCodec`](codec::LineCodec)) for inbound text
//!   and outbound commands / raw payloads.
//! - `reader`: background task turning the byte stream into [`Line`](crate::models::Line)s.
//! - `engine`: the correlation state machine and its task.
//! - `writer`: flushed writes of command lines and payloads.

pub mod codec;
pub mod engine;
pub mod reader;
pub mod writer;
