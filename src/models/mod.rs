//! Domain model module declarations.

pub mod line;
pub mod request;
pub mod verdict;

pub use line::Line;
pub use request::{PendingRequest, SendOptions};
pub use verdict::{FailureReason, Verdict};
