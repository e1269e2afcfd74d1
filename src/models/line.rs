//! Decoded text line produced by the line reader.

use std::fmt::{Display, Formatter};

/// One decoded, trimmed, non-empty line received from the modem.
///
/// Lines are immutable once produced; the engine only moves them between
/// the pending reply, the unsolicited sink, or the echo bin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line(String);

impl Line {
    /// Wrap decoded text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the line text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the line text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Line {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Line {
    fn from(text: String) -> Self {
        Self(text)
    }
}
