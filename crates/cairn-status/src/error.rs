//! Status monitor errors.

use thiserror::Error;

/// Errors raised while polling or decoding server status.
#[derive(Debug, Error)]
pub enum StatusError {
    /// A status line did not follow the wire format.
    #[error("Malformed status line {line:?}: {reason}")]
    Malformed { line: String, reason: String },

    /// Socket error.
    #[error("Status connection error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the status connection.
    #[error("Status connection closed by server")]
    Closed,
}

impl StatusError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error only spoils the current poll cycle.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}
