//! Error types for sandbash

use crate::limits::LimitExceeded;
use thiserror::Error;

/// Result type alias using sandbash's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Sandbash error types.
///
/// Shell-level failures (a command exiting nonzero, an unset variable under
/// `nounset`, a bad glob under `failglob`) are *not* errors at this level;
/// they travel through exit statuses and captured stderr. This enum covers
/// the faults that abort a whole invocation or come from the host.
#[derive(Error, Debug)]
pub enum Error {
    /// Syntax error found while lexing or parsing the script.
    #[error("syntax error: {message} at line {line}")]
    Parse {
        message: String,
        /// 1-based source line the error was detected on.
        line: usize,
    },

    /// Internal execution fault (not a script-visible failure).
    #[error("execution error: {0}")]
    Execution(String),

    /// I/O error from the filesystem adapter.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource limit exceeded (commands, loop iterations, recursion, timeout).
    #[error(transparent)]
    Limit(#[from] LimitExceeded),
}

impl Error {
    /// Shorthand for a parse error.
    pub fn parse(message: impl Into<String>, line: usize) -> Self {
        Self::Parse {
            message: message.into(),
            line,
        }
    }

    /// Exit status a script sees when this error aborts the invocation.
    ///
    /// Parse and limit failures use status 2 by bash convention; host I/O
    /// faults map to 1.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Parse { .. } | Self::Limit(_) => 2,
            Self::Execution(_) | Self::Io(_) => 1,
        }
    }
}

/// Clamp an exit status into the 0..=255 range the way a real shell does:
/// wrap modulo 256, mapping negatives into the positive range.
pub fn normalize_status(status: i64) -> i32 {
    (status.rem_euclid(256)) as i32
}
