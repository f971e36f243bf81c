//! Error types for visicheck.
//!
//! Every variant here is fatal for the role that hits it. Components return
//! errors; whoever drives the roles decides to abort.

use std::fmt;
use std::io;

/// Why a completion could not be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFailure {
    /// The transport reported an error syndrome.
    Syndrome(u8),
    /// A completion arrived for a different work request.
    Mismatch { got: u64 },
    /// Nothing was outstanding, so no completion can ever arrive.
    NothingOutstanding,
}

/// Error type for visicheck operations.
#[derive(Debug)]
pub enum Error {
    /// IO error from the underlying transport.
    Io(io::Error),
    /// Connection setup or memory registration failed.
    SetupFailed { stage: &'static str, reason: String },
    /// The transport refused to enqueue a write.
    SubmitFailed { wr_id: u64, reason: String },
    /// A write did not complete successfully.
    CompletionFailed {
        wr_id: u64,
        reason: CompletionFailure,
    },
    /// The run was cancelled before setup finished.
    Cancelled,
}

impl Error {
    pub fn setup(stage: &'static str, reason: impl Into<String>) -> Self {
        Error::SetupFailed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn submit(wr_id: u64, reason: impl Into<String>) -> Self {
        Error::SubmitFailed {
            wr_id,
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl fmt::Display for CompletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionFailure::Syndrome(s) => write!(f, "error syndrome {:#04x}", s),
            CompletionFailure::Mismatch { got } => {
                write!(f, "completion for unexpected wr_id {}", got)
            }
            CompletionFailure::NothingOutstanding => write!(f, "no write outstanding"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::SetupFailed { stage, reason } => {
                write!(f, "Setup failed during {}: {}", stage, reason)
            }
            Error::SubmitFailed { wr_id, reason } => {
                write!(f, "Submit of wr_id {} failed: {}", wr_id, reason)
            }
            Error::CompletionFailed { wr_id, reason } => {
                write!(f, "Completion of wr_id {} failed: {}", wr_id, reason)
            }
            Error::Cancelled => write!(f, "Run cancelled before setup finished"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type for visicheck operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_write() {
        let e = Error::CompletionFailed {
            wr_id: 3,
            reason: CompletionFailure::Syndrome(0x13),
        };
        assert_eq!(e.to_string(), "Completion of wr_id 3 failed: error syndrome 0x13");

        let e = Error::setup("connect", "queue pair already connected");
        assert_eq!(
            e.to_string(),
            "Setup failed during connect: queue pair already connected"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        use std::error::Error as _;
        let e = Error::from(io::Error::other("boom"));
        assert!(e.source().is_some());
        assert!(!e.is_cancelled());
    }
}
