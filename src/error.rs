//! Error types shared across the harness.
//!
//! Only transport loss and cancellation ever reach the caller of the
//! controller. Timeouts and bad frames end up in a case's `Status` instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Decoding failures reported by the packet codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Not enough bytes for a full frame yet. Keep reading.
    #[error("incomplete frame: have {have} of {need} bytes")]
    Incomplete { have: usize, need: usize },
    /// A full frame arrived but its fields are invalid.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Failures of the byte link itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port could not be opened or configured.
    #[error("failed to open '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    /// The read deadline passed without any bytes arriving.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The link was closed by the other end or has been closed locally.
    #[error("link closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True for conditions that end the session rather than a single case.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::DeadlineExceeded)
    }
}

/// Conditions that abort a whole session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("link lost: {0}")]
    LinkLost(#[source] TransportError),
    #[error("session cancelled")]
    Cancelled,
}

/// Problems with the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration has no test cases")]
    NoCases,
    #[error("duplicate test case id '{0}'")]
    DuplicateId(String),
    #[error("test case '{id}': {reason}")]
    InvalidCase { id: String, reason: String },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures while writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
