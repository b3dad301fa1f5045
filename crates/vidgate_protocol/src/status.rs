//! Terminal statuses written back to producers.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// The one status string a producer receives at the end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    /// Upload finalized and admitted to the hand-off queue.
    Success,
    /// Queue at capacity (pre-check or admission).
    QueueFull,
    /// Content hash already finalized on disk.
    DuplicateFile,
    /// Transcoder timed out, failed, or could not be spawned.
    CompressionFailed,
    /// Short read, declared-size mismatch, or I/O failure while receiving.
    TransferError,
    /// Anything else: rename failure, filesystem errors, unexpected state.
    InternalError,
}

impl TerminalStatus {
    /// Wire form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalStatus::Success => "SUCCESS",
            TerminalStatus::QueueFull => "QUEUE_FULL",
            TerminalStatus::DuplicateFile => "DUPLICATE_FILE",
            TerminalStatus::CompressionFailed => "COMPRESSION_FAILED",
            TerminalStatus::TransferError => "TRANSFER_ERROR",
            TerminalStatus::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, TerminalStatus::Success)
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminalStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(TerminalStatus::Success),
            "QUEUE_FULL" => Ok(TerminalStatus::QueueFull),
            "DUPLICATE_FILE" => Ok(TerminalStatus::DuplicateFile),
            "COMPRESSION_FAILED" => Ok(TerminalStatus::CompressionFailed),
            "TRANSFER_ERROR" => Ok(TerminalStatus::TransferError),
            "INTERNAL_ERROR" => Ok(TerminalStatus::InternalError),
            other => Err(ProtocolError::UnknownStatus(other.to_string())),
        }
    }
}
