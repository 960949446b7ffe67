//! Core error types for APDU operations
//!
//! Framing errors live in [`Error`]; errors raised by a reader while talking to
//! the card live in [`TransportError`] so that callers can react to tag loss
//! without inspecting strings.

use thiserror::Error;

/// Errors raised while building or parsing APDUs
#[derive(Debug, Error)]
pub enum Error {
    /// A command was too short or its Lc did not match the payload
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// A command payload does not fit the Lc field
    #[error("Command payload too long: {0} bytes")]
    PayloadTooLong(usize),

    /// A response did not contain a status word
    #[error("Incomplete response: {0} bytes")]
    IncompleteResponse(usize),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors reported by a [`CardReader`](crate::CardReader)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The tag left the field while an exchange was in flight
    #[error("Tag lost")]
    TagLost,

    /// No tag is currently connected
    #[error("No tag connected")]
    NotConnected,

    /// The reader was closed and cannot be used anymore
    #[error("Reader closed")]
    Closed,

    /// The exchange did not complete in time
    #[error("Operation timed out")]
    Timeout,

    /// Reader specific failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Whether the error can be recovered by waiting for the tag to come back
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::TagLost | Self::NotConnected)
    }
}
