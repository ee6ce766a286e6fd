//! Error taxonomy for CAN bus sessions

use std::fmt;

use thiserror::Error;

use crate::models::{ConnectionState, InterfaceDescriptor};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors reported by a transport capability or one of its handles
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The interface could not be opened (hardware absent, driver missing)
    #[error("Interface unavailable: {0}")]
    Unavailable(String),

    /// The transport is closed or the peer went away
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

/// Malformed requests, rejected before any transport call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload longer than the active transport accepts
    #[error("Payload of {len} bytes exceeds the transport maximum of {max} bytes")]
    PayloadTooLong { len: usize, max: usize },

    /// Arbitration id does not fit the 11-bit or 29-bit id space
    #[error("Arbitration id 0x{id:X} out of range for {} id", id_kind(.extended))]
    IdOutOfRange { id: u32, extended: bool },

    /// Payload text could not be parsed
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Project name must not be empty")]
    EmptyProjectName,
}

fn id_kind(extended: &bool) -> &'static str {
    if *extended {
        "extended"
    } else {
        "standard"
    }
}

/// Persistence failures; never fatal to bus operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A stored record could not be decoded
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: u64, reason: String },

    /// The storage engine could not be opened
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Project name must not be empty")]
    EmptyProjectName,
}

/// One failed connection attempt during fallback enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub descriptor: InterfaceDescriptor,
    pub error: TransportError,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.descriptor, self.error)
    }
}

/// Every candidate in fallback mode failed to open
///
/// Carries one entry per attempted candidate, in the order they were tried,
/// so callers can tell which hardware was missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustedError {
    pub attempts: Vec<CandidateFailure>,
}

impl fmt::Display for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("No interface candidates to try");
        }
        write!(f, "All {} interface candidates failed", self.attempts.len())?;
        for attempt in &self.attempts {
            write!(f, "; {}", attempt)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExhaustedError {}

/// Errors surfaced by the session manager to its callers
#[derive(Debug, Error)]
pub enum SessionError {
    /// A single explicitly chosen interface failed to open
    #[error("Interface {descriptor} unavailable: {source}")]
    InterfaceUnavailable {
        descriptor: InterfaceDescriptor,
        #[source]
        source: TransportError,
    },

    /// No interface with this name among the known candidates
    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An operation needing the transport handle ran outside `Connected`
    #[error("Not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    /// `connect` was called while a connection is already active
    #[error("Already connected to {0}")]
    AlreadyConnected(InterfaceDescriptor),

    /// The operation was interrupted by a disconnect
    #[error("Operation cancelled by disconnect")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Whether this error means the caller should pick another interface
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            SessionError::InterfaceUnavailable { .. }
                | SessionError::UnknownInterface(_)
                | SessionError::Exhausted(_)
        )
    }
}
