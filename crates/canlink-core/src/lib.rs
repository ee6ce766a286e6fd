//! canlink-core - Core types and traits for CAN bus sessions
//!
//! This crate provides the data model shared by every layer (descriptors,
//! frames, connection state, counters, logged messages), the transport
//! capability traits implemented once per hardware family, the error
//! taxonomy, and the status line projection used by front-ends.

pub mod error;
pub mod models;
pub mod status;
pub mod transport;

pub use error::{
    CandidateFailure, ExhaustedError, SessionError, SessionResult, StorageError, TransportError,
    ValidationError,
};
pub use models::*;
pub use transport::{TransportCapability, TransportHandle};
