//! Logged message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message types written by the session recorder
pub mod message_type {
    pub const STATUS: &str = "status";
    pub const SENT: &str = "sent";
    pub const RECEIVED: &str = "received";
}

/// One persisted record of a project's message history
///
/// Ids are assigned in insertion order, so sorting by id is the same as
/// sorting by insertion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub id: u64,
    pub project_name: String,
    pub message_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
