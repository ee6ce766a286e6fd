//! Storage engines behind the message store

mod memory;
mod redb;
mod unavailable;

pub use self::redb::RedbStorage;
pub use memory::MemoryStorage;
pub use unavailable::UnavailableStorage;

use canlink_core::{LoggedMessage, StorageError};
use chrono::{DateTime, Utc};

/// Minimal relational contract of a message table
///
/// Equivalent to one append-only table
/// `(id autoincrement, project_name, message_type, message, timestamp)`.
pub trait MessageStorage: Send + Sync {
    /// Insert one row and return its assigned id
    fn insert(
        &self,
        project_name: &str,
        message_type: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// All rows of a project, in insertion order
    fn select_by_project(&self, project_name: &str) -> Result<Vec<LoggedMessage>, StorageError>;
}
