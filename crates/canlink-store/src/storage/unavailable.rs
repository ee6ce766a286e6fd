//! Placeholder for a storage engine that could not be opened

use canlink_core::{LoggedMessage, StorageError};
use chrono::{DateTime, Utc};

use super::MessageStorage;

/// Fails every call with the reason the real engine could not open
///
/// Lets a session run its bus operations while logging reports errors.
#[derive(Debug, Clone)]
pub struct UnavailableStorage {
    reason: String,
}

impl UnavailableStorage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl MessageStorage for UnavailableStorage {
    fn insert(
        &self,
        _project_name: &str,
        _message_type: &str,
        _message: &str,
        _timestamp: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        Err(StorageError::Unavailable(self.reason.clone()))
    }

    fn select_by_project(&self, _project_name: &str) -> Result<Vec<LoggedMessage>, StorageError> {
        Err(StorageError::Unavailable(self.reason.clone()))
    }
}
