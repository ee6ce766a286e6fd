//! In-memory storage

use canlink_core::{LoggedMessage, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::MessageStorage;

/// Storage kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    rows: RwLock<Vec<LoggedMessage>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl MessageStorage for MemoryStorage {
    fn insert(
        &self,
        project_name: &str,
        message_type: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut rows = self.rows.write();
        let id = rows.last().map(|row| row.id + 1).unwrap_or(1);
        rows.push(LoggedMessage {
            id,
            project_name: project_name.to_string(),
            message_type: message_type.to_string(),
            message: message.to_string(),
            timestamp,
        });
        Ok(id)
    }

    fn select_by_project(&self, project_name: &str) -> Result<Vec<LoggedMessage>, StorageError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| row.project_name == project_name)
            .cloned()
            .collect())
    }
}
