//! Per-project message store

use std::sync::Arc;

use canlink_core::{LoggedMessage, StorageError};
use chrono::Utc;
use tracing::debug;

use crate::config::StoreConfig;
use crate::storage::{MemoryStorage, MessageStorage, RedbStorage, UnavailableStorage};

/// Append-only message log, queryable by project name
///
/// Exposes no update or delete operation.
#[derive(Clone)]
pub struct MessageStore {
    storage: Arc<dyn MessageStorage>,
}

impl MessageStore {
    pub fn new(storage: Arc<dyn MessageStorage>) -> Self {
        Self { storage }
    }

    /// Store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Open the storage described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        match config {
            StoreConfig::Memory => Ok(Self::in_memory()),
            StoreConfig::File { path } => Ok(Self::new(Arc::new(RedbStorage::open(path)?))),
        }
    }

    /// Store whose every call fails with `reason`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(Arc::new(UnavailableStorage::new(reason)))
    }

    /// Append one message; the id and timestamp are assigned here
    pub fn append(
        &self,
        project_name: &str,
        message_type: &str,
        message: &str,
    ) -> Result<LoggedMessage, StorageError> {
        if project_name.trim().is_empty() {
            return Err(StorageError::EmptyProjectName);
        }

        let timestamp = Utc::now();
        let id = self
            .storage
            .insert(project_name, message_type, message, timestamp)?;
        debug!(id, project = project_name, message_type, "Message logged");

        Ok(LoggedMessage {
            id,
            project_name: project_name.to_string(),
            message_type: message_type.to_string(),
            message: message.to_string(),
            timestamp,
        })
    }

    /// Messages of a project, ascending by id (empty for unknown projects)
    pub fn query(&self, project_name: &str) -> Result<Vec<LoggedMessage>, StorageError> {
        let mut rows = self.storage.select_by_project(project_name)?;
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore").finish_non_exhaustive()
    }
}
