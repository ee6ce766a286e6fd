//! Redb-backed durable storage
//!
//! Every insert is its own write transaction, so a crash or a full disk
//! leaves either the whole row or nothing.

use std::fs;
use std::path::{Path, PathBuf};

use canlink_core::{LoggedMessage, StorageError};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::MessageStorage;

/// Table: messages
/// Key: assigned id
/// Value: JSON-encoded `LoggedMessage`
const MESSAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("messages");

/// Message table in a Redb database file
pub struct RedbStorage {
    path: PathBuf,
    db: Database,
}

impl RedbStorage {
    /// Open or create the database at `path`
    ///
    /// Ids continue after the highest id already stored.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path).map_err(db_error)?;

        let txn = db.begin_write().map_err(db_error)?;
        {
            let _ = txn.open_table(MESSAGES).map_err(db_error)?;
        }
        txn.commit().map_err(db_error)?;

        debug!(path = %path.display(), "Opened message database");
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageStorage for RedbStorage {
    fn insert(
        &self,
        project_name: &str,
        message_type: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let txn = self.db.begin_write().map_err(db_error)?;

        let id = {
            let mut table = txn.open_table(MESSAGES).map_err(db_error)?;

            let id = match table.last().map_err(db_error)? {
                Some((key, _)) => key.value() + 1,
                None => 1,
            };

            let row = LoggedMessage {
                id,
                project_name: project_name.to_string(),
                message_type: message_type.to_string(),
                message: message.to_string(),
                timestamp,
            };
            let bytes = serde_json::to_vec(&row).map_err(|e| StorageError::Encode(e.to_string()))?;

            table.insert(id, bytes.as_slice()).map_err(db_error)?;
            id
        };

        txn.commit().map_err(db_error)?;
        Ok(id)
    }

    fn select_by_project(&self, project_name: &str) -> Result<Vec<LoggedMessage>, StorageError> {
        let txn = self.db.begin_read().map_err(db_error)?;
        let table = txn.open_table(MESSAGES).map_err(db_error)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(db_error)? {
            let (key, value) = entry.map_err(db_error)?;
            let row: LoggedMessage =
                serde_json::from_slice(value.value()).map_err(|e| StorageError::Corrupt {
                    id: key.value(),
                    reason: e.to_string(),
                })?;
            if row.project_name == project_name {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

fn db_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}
