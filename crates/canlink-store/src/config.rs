//! Storage configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where logged messages are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, lost on exit
    Memory,
    /// Redb database file
    File {
        #[serde(default = "default_path")]
        path: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: default_path(),
        }
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("can_messages.redb")
}
