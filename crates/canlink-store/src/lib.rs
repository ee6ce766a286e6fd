//! canlink-store - Append-only message log for CAN bus sessions
//!
//! Observed frames and status changes are appended per project and read
//! back in insertion order. Records are never updated or deleted here;
//! retention is left to whoever owns the storage.
//!
//! ```ignore
//! use canlink_store::MessageStore;
//!
//! let store = MessageStore::in_memory();
//! store.append("ProjectA", "status", "connected")?;
//! let history = store.query("ProjectA")?;
//! ```

pub mod config;
pub mod storage;
mod store;

pub use config::StoreConfig;
pub use storage::{MemoryStorage, MessageStorage, RedbStorage, UnavailableStorage};
pub use store::MessageStore;
