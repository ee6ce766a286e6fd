//! Session configuration
//!
//! Everything has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! project = "bench"
//! probe = true
//!
//! [session]
//! send_timeout_ms = 1000
//! receive_timeout_ms = 1000
//!
//! [[candidates]]
//! name = "PCAN USB 1"
//! kind = "pcan"
//! channel = "PCAN_USBBUS1"
//!
//! [[candidates]]
//! name = "Bench bus"
//! kind = "socketcan"
//! channel = "can0"
//!
//! [store]
//! type = "file"
//! path = "can_messages.redb"
//! ```

use std::path::Path;
use std::time::Duration;

use canlink_core::{Channel, InterfaceDescriptor, TransportKind};
use canlink_store::StoreConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration of a CAN session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanlinkConfig {
    /// Project that observed frames are logged under
    #[serde(default = "default_project")]
    pub project: String,
    /// Session timing and event settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Connection candidates, tried in order in fallback mode
    #[serde(default = "default_candidates")]
    pub candidates: Vec<InterfaceDescriptor>,
    /// Prepend probed hardware channels to the candidate list
    #[serde(default = "default_true")]
    pub probe: bool,
    /// Message log storage
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for CanlinkConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            session: SessionConfig::default(),
            candidates: default_candidates(),
            probe: default_true(),
            store: StoreConfig::default(),
        }
    }
}

impl CanlinkConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Find a candidate by descriptor name (case-insensitive)
    pub fn candidate(&self, name: &str) -> Option<&InterfaceDescriptor> {
        self.candidates
            .iter()
            .find(|desc| desc.name().eq_ignore_ascii_case(name))
    }
}

/// Timing and event settings of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound for one frame write
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    /// Default wait used by front-ends that do not pass their own timeout
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,
    /// Capacity of the session event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Log sent and received frames to the message store
    #[serde(default = "default_true")]
    pub record_frames: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout(),
            receive_timeout_ms: default_receive_timeout(),
            event_capacity: default_event_capacity(),
            record_frames: default_true(),
        }
    }
}

impl SessionConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

fn default_project() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_send_timeout() -> u64 {
    1000
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    256
}

/// The interfaces a bench setup usually has, most specific first
pub fn default_candidates() -> Vec<InterfaceDescriptor> {
    vec![
        InterfaceDescriptor::new("PCAN USB 1", TransportKind::Pcan, "PCAN_USBBUS1"),
        InterfaceDescriptor::new("Kvaser 0", TransportKind::Kvaser, Channel::Index(0)),
        InterfaceDescriptor::new("SocketCAN can0", TransportKind::SocketCan, "can0"),
        InterfaceDescriptor::new("Virtual CAN", TransportKind::Virtual, "vcan0"),
    ]
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
