//! Interface descriptor models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hardware family a transport belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// PEAK-System PCAN adapters
    Pcan,
    /// Linux SocketCAN network interfaces
    SocketCan,
    /// Kvaser adapters (canlib)
    Kvaser,
    /// In-process virtual bus
    Virtual,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Pcan => "PCAN",
            TransportKind::SocketCan => "SocketCAN",
            TransportKind::Kvaser => "Kvaser",
            TransportKind::Virtual => "Virtual",
        };
        f.write_str(s)
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcan" => Ok(TransportKind::Pcan),
            "socketcan" => Ok(TransportKind::SocketCan),
            "kvaser" => Ok(TransportKind::Kvaser),
            "virtual" => Ok(TransportKind::Virtual),
            other => Err(format!("Unknown transport kind: {}", other)),
        }
    }
}

/// Channel selector: a named device (`can0`, `PCAN_USBBUS1`) or a numeric index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Channel {
    Index(u32),
    Name(String),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Index(index) => write!(f, "{}", index),
            Channel::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Channel::Name(name.to_string())
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Channel::Name(name)
    }
}

impl From<u32> for Channel {
    fn from(index: u32) -> Self {
        Channel::Index(index)
    }
}

/// Identification of one connection candidate
///
/// Fields are private: a descriptor never changes once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    name: String,
    kind: TransportKind,
    channel: Channel,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>, kind: TransportKind, channel: impl Into<Channel>) -> Self {
        Self {
            name: name.into(),
            kind,
            channel: channel.into(),
        }
    }

    /// Descriptor named after its kind and channel (e.g. "SocketCAN can0")
    pub fn unnamed(kind: TransportKind, channel: impl Into<Channel>) -> Self {
        let channel = channel.into();
        Self {
            name: format!("{} {}", kind, channel),
            kind,
            channel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Whether both descriptors address the same hardware channel
    pub fn same_target(&self, other: &InterfaceDescriptor) -> bool {
        self.kind == other.kind && self.channel == other.channel
    }
}

impl fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.kind, self.channel)
    }
}
