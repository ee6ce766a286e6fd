//! canlink-session - CAN bus connection and transceiver session manager
//!
//! Finds an interface, keeps the connection state machine, moves frames
//! through the active transport handle and logs what it saw.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CanSession                            │
//! │  connect / disconnect / send / receive / status_line        │
//! │                                                             │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌───────────────┐  │
//! │  │ Transceiver │──│ConnectionManager │  │   Recorder    │  │
//! │  │ (frames)    │  │ (state machine)  │  │ (MessageStore)│  │
//! │  └──────┬──────┘  └────────┬─────────┘  └───────────────┘  │
//! │         │                  │                                │
//! │         │          ┌───────┴─────────┐                      │
//! │         │          │InterfaceRegistry│                      │
//! │         │          │ (fallback order)│                      │
//! │         │          └───────┬─────────┘                      │
//! │   ┌─────┴──────┐   ┌───────┴──────────────┐                 │
//! │   │ Link task  │───│ TransportCapability  │                 │
//! │   │ (owns the  │   │ (Virtual/SocketCAN/  │                 │
//! │   │  handle)   │   │  PCAN/Kvaser)        │                 │
//! │   └────────────┘   └──────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod events;
mod link;
pub mod manager;
pub mod recorder;
pub mod registry;
pub mod session;
pub mod transceiver;
pub mod transport;

pub use config::{default_candidates, CanlinkConfig, ConfigError, SessionConfig};
pub use events::SessionEvent;
pub use manager::{ConnectMode, ConnectionManager};
pub use recorder::Recorder;
pub use registry::InterfaceRegistry;
pub use session::CanSession;
pub use transceiver::{ReceiveOutcome, Transceiver};
pub use transport::default_capabilities;
pub use transport::mock::MockTransport;
pub use transport::virtual_bus::VirtualBus;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use transport::socketcan::SocketCanTransport;

// Re-export for convenience
pub use canlink_core::{
    ConnectionState, Direction, ExhaustedError, Frame, FrameData, InterfaceDescriptor,
    LoggedMessage, SessionCounters, SessionError, SessionResult, TransportCapability,
    TransportError, TransportHandle, TransportKind,
};
pub use canlink_store::{MessageStore, StoreConfig};
