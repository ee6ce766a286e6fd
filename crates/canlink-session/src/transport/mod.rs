//! Transport capabilities shipped with the session manager
//!
//! - Virtual bus (in-process, every platform)
//! - SocketCAN raw sockets (Linux only, `socketcan` feature)
//! - Mock capability for testing
//!
//! PCAN and Kvaser drivers are vendor libraries; applications that have them
//! implement [`TransportCapability`] and register it with the
//! [`InterfaceRegistry`](crate::InterfaceRegistry).

pub mod mock;
pub mod virtual_bus;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use canlink_core::{TransportCapability, TransportError, TransportHandle};

use std::sync::Arc;

/// Capabilities available on this platform
pub fn default_capabilities() -> Vec<Arc<dyn TransportCapability>> {
    #[allow(unused_mut)]
    let mut capabilities: Vec<Arc<dyn TransportCapability>> =
        vec![Arc::new(virtual_bus::VirtualBus::new())];

    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    capabilities.push(Arc::new(socketcan::SocketCanTransport::new()));

    capabilities
}
