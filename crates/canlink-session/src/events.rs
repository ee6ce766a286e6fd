//! Notifications published to front-ends

use canlink_core::{ConnectionState, Frame, InterfaceDescriptor};

/// Something a front-end may want to redraw for
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The connection state changed; `descriptor` is set when Connected
    StateChanged {
        state: ConnectionState,
        descriptor: Option<InterfaceDescriptor>,
    },
    FrameSent(Frame),
    FrameReceived(Frame),
    /// A message could not be logged; bus operation was unaffected
    StorageFailed { error: String },
}
