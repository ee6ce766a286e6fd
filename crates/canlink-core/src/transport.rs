//! Transport capability traits
//!
//! A [`TransportCapability`] is implemented once per hardware family
//! (PCAN, SocketCAN, Kvaser, virtual). It knows how to find channels and
//! open them; every successful `open` yields an exclusively owned
//! [`TransportHandle`] that moves frames for one channel.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::models::{FrameData, InterfaceDescriptor, TransportKind};

/// Entry point of one hardware family
#[async_trait]
pub trait TransportCapability: Send + Sync {
    /// Hardware family served by this capability
    fn kind(&self) -> TransportKind;

    /// Query the hardware for available channels
    ///
    /// An error means the hardware (or its driver) is absent. Callers treat
    /// that as "no channels" and keep enumerating other families.
    async fn probe(&self) -> Result<Vec<InterfaceDescriptor>, TransportError> {
        Ok(Vec::new())
    }

    /// Open the channel named by `descriptor`
    async fn open(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// An open channel
///
/// Handles are not shared: the session serializes every call on one handle.
#[async_trait]
pub trait TransportHandle: Send {
    /// Largest payload this channel accepts (8 for classic CAN)
    fn max_payload_length(&self) -> usize;

    /// Write one frame, giving up after `timeout`
    async fn send(&mut self, frame: &FrameData, timeout: Duration) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one frame
    ///
    /// `Ok(None)` means nothing arrived in time. A zero timeout polls.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<FrameData>, TransportError>;

    /// Release the channel. Calling it again is a no-op.
    async fn close(&mut self);
}
