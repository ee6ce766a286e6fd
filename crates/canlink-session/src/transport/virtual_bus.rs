//! In-process virtual CAN bus

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use canlink_core::{
    FrameData, InterfaceDescriptor, TransportCapability, TransportError, TransportHandle,
    TransportKind, CLASSIC_MAX_PAYLOAD,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

const BUS_CAPACITY: usize = 1024;

/// A frame on the virtual bus, tagged with the node that sent it
#[derive(Debug, Clone)]
struct BusFrame {
    origin: u64,
    data: FrameData,
}

/// Virtual CAN bus, one broadcast domain per channel name
///
/// Every handle opened on a channel sees the frames sent by every other
/// handle on that channel, but not its own.
#[derive(Debug, Default)]
pub struct VirtualBus {
    channels: Mutex<HashMap<String, broadcast::Sender<BusFrame>>>,
    next_node: AtomicU64,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of channels that have been opened at least once
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Put a frame on a channel as if an outside node had sent it
    ///
    /// Returns how many open handles will see it.
    pub fn inject(&self, channel: &str, data: FrameData) -> usize {
        let frame = BusFrame { origin: 0, data };
        self.sender(channel).send(frame).unwrap_or(0)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<BusFrame> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(BUS_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl TransportCapability for VirtualBus {
    fn kind(&self) -> TransportKind {
        TransportKind::Virtual
    }

    async fn probe(&self) -> Result<Vec<InterfaceDescriptor>, TransportError> {
        Ok(self
            .channels()
            .into_iter()
            .map(|name| InterfaceDescriptor::unnamed(TransportKind::Virtual, name))
            .collect())
    }

    async fn open(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let channel = descriptor.channel().to_string();
        let tx = self.sender(&channel);
        let rx = tx.subscribe();
        // Node 0 is reserved for injected frames
        let node = self.next_node.fetch_add(1, Ordering::SeqCst) + 1;

        debug!(channel = %channel, node, "Virtual bus handle opened");

        Ok(Box::new(VirtualHandle {
            node,
            channel,
            tx,
            rx: Some(rx),
        }))
    }
}

struct VirtualHandle {
    node: u64,
    channel: String,
    tx: broadcast::Sender<BusFrame>,
    /// `None` once closed
    rx: Option<broadcast::Receiver<BusFrame>>,
}

#[async_trait]
impl TransportHandle for VirtualHandle {
    fn max_payload_length(&self) -> usize {
        CLASSIC_MAX_PAYLOAD
    }

    async fn send(&mut self, frame: &FrameData, _timeout: Duration) -> Result<(), TransportError> {
        if self.rx.is_none() {
            return Err(TransportError::ConnectionClosed);
        }
        let frame = BusFrame {
            origin: self.node,
            data: frame.clone(),
        };
        // Our own receiver keeps the channel open, so this cannot fail
        let _ = self.tx.send(frame);
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<FrameData>, TransportError> {
        let node = self.node;
        let channel = &self.channel;
        let rx = self.rx.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let deadline = Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(frame)) if frame.origin == node => continue,
                Ok(Ok(frame)) => return Ok(Some(frame.data)),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(channel = %channel, skipped, "Virtual bus receiver lagged");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    async fn close(&mut self) {
        if self.rx.take().is_some() {
            debug!(channel = %self.channel, node = self.node, "Virtual bus handle closed");
        }
    }
}
