//! Mock transport capability for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canlink_core::{
    Channel, FrameData, InterfaceDescriptor, TransportCapability, TransportError,
    TransportHandle, TransportKind, CLASSIC_MAX_PAYLOAD,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Scriptable transport capability
///
/// Clones share state, so a test keeps one clone for control and inspection
/// while the registry owns another.
#[derive(Clone)]
pub struct MockTransport {
    kind: TransportKind,
    state: Arc<MockState>,
}

struct MockState {
    channels: RwLock<Vec<Channel>>,
    probe_error: RwLock<Option<TransportError>>,
    max_payload: AtomicUsize,
    latency: RwLock<Duration>,
    inbox: Mutex<VecDeque<FrameData>>,
    arrivals: Notify,
    sent: Mutex<Vec<FrameData>>,
    send_fault: Mutex<Option<TransportError>>,
    receive_fault: Mutex<Option<TransportError>>,
    open_count: AtomicUsize,
    close_count: AtomicUsize,
}

impl MockTransport {
    /// A capability with no channels present
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            state: Arc::new(MockState {
                channels: RwLock::new(Vec::new()),
                probe_error: RwLock::new(None),
                max_payload: AtomicUsize::new(CLASSIC_MAX_PAYLOAD),
                latency: RwLock::new(Duration::ZERO),
                inbox: Mutex::new(VecDeque::new()),
                arrivals: Notify::new(),
                sent: Mutex::new(Vec::new()),
                send_fault: Mutex::new(None),
                receive_fault: Mutex::new(None),
                open_count: AtomicUsize::new(0),
                close_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Make a channel present (openable and probed)
    pub fn with_channel(self, channel: impl Into<Channel>) -> Self {
        self.state.channels.write().push(channel.into());
        self
    }

    pub fn with_max_payload(self, max: usize) -> Self {
        self.state.max_payload.store(max, Ordering::SeqCst);
        self
    }

    /// Make every send take this long
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.state.latency.write() = latency;
        self
    }

    /// Make `probe` fail as if the driver were missing
    pub fn with_probe_error(self, error: TransportError) -> Self {
        *self.state.probe_error.write() = Some(error);
        self
    }

    /// Queue a frame for the next receive on any open handle
    pub fn inject(&self, frame: FrameData) {
        self.state.inbox.lock().push_back(frame);
        self.state.arrivals.notify_one();
    }

    /// Fail the next send with `error`
    pub fn fail_next_send(&self, error: TransportError) {
        *self.state.send_fault.lock() = Some(error);
    }

    /// Fail every receive from now on with `error`
    pub fn fail_receive(&self, error: TransportError) {
        *self.state.receive_fault.lock() = Some(error);
        self.state.arrivals.notify_waiters();
        self.state.arrivals.notify_one();
    }

    /// Simulate the device being unplugged
    pub fn unplug(&self) {
        self.fail_receive(TransportError::ConnectionClosed);
    }

    /// Frames written through any handle, oldest first
    pub fn sent_frames(&self) -> Vec<FrameData> {
        self.state.sent.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportCapability for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn probe(&self) -> Result<Vec<InterfaceDescriptor>, TransportError> {
        if let Some(err) = self.state.probe_error.read().clone() {
            return Err(err);
        }
        Ok(self
            .state
            .channels
            .read()
            .iter()
            .map(|channel| InterfaceDescriptor::unnamed(self.kind, channel.clone()))
            .collect())
    }

    async fn open(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let present = self
            .state
            .channels
            .read()
            .iter()
            .any(|channel| channel == descriptor.channel());
        if !present {
            return Err(TransportError::Unavailable(format!(
                "{} channel {} not present",
                self.kind,
                descriptor.channel()
            )));
        }

        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%descriptor, "Mock transport: opened");
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockHandle {
    state: Arc<MockState>,
    closed: bool,
}

#[async_trait]
impl TransportHandle for MockHandle {
    fn max_payload_length(&self) -> usize {
        self.state.max_payload.load(Ordering::SeqCst)
    }

    async fn send(&mut self, frame: &FrameData, _timeout: Duration) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let latency = *self.state.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.state.send_fault.lock().take() {
            return Err(err);
        }

        tracing::debug!(%frame, "Mock transport: sent frame");
        self.state.sent.lock().push(frame.clone());
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<FrameData>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.closed {
                return Err(TransportError::ConnectionClosed);
            }
            if let Some(err) = self.state.receive_fault.lock().clone() {
                return Err(err);
            }
            if let Some(frame) = self.state.inbox.lock().pop_front() {
                return Ok(Some(frame));
            }
            if tokio::time::timeout_at(deadline, self.state.arrivals.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn can0() -> InterfaceDescriptor {
        InterfaceDescriptor::unnamed(TransportKind::SocketCan, "can0")
    }

    #[tokio::test]
    async fn test_absent_channel_is_unavailable() {
        let mock = MockTransport::new(TransportKind::SocketCan);
        let result = mock.open(&can0()).await;
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
        assert_eq!(mock.open_count(), 0);
    }

    #[tokio::test]
    async fn test_send_records_frames() {
        let mock = MockTransport::new(TransportKind::SocketCan).with_channel("can0");
        let mut handle = mock.open(&can0()).await.unwrap();

        let frame = FrameData::new(0x123, vec![1, 2, 3], false).unwrap();
        handle.send(&frame, Duration::from_millis(10)).await.unwrap();
        assert_eq!(mock.sent_frames(), vec![frame.clone()]);

        mock.fail_next_send(TransportError::SendFailed("bus off".to_string()));
        assert!(handle.send(&frame, Duration::from_millis(10)).await.is_err());
        handle.send(&frame, Duration::from_millis(10)).await.unwrap();
        assert_eq!(mock.sent_frames().len(), 2);
    }

    #[tokio::test]
    async fn test_receive_injected_and_timeout() {
        let mock = MockTransport::new(TransportKind::SocketCan).with_channel("can0");
        let mut handle = mock.open(&can0()).await.unwrap();

        let frame = FrameData::new(0x456, vec![0xAA], false).unwrap();
        mock.inject(frame.clone());
        assert_eq!(handle.receive(Duration::ZERO).await.unwrap(), Some(frame));
        assert_eq!(
            handle.receive(Duration::from_millis(20)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unplug_fails_receive() {
        let mock = MockTransport::new(TransportKind::SocketCan).with_channel("can0");
        let mut handle = mock.open(&can0()).await.unwrap();
        mock.unplug();
        assert_eq!(
            handle.receive(Duration::from_secs(5)).await,
            Err(TransportError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_probe() {
        let mock = MockTransport::new(TransportKind::Kvaser).with_channel(Channel::Index(0));
        assert_eq!(
            mock.probe().await.unwrap(),
            vec![InterfaceDescriptor::unnamed(TransportKind::Kvaser, 0u32)]
        );

        let missing = MockTransport::new(TransportKind::Pcan)
            .with_probe_error(TransportError::Unavailable("driver missing".to_string()));
        assert!(missing.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_close_counts_once() {
        let mock = MockTransport::new(TransportKind::SocketCan).with_channel("can0");
        let mut handle = mock.open(&can0()).await.unwrap();
        handle.close().await;
        handle.close().await;
        assert_eq!(mock.close_count(), 1);
    }
}
