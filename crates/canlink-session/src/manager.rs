//! Connection state machine
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                           Connecting --fail--> Failed
//! Connected --disconnect--> Disconnected
//! Connected --fatal transport error--> Failed
//! ```
//!
//! Failed and Disconnected accept a new connect. Nothing is retried
//! automatically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use canlink_core::{
    ConnectionState, InterfaceDescriptor, SessionCounters, SessionError, SessionResult,
    TransportError,
};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::SessionEvent;
use crate::link::Link;
use crate::registry::InterfaceRegistry;

/// How to pick the interface to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectMode {
    /// Exactly this interface
    Manual(InterfaceDescriptor),
    /// The first candidate that opens, tried in order
    Fallback(Vec<InterfaceDescriptor>),
}

/// Counters of one connection
#[derive(Debug, Default)]
pub(crate) struct CounterCell {
    sent: AtomicU64,
    received: AtomicU64,
}

impl CounterCell {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SessionCounters {
        SessionCounters {
            sent: self.sent.load(Ordering::SeqCst),
            received: self.received.load(Ordering::SeqCst),
        }
    }
}

struct ActiveConnection {
    session_id: Uuid,
    descriptor: InterfaceDescriptor,
    link: Arc<Link>,
    counters: Arc<CounterCell>,
}

/// Everything an operation needs from the active connection
#[derive(Clone)]
pub(crate) struct ActiveLink {
    pub(crate) session_id: Uuid,
    pub(crate) descriptor: InterfaceDescriptor,
    pub(crate) link: Arc<Link>,
    pub(crate) counters: Arc<CounterCell>,
}

/// Owns the active transport handle and the connection state
pub struct ConnectionManager {
    registry: Arc<InterfaceRegistry>,
    state: RwLock<ConnectionState>,
    active: RwLock<Option<ActiveConnection>>,
    /// Counters of the current or most recent connection
    counters: RwLock<Arc<CounterCell>>,
    /// Serializes connect, disconnect and failure handling
    transitions: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<InterfaceRegistry>, events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            registry,
            state: RwLock::new(ConnectionState::Disconnected),
            active: RwLock::new(None),
            counters: RwLock::new(Arc::new(CounterCell::default())),
            transitions: Mutex::new(()),
            events,
        }
    }

    pub fn registry(&self) -> &Arc<InterfaceRegistry> {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Descriptor of the active connection, if any
    pub fn descriptor(&self) -> Option<InterfaceDescriptor> {
        self.active
            .read()
            .as_ref()
            .map(|active| active.descriptor.clone())
    }

    /// Counters of the current connection, or of the last one after it ended
    pub fn counters(&self) -> SessionCounters {
        self.counters.read().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> &broadcast::Sender<SessionEvent> {
        &self.events
    }

    /// Open an interface and make it the active connection
    ///
    /// Counters start from zero for every new connection.
    pub async fn connect(&self, mode: ConnectMode) -> SessionResult<InterfaceDescriptor> {
        let _transition = self.transitions.lock().await;

        if !self.state().accepts_connect() {
            if let Some(descriptor) = self.descriptor() {
                return Err(SessionError::AlreadyConnected(descriptor));
            }
        }

        self.set_state(ConnectionState::Connecting, None);

        let opened = match mode {
            ConnectMode::Manual(descriptor) => {
                info!(%descriptor, "Connecting to interface");
                match self.registry.open(&descriptor).await {
                    Ok(handle) => Ok((descriptor, handle)),
                    Err(source) => Err(SessionError::InterfaceUnavailable { descriptor, source }),
                }
            }
            ConnectMode::Fallback(candidates) => {
                info!(candidates = candidates.len(), "Connecting to first available interface");
                self.registry
                    .connect_first_available(&candidates)
                    .await
                    .map_err(SessionError::from)
            }
        };

        match opened {
            Ok((descriptor, handle)) => {
                let session_id = Uuid::new_v4();
                let counters = Arc::new(CounterCell::default());
                let link = Arc::new(Link::spawn(descriptor.clone(), handle));

                *self.counters.write() = Arc::clone(&counters);
                *self.active.write() = Some(ActiveConnection {
                    session_id,
                    descriptor: descriptor.clone(),
                    link,
                    counters,
                });
                self.set_state(ConnectionState::Connected, Some(descriptor.clone()));

                info!(%descriptor, %session_id, "Connected");
                Ok(descriptor)
            }
            Err(e) => {
                self.set_state(ConnectionState::Failed, None);
                warn!(error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    /// Release the active handle; always ends Disconnected
    ///
    /// Calling it when nothing is connected only resets the state.
    pub async fn disconnect(&self) {
        let _transition = self.transitions.lock().await;

        let active = self.active.write().take();
        if let Some(active) = active {
            active.link.shutdown().await;
            info!(descriptor = %active.descriptor, session_id = %active.session_id, "Disconnected");
        }

        if self.state() != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected, None);
        }
    }

    /// The active connection, or `NotConnected` outside Connected
    pub(crate) fn active_link(&self) -> SessionResult<ActiveLink> {
        let state = self.state();
        let active = self.active.read();
        match (state, active.as_ref()) {
            (ConnectionState::Connected, Some(active)) => Ok(ActiveLink {
                session_id: active.session_id,
                descriptor: active.descriptor.clone(),
                link: Arc::clone(&active.link),
                counters: Arc::clone(&active.counters),
            }),
            _ => Err(SessionError::NotConnected { state }),
        }
    }

    /// End the connection `session_id` after a fatal transport error
    ///
    /// Returns false when that connection is no longer the active one.
    pub(crate) async fn fail_session(&self, session_id: Uuid, cause: &TransportError) -> bool {
        let _transition = self.transitions.lock().await;

        let active = {
            let mut slot = self.active.write();
            if slot.as_ref().map(|active| active.session_id) == Some(session_id) {
                slot.take()
            } else {
                None
            }
        };

        match active {
            Some(active) => {
                error!(descriptor = %active.descriptor, error = %cause, "Transport failed, connection lost");
                active.link.shutdown().await;
                self.set_state(ConnectionState::Failed, None);
                true
            }
            None => {
                debug!(%session_id, "Ignoring failure of a connection that already ended");
                false
            }
        }
    }

    fn set_state(&self, state: ConnectionState, descriptor: Option<InterfaceDescriptor>) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        debug!(from = %previous, to = %state, "Connection state changed");
        // No subscribers is fine
        let _ = self
            .events
            .send(SessionEvent::StateChanged { state, descriptor });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use canlink_core::TransportKind;
    use pretty_assertions::assert_eq;

    fn pcan() -> InterfaceDescriptor {
        InterfaceDescriptor::new("PCAN USB 1", TransportKind::Pcan, "PCAN_USBBUS1")
    }

    fn can0() -> InterfaceDescriptor {
        InterfaceDescriptor::new("SocketCAN can0", TransportKind::SocketCan, "can0")
    }

    fn manager() -> (MockTransport, ConnectionManager) {
        let mock = MockTransport::new(TransportKind::SocketCan).with_channel("can0");
        let registry = InterfaceRegistry::new();
        registry.register(Arc::new(mock.clone()));
        let (events, _) = broadcast::channel(16);
        (mock, ConnectionManager::new(Arc::new(registry), events))
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let (_mock, manager) = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            manager.active_link(),
            Err(SessionError::NotConnected {
                state: ConnectionState::Disconnected
            })
        ));
    }

    #[tokio::test]
    async fn test_fallback_connects_and_publishes_states() {
        let (_mock, manager) = manager();
        let mut events = manager.subscribe();

        let descriptor = manager
            .connect(ConnectMode::Fallback(vec![pcan(), can0()]))
            .await
            .unwrap();
        assert_eq!(descriptor, can0());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.descriptor(), Some(can0()));

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged {
                state: ConnectionState::Connecting,
                descriptor: None
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::StateChanged {
                state: ConnectionState::Connected,
                descriptor: Some(can0())
            }
        );
    }

    #[tokio::test]
    async fn test_manual_failure_surfaces_single_error() {
        let (_mock, manager) = manager();
        let err = manager.connect(ConnectMode::Manual(pcan())).await.unwrap_err();
        match err {
            SessionError::InterfaceUnavailable { descriptor, .. } => assert_eq!(descriptor, pcan()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(manager.state(), ConnectionState::Failed);

        // Failed accepts a new connect
        manager.connect(ConnectMode::Manual(can0())).await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_rejected() {
        let (mock, manager) = manager();
        manager.connect(ConnectMode::Manual(can0())).await.unwrap();
        let err = manager
            .connect(ConnectMode::Manual(can0()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyConnected(_)));
        assert_eq!(mock.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (mock, manager) = manager();
        manager.connect(ConnectMode::Manual(can0())).await.unwrap();

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.descriptor(), None);
        assert_eq!(mock.close_count(), 1);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_session_only_hits_matching_connection() {
        let (mock, manager) = manager();
        manager.connect(ConnectMode::Manual(can0())).await.unwrap();
        let active = manager.active_link().unwrap();

        let stale = Uuid::new_v4();
        assert!(
            !manager
                .fail_session(stale, &TransportError::ConnectionClosed)
                .await
        );
        assert_eq!(manager.state(), ConnectionState::Connected);

        assert!(
            manager
                .fail_session(active.session_id, &TransportError::ConnectionClosed)
                .await
        );
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn test_new_connection_resets_counters() {
        let (_mock, manager) = manager();
        manager.connect(ConnectMode::Manual(can0())).await.unwrap();
        manager.active_link().unwrap().counters.record_sent();
        assert_eq!(manager.counters().sent, 1);

        manager.disconnect().await;
        assert_eq!(manager.counters().sent, 1);

        manager.connect(ConnectMode::Manual(can0())).await.unwrap();
        assert_eq!(manager.counters(), SessionCounters::default());
    }
}
