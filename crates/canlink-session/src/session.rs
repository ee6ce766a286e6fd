//! Session facade used by front-ends

use std::sync::Arc;
use std::time::Duration;

use canlink_core::{
    status, ConnectionState, Frame, FrameData, InterfaceDescriptor, LoggedMessage,
    SessionCounters, SessionError, SessionResult, StorageError, ValidationError,
};
use canlink_store::MessageStore;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::CanlinkConfig;
use crate::events::SessionEvent;
use crate::manager::{ConnectMode, ConnectionManager};
use crate::recorder::Recorder;
use crate::registry::InterfaceRegistry;
use crate::transceiver::{ReceiveOutcome, Transceiver};

/// One CAN session: connection, frame I/O, counters and message log
pub struct CanSession {
    config: CanlinkConfig,
    manager: Arc<ConnectionManager>,
    transceiver: Transceiver,
    store: MessageStore,
    recorder: RwLock<Option<Recorder>>,
}

impl CanSession {
    /// Assemble a session from its parts
    ///
    /// Logging starts under `config.project`.
    pub fn new(
        config: CanlinkConfig,
        registry: Arc<InterfaceRegistry>,
        store: MessageStore,
    ) -> Result<Self, ValidationError> {
        let (events, _) = broadcast::channel(config.session.event_capacity.max(1));
        let manager = Arc::new(ConnectionManager::new(registry, events));
        let transceiver = Transceiver::new(Arc::clone(&manager), config.session.send_timeout());
        let project = config.project.clone();

        let session = Self {
            config,
            manager,
            transceiver,
            store,
            recorder: RwLock::new(None),
        };
        session.set_project(Some(project))?;
        Ok(session)
    }

    /// Default transports and the store named in `config`
    ///
    /// A store that cannot be opened does not stop the session: logging
    /// then fails with `StorageError::Unavailable` on every message.
    pub fn from_config(config: CanlinkConfig) -> SessionResult<Self> {
        let store = match MessageStore::open(&config.store) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Message store unavailable, continuing without logging");
                MessageStore::unavailable(e.to_string())
            }
        };
        let registry = Arc::new(InterfaceRegistry::with_defaults());
        Ok(Self::new(config, registry, store)?)
    }

    pub fn config(&self) -> &CanlinkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InterfaceRegistry> {
        self.manager.registry()
    }

    /// Candidates for fallback, probed channels first when probing is on
    pub async fn candidates(&self) -> Vec<InterfaceDescriptor> {
        if self.config.probe {
            self.registry().enumerate(&self.config.candidates).await
        } else {
            self.config.candidates.clone()
        }
    }

    /// Connect to the first candidate that opens
    pub async fn connect_fallback(&self) -> SessionResult<InterfaceDescriptor> {
        let candidates = self.candidates().await;
        self.connect(ConnectMode::Fallback(candidates)).await
    }

    /// Connect to exactly `descriptor`
    pub async fn connect_manual(
        &self,
        descriptor: InterfaceDescriptor,
    ) -> SessionResult<InterfaceDescriptor> {
        self.connect(ConnectMode::Manual(descriptor)).await
    }

    /// Connect to the candidate called `name` (case-insensitive)
    ///
    /// Configured candidates are matched first; probing only runs for names
    /// not in the configuration.
    pub async fn connect_by_name(&self, name: &str) -> SessionResult<InterfaceDescriptor> {
        let descriptor = match self.config.candidate(name) {
            Some(descriptor) => descriptor.clone(),
            None => self
                .candidates()
                .await
                .into_iter()
                .find(|desc| desc.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| SessionError::UnknownInterface(name.to_string()))?,
        };
        self.connect_manual(descriptor).await
    }

    async fn connect(&self, mode: ConnectMode) -> SessionResult<InterfaceDescriptor> {
        match self.manager.connect(mode).await {
            Ok(descriptor) => {
                self.record_status(&format!("connected {}", descriptor.name()));
                Ok(descriptor)
            }
            Err(e) => {
                if e.is_connect_failure() {
                    self.record_status(&format!("connection failed: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Release the interface; calling it again is a no-op
    pub async fn disconnect(&self) {
        let previous = self.manager.descriptor();
        self.manager.disconnect().await;
        if let Some(descriptor) = previous {
            self.record_status(&format!("disconnected {}", descriptor.name()));
        }
    }

    /// Send one frame with the configured send timeout
    pub async fn send(&self, request: FrameData) -> SessionResult<Frame> {
        self.transceiver.send(request).await
    }

    pub async fn send_with_timeout(
        &self,
        request: FrameData,
        timeout: Duration,
    ) -> SessionResult<Frame> {
        self.transceiver.send_with_timeout(request, timeout).await
    }

    /// Wait up to `timeout` for one frame
    pub async fn receive(&self, timeout: Duration) -> SessionResult<ReceiveOutcome> {
        let result = self.transceiver.receive(timeout).await;
        if let Err(SessionError::Transport(e)) = &result {
            if self.manager.state() == ConnectionState::Failed {
                self.record_status(&format!("connection lost: {}", e));
            }
        }
        result
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn descriptor(&self) -> Option<InterfaceDescriptor> {
        self.manager.descriptor()
    }

    pub fn counters(&self) -> SessionCounters {
        self.manager.counters()
    }

    /// One-line summary for display
    pub fn status_line(&self) -> String {
        let descriptor = self.manager.descriptor();
        status::render(self.state(), descriptor.as_ref(), self.counters())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.manager.subscribe()
    }

    /// Log under `project` from now on; `None` stops logging
    pub fn set_project(&self, project: Option<String>) -> Result<(), ValidationError> {
        let recorder = project
            .map(|name| Recorder::new(self.store.clone(), name, self.manager.events().clone()))
            .transpose()?;

        match &recorder {
            Some(recorder) => info!(project = recorder.project(), "Message logging enabled"),
            None => info!("Message logging disabled"),
        }

        let frames = recorder
            .clone()
            .filter(|_| self.config.session.record_frames);
        self.transceiver.set_recorder(frames);
        *self.recorder.write() = recorder;
        Ok(())
    }

    pub fn project(&self) -> Option<String> {
        self.recorder
            .read()
            .as_ref()
            .map(|recorder| recorder.project().to_string())
    }

    /// Stored messages of `project`, oldest first
    pub fn history(&self, project: &str) -> Result<Vec<LoggedMessage>, StorageError> {
        self.store.query(project)
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    fn record_status(&self, message: &str) {
        let recorder = self.recorder.read().clone();
        if let Some(recorder) = recorder {
            recorder.record_status(message);
        }
    }
}
