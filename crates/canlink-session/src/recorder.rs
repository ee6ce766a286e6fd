//! Frame and status logging to the message store

use canlink_core::{message_type, Direction, Frame, LoggedMessage, ValidationError};
use canlink_store::MessageStore;
use tokio::sync::broadcast;
use tracing::warn;

use crate::events::SessionEvent;

/// Appends session activity to a project's message log
///
/// Failures are logged and published as [`SessionEvent::StorageFailed`];
/// they never reach the bus operation that triggered them.
#[derive(Debug, Clone)]
pub struct Recorder {
    store: MessageStore,
    project: String,
    events: broadcast::Sender<SessionEvent>,
}

impl Recorder {
    pub fn new(
        store: MessageStore,
        project: impl Into<String>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self, ValidationError> {
        let project = project.into();
        if project.trim().is_empty() {
            return Err(ValidationError::EmptyProjectName);
        }
        Ok(Self {
            store,
            project,
            events,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Log a sent or received frame
    pub fn record_frame(&self, frame: &Frame) -> Option<LoggedMessage> {
        let kind = match frame.direction() {
            Direction::Sent => message_type::SENT,
            Direction::Received => message_type::RECEIVED,
        };
        self.record(kind, &frame.data().to_string())
    }

    /// Log a connection status change
    pub fn record_status(&self, message: &str) -> Option<LoggedMessage> {
        self.record(message_type::STATUS, message)
    }

    fn record(&self, kind: &str, message: &str) -> Option<LoggedMessage> {
        match self.store.append(&self.project, kind, message) {
            Ok(logged) => Some(logged),
            Err(e) => {
                warn!(project = %self.project, message_type = kind, error = %e, "Failed to log message");
                let _ = self.events.send(SessionEvent::StorageFailed {
                    error: e.to_string(),
                });
                None
            }
        }
    }
}
