//! Frame send and receive through the active connection

use std::sync::Arc;
use std::time::Duration;

use canlink_core::{Direction, Frame, FrameData, SessionError, SessionResult, ValidationError};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::events::SessionEvent;
use crate::link::LinkError;
use crate::manager::ConnectionManager;
use crate::recorder::Recorder;

/// Result of a receive that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    Frame(Frame),
    /// Nothing arrived within the timeout
    TimedOut,
    /// A disconnect interrupted the wait
    Cancelled,
}

impl ReceiveOutcome {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            ReceiveOutcome::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Sends and receives frames, keeping the counters of the connection
///
/// Send failures leave the connection as it is. Receive failures end it.
pub struct Transceiver {
    manager: Arc<ConnectionManager>,
    send_timeout: Duration,
    recorder: RwLock<Option<Recorder>>,
}

impl Transceiver {
    pub fn new(manager: Arc<ConnectionManager>, send_timeout: Duration) -> Self {
        Self {
            manager,
            send_timeout,
            recorder: RwLock::new(None),
        }
    }

    /// Log frames through `recorder` from now on (`None` stops logging)
    pub fn set_recorder(&self, recorder: Option<Recorder>) {
        *self.recorder.write() = recorder;
    }

    /// Send with the configured timeout
    pub async fn send(&self, request: FrameData) -> SessionResult<Frame> {
        self.send_with_timeout(request, self.send_timeout).await
    }

    pub async fn send_with_timeout(
        &self,
        request: FrameData,
        timeout: Duration,
    ) -> SessionResult<Frame> {
        let active = self.manager.active_link()?;

        let max = active.link.max_payload_length();
        if request.payload().len() > max {
            return Err(ValidationError::PayloadTooLong {
                len: request.payload().len(),
                max,
            }
            .into());
        }

        match active.link.send(request.clone(), timeout).await {
            Ok(()) => {
                active.counters.record_sent();
                let frame = Frame::new(request, Direction::Sent);
                debug!(descriptor = %active.descriptor, %frame, "Frame sent");
                self.publish(SessionEvent::FrameSent(frame.clone()));
                self.record(&frame);
                Ok(frame)
            }
            Err(LinkError::Cancelled) => Err(SessionError::Cancelled),
            Err(LinkError::Transport(e)) => {
                warn!(descriptor = %active.descriptor, error = %e, "Send failed");
                Err(e.into())
            }
        }
    }

    /// Wait up to `timeout` for one frame (zero polls)
    pub async fn receive(&self, timeout: Duration) -> SessionResult<ReceiveOutcome> {
        let active = self.manager.active_link()?;

        match active.link.receive(timeout).await {
            Ok(Some(data)) => {
                active.counters.record_received();
                let frame = Frame::new(data, Direction::Received);
                debug!(descriptor = %active.descriptor, %frame, "Frame received");
                self.publish(SessionEvent::FrameReceived(frame.clone()));
                self.record(&frame);
                Ok(ReceiveOutcome::Frame(frame))
            }
            Ok(None) => Ok(ReceiveOutcome::TimedOut),
            Err(LinkError::Cancelled) => Ok(ReceiveOutcome::Cancelled),
            Err(LinkError::Transport(e)) => {
                self.manager.fail_session(active.session_id, &e).await;
                Err(e.into())
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.manager.events().send(event);
    }

    fn record(&self, frame: &Frame) {
        let recorder = self.recorder.read().clone();
        if let Some(recorder) = recorder {
            recorder.record_frame(frame);
        }
    }
}
