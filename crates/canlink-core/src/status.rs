//! Status line rendering for front-ends

use crate::models::{ConnectionState, InterfaceDescriptor, SessionCounters};

/// Render a one-line summary of a session
///
/// The descriptor name is only shown while connected.
pub fn render(
    state: ConnectionState,
    descriptor: Option<&InterfaceDescriptor>,
    counters: SessionCounters,
) -> String {
    let status = match (state, descriptor) {
        (ConnectionState::Connected, Some(desc)) => format!("Connected to {}", desc.name()),
        (ConnectionState::Failed, _) => "Connection error".to_string(),
        (state, _) => state.to_string(),
    };
    format!(
        "Status: {} | Sent: {} | Received: {}",
        status, counters.sent, counters.received
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransportKind;

    #[test]
    fn test_render_connected() {
        let desc = InterfaceDescriptor::new("Bench bus", TransportKind::SocketCan, "can0");
        let line = render(
            ConnectionState::Connected,
            Some(&desc),
            SessionCounters {
                sent: 3,
                received: 7,
            },
        );
        assert_eq!(line, "Status: Connected to Bench bus | Sent: 3 | Received: 7");
    }

    #[test]
    fn test_render_hides_descriptor_when_not_connected() {
        let desc = InterfaceDescriptor::unnamed(TransportKind::Pcan, "PCAN_USBBUS1");
        let line = render(
            ConnectionState::Disconnected,
            Some(&desc),
            SessionCounters::default(),
        );
        assert_eq!(line, "Status: Disconnected | Sent: 0 | Received: 0");
    }

    #[test]
    fn test_render_failed() {
        let line = render(
            ConnectionState::Failed,
            None,
            SessionCounters {
                sent: 1,
                received: 0,
            },
        );
        assert_eq!(line, "Status: Connection error | Sent: 1 | Received: 0");
    }

    #[test]
    fn test_render_is_deterministic() {
        let counters = SessionCounters {
            sent: 2,
            received: 2,
        };
        assert_eq!(
            render(ConnectionState::Connecting, None, counters),
            render(ConnectionState::Connecting, None, counters)
        );
    }
}
