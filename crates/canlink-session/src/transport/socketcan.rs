//! SocketCAN raw socket transport (Linux)

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use canlink_core::{
    FrameData, InterfaceDescriptor, TransportCapability, TransportError, TransportHandle,
    TransportKind, CLASSIC_MAX_PAYLOAD,
};
use parking_lot::Mutex;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Id, Socket, StandardId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// `ARPHRD_CAN` link type reported in `/sys/class/net/<if>/type`
const ARPHRD_CAN: &str = "280";

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Sleep between polls of the non-blocking socket
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Raw CAN sockets on kernel network interfaces (`can0`, `vcan0`, ...)
#[derive(Debug, Default)]
pub struct SocketCanTransport;

impl SocketCanTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportCapability for SocketCanTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::SocketCan
    }

    async fn probe(&self) -> Result<Vec<InterfaceDescriptor>, TransportError> {
        let names = tokio::task::spawn_blocking(|| can_interfaces(Path::new(SYS_CLASS_NET)))
            .await
            .map_err(|e| TransportError::Unavailable(format!("Probe task join error: {}", e)))??;

        Ok(names
            .into_iter()
            .map(|name| InterfaceDescriptor::unnamed(TransportKind::SocketCan, name))
            .collect())
    }

    async fn open(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let interface = descriptor.channel().to_string();
        let iface = interface.clone();

        let socket = tokio::task::spawn_blocking(move || {
            let socket = CanSocket::open(&iface).map_err(|e| {
                TransportError::Unavailable(format!(
                    "Failed to open raw CAN socket on {}: {}",
                    iface, e
                ))
            })?;
            socket.set_nonblocking(true).map_err(|e| {
                TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
            })?;
            Ok::<_, TransportError>(socket)
        })
        .await
        .map_err(|e| TransportError::Unavailable(format!("Open task join error: {}", e)))??;

        debug!(interface = %interface, "SocketCAN socket opened");

        Ok(Box::new(SocketCanHandle {
            interface,
            socket: Some(Arc::new(Mutex::new(socket))),
            stop: Arc::new(AtomicBool::new(false)),
            pending_send: None,
            pending_receive: None,
        }))
    }
}

/// Names of network interfaces whose link type is CAN
fn can_interfaces(sys_class_net: &Path) -> Result<Vec<String>, TransportError> {
    let entries = std::fs::read_dir(sys_class_net).map_err(|e| {
        TransportError::Unavailable(format!(
            "Cannot list {}: {}",
            sys_class_net.display(),
            e
        ))
    })?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        let link_type = std::fs::read_to_string(entry.path().join("type")).unwrap_or_default();
        if link_type.trim() == ARPHRD_CAN {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

struct SocketCanHandle {
    interface: String,
    /// `None` once closed
    socket: Option<Arc<Mutex<CanSocket>>>,
    /// Checked by the blocking loops on every poll
    stop: Arc<AtomicBool>,
    /// Blocking loops whose caller stopped waiting; finished before reuse or close
    pending_send: Option<JoinHandle<Result<(), TransportError>>>,
    pending_receive: Option<JoinHandle<Result<Option<FrameData>, TransportError>>>,
}

impl SocketCanHandle {
    fn socket(&self) -> Result<Arc<Mutex<CanSocket>>, TransportError> {
        self.socket
            .as_ref()
            .map(Arc::clone)
            .ok_or(TransportError::ConnectionClosed)
    }
}

fn to_can_frame(frame: &FrameData) -> Result<CanFrame, TransportError> {
    let id: Id = if frame.is_extended_id() {
        ExtendedId::new(frame.arbitration_id())
            .ok_or_else(|| {
                TransportError::InvalidConfig(format!(
                    "Invalid extended CAN ID: 0x{:X}",
                    frame.arbitration_id()
                ))
            })?
            .into()
    } else {
        u16::try_from(frame.arbitration_id())
            .ok()
            .and_then(StandardId::new)
            .ok_or_else(|| {
                TransportError::InvalidConfig(format!(
                    "Invalid standard CAN ID: 0x{:X}",
                    frame.arbitration_id()
                ))
            })?
            .into()
    };

    CanFrame::new(id, frame.payload()).ok_or_else(|| {
        TransportError::SendFailed(format!(
            "Payload of {} bytes does not fit a CAN frame",
            frame.payload().len()
        ))
    })
}

fn from_can_frame(frame: &CanFrame) -> Result<FrameData, TransportError> {
    let (id, extended) = match frame.id() {
        Id::Standard(id) => (u32::from(id.as_raw()), false),
        Id::Extended(id) => (id.as_raw(), true),
    };
    FrameData::new(id, frame.data().to_vec(), extended)
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))
}

#[async_trait]
impl TransportHandle for SocketCanHandle {
    fn max_payload_length(&self) -> usize {
        CLASSIC_MAX_PAYLOAD
    }

    async fn send(&mut self, frame: &FrameData, timeout: Duration) -> Result<(), TransportError> {
        if let Some(stale) = self.pending_send.take() {
            // The caller of that send already gave up on it
            let _ = stale.await;
        }

        let socket = self.socket()?;
        let can_frame = to_can_frame(frame)?;
        let stop = Arc::clone(&self.stop);

        let task = self.pending_send.insert(tokio::task::spawn_blocking(move || {
            write_loop(&stop, Instant::now() + timeout, || {
                socket.lock().write_frame(&can_frame)
            })
        }));
        let joined = task.await;
        self.pending_send = None;

        joined.map_err(|e| TransportError::SendFailed(format!("Task join error: {}", e)))?
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<FrameData>, TransportError> {
        // A read left behind by an earlier caller may already hold a frame
        let task = match self.pending_receive.take() {
            Some(task) => task,
            None => {
                let socket = self.socket()?;
                let interface = self.interface.clone();
                let stop = Arc::clone(&self.stop);
                tokio::task::spawn_blocking(move || {
                    read_loop(&stop, Instant::now() + timeout, &interface, || {
                        socket.lock().read_frame()
                    })
                })
            }
        };

        let task = self.pending_receive.insert(task);
        let joined = task.await;
        self.pending_receive = None;

        joined.map_err(|e| TransportError::ReceiveFailed(format!("Task join error: {}", e)))?
    }

    async fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        if let Some(task) = self.pending_send.take() {
            let _ = task.await;
        }
        if let Some(task) = self.pending_receive.take() {
            if let Ok(Ok(Some(frame))) = task.await {
                warn!(interface = %self.interface, %frame, "Frame read during close was dropped");
            }
        }

        if self.socket.take().is_some() {
            debug!(interface = %self.interface, "SocketCAN socket closed");
        }
    }
}

/// Retry a non-blocking write until it succeeds, `deadline` passes or `stop` is set
fn write_loop(
    stop: &AtomicBool,
    deadline: Instant,
    mut write: impl FnMut() -> io::Result<()>,
) -> Result<(), TransportError> {
    loop {
        match write() {
            Ok(()) => return Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                if stop.load(Ordering::SeqCst) {
                    return Err(TransportError::ConnectionClosed);
                }
                if Instant::now() >= deadline {
                    return Err(TransportError::Timeout("Transmit queue full".to_string()));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(TransportError::SendFailed(e.to_string())),
        }
    }
}

/// Poll a non-blocking read until a data frame arrives, `deadline` passes or
/// `stop` is set
fn read_loop(
    stop: &AtomicBool,
    deadline: Instant,
    interface: &str,
    mut read: impl FnMut() -> io::Result<CanFrame>,
) -> Result<Option<FrameData>, TransportError> {
    loop {
        match read() {
            Ok(frame) if frame.is_error_frame() => {
                return Err(TransportError::ReceiveFailed(format!(
                    "Bus error frame on {}: 0x{:08X}",
                    interface,
                    frame.raw_id()
                )));
            }
            Ok(frame) if frame.is_remote_frame() => {
                debug!(interface = %interface, "Skipping remote frame");
            }
            Ok(frame) => return from_can_frame(&frame).map(Some),
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                warn!(interface = %interface, "SocketCAN read interrupted");
            }
            Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
        }

        if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_interfaces_filters_by_link_type() {
        let dir = tempfile::tempdir().unwrap();
        for (name, link_type) in [("can0", "280\n"), ("eth0", "1\n"), ("vcan0", "280\n")] {
            let iface = dir.path().join(name);
            std::fs::create_dir(&iface).unwrap();
            std::fs::write(iface.join("type"), link_type).unwrap();
        }

        let names = can_interfaces(dir.path()).unwrap();
        assert_eq!(names, vec!["can0".to_string(), "vcan0".to_string()]);
    }

    #[test]
    fn test_can_interfaces_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = can_interfaces(&dir.path().join("missing"));
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }

    fn would_block<T>() -> io::Result<T> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }

    #[test]
    fn test_read_loop_stops_when_flagged() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let result = read_loop(&stop, started + Duration::from_secs(30), "can0", would_block);
        setter.join().unwrap();

        assert_eq!(result, Ok(None));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_read_loop_skips_remote_frames() {
        let data = FrameData::new(0x7E8, vec![0x02, 0x50], false).unwrap();
        let mut frames = vec![
            to_can_frame(&data).unwrap(),
            CanFrame::new_remote(StandardId::new(0x7E8).unwrap(), 2).unwrap(),
        ];

        let stop = AtomicBool::new(false);
        let result = read_loop(&stop, Instant::now() + Duration::from_secs(1), "can0", || {
            frames.pop().map(Ok).unwrap_or_else(would_block)
        });
        assert_eq!(result, Ok(Some(data)));
    }

    #[test]
    fn test_write_loop_gives_up_when_flagged() {
        let stop = AtomicBool::new(true);
        let result = write_loop(&stop, Instant::now() + Duration::from_secs(30), would_block);
        assert_eq!(result, Err(TransportError::ConnectionClosed));
    }

    #[test]
    fn test_frame_conversion_keeps_id_space() {
        let standard = FrameData::new(0x123, vec![1, 2, 3], false).unwrap();
        let can_frame = to_can_frame(&standard).unwrap();
        assert_eq!(from_can_frame(&can_frame).unwrap(), standard);

        let extended = FrameData::new(0x18DA_F100, vec![0xFF], true).unwrap();
        let can_frame = to_can_frame(&extended).unwrap();
        assert_eq!(from_can_frame(&can_frame).unwrap(), extended);
    }
}
