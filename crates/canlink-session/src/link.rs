//! Worker task owning an open transport handle
//!
//! Every send and receive is a command on one queue, so a handle never sees
//! two operations at once. A receive waits in short slices and serves queued
//! sends between them, so a send never waits for bus traffic. Shutdown lets
//! an in-flight send finish, interrupts a receive, answers queued commands
//! with [`LinkError::Cancelled`], and only then closes the handle.

use std::collections::VecDeque;
use std::time::Duration;

use canlink_core::{FrameData, InterfaceDescriptor, TransportError, TransportHandle};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

const COMMAND_QUEUE: usize = 32;

/// Longest single transport read while a receive is outstanding
const RECEIVE_SLICE: Duration = Duration::from_millis(10);

/// Pause between retries when a transport returns before its slice is over
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Slack given to a transport that overruns its own timeout
const OVERRUN_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkError {
    Transport(TransportError),
    /// The link shut down before the operation finished
    Cancelled,
}

enum Command {
    Send {
        frame: FrameData,
        timeout: Duration,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Receive {
        timeout: Duration,
        reply: oneshot::Sender<Result<Option<FrameData>, LinkError>>,
    },
}

impl Command {
    fn cancel(self) {
        match self {
            Command::Send { reply, .. } => {
                let _ = reply.send(Err(LinkError::Cancelled));
            }
            Command::Receive { reply, .. } => {
                let _ = reply.send(Err(LinkError::Cancelled));
            }
        }
    }
}

pub(crate) struct Link {
    max_payload: usize,
    commands: mpsc::Sender<Command>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Link {
    /// Move `handle` into a new worker task
    pub(crate) fn spawn(descriptor: InterfaceDescriptor, handle: Box<dyn TransportHandle>) -> Self {
        let max_payload = handle.max_payload_length();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run(descriptor, handle, commands_rx, shutdown_rx));

        Self {
            max_payload,
            commands: commands_tx,
            shutdown: shutdown_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) fn max_payload_length(&self) -> usize {
        self.max_payload
    }

    pub(crate) async fn send(&self, frame: FrameData, timeout: Duration) -> Result<(), LinkError> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Send {
            frame,
            timeout,
            reply,
        })
        .await?;
        response.await.map_err(|_| LinkError::Cancelled)?
    }

    pub(crate) async fn receive(&self, timeout: Duration) -> Result<Option<FrameData>, LinkError> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Receive { timeout, reply }).await?;
        response.await.map_err(|_| LinkError::Cancelled)?
    }

    async fn submit(&self, command: Command) -> Result<(), LinkError> {
        if *self.shutdown.borrow() {
            return Err(LinkError::Cancelled);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| LinkError::Cancelled)
    }

    /// Stop the worker and wait until the handle is closed
    pub(crate) async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Link worker ended abnormally");
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn run(
    descriptor: InterfaceDescriptor,
    mut handle: Box<dyn TransportHandle>,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(%descriptor, "Link worker started");

    // Receives that arrived while another receive was outstanding
    let mut deferred = VecDeque::new();

    loop {
        let command = match deferred.pop_front() {
            Some(command) => command,
            None => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            },
        };

        if *shutdown.borrow() {
            command.cancel();
            break;
        }

        match command {
            Command::Send {
                frame,
                timeout,
                reply,
            } => {
                let result = send_within(&mut handle, &frame, timeout)
                    .await
                    .map_err(LinkError::Transport);
                let _ = reply.send(result);
            }
            Command::Receive { timeout, reply } => {
                let result = receive_within(
                    &mut handle,
                    timeout,
                    &mut commands,
                    &mut deferred,
                    &mut shutdown,
                )
                .await;
                let cancelled = result == Err(LinkError::Cancelled);
                let _ = reply.send(result);
                if cancelled {
                    debug!(%descriptor, "In-flight receive cancelled");
                    break;
                }
            }
        }
    }

    commands.close();
    for command in deferred.drain(..) {
        command.cancel();
    }
    while let Ok(command) = commands.try_recv() {
        command.cancel();
    }

    handle.close().await;
    debug!(%descriptor, "Link worker stopped, handle closed");
}

async fn send_within(
    handle: &mut Box<dyn TransportHandle>,
    frame: &FrameData,
    timeout: Duration,
) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, handle.send(frame, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(format!(
            "send did not complete within {} ms",
            timeout.as_millis()
        ))),
    }
}

/// Run the sends queued so far; receives are kept for later
async fn serve_queued_sends(
    handle: &mut Box<dyn TransportHandle>,
    commands: &mut mpsc::Receiver<Command>,
    deferred: &mut VecDeque<Command>,
) {
    while let Ok(command) = commands.try_recv() {
        match command {
            Command::Send {
                frame,
                timeout,
                reply,
            } => {
                let result = send_within(handle, &frame, timeout)
                    .await
                    .map_err(LinkError::Transport);
                let _ = reply.send(result);
            }
            receive @ Command::Receive { .. } => deferred.push_back(receive),
        }
    }
}

/// Wait for one frame until `timeout` has fully elapsed
async fn receive_within(
    handle: &mut Box<dyn TransportHandle>,
    timeout: Duration,
    commands: &mut mpsc::Receiver<Command>,
    deferred: &mut VecDeque<Command>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<FrameData>, LinkError> {
    let deadline = Instant::now() + timeout;

    loop {
        serve_queued_sends(handle, commands, deferred).await;

        let slice = deadline
            .saturating_duration_since(Instant::now())
            .min(RECEIVE_SLICE);
        let slice_end = Instant::now() + slice;

        let polled = tokio::select! {
            biased;
            _ = shutdown.changed() => return Err(LinkError::Cancelled),
            polled = tokio::time::timeout(slice + OVERRUN_GRACE, handle.receive(slice)) => polled,
        };
        match polled {
            Ok(Ok(Some(frame))) => return Ok(Some(frame)),
            Ok(Ok(None)) | Err(_) => {}
            Ok(Err(e)) => return Err(LinkError::Transport(e)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        if now < slice_end {
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
