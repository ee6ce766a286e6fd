//! Receive command - wait for a number of frames

use std::time::Duration;

use anyhow::{Context, Result};
use canlink_session::{CanSession, ReceiveOutcome};

use crate::commands::connect;
use crate::output::{FrameRow, OutputContext};

/// Receive up to `count` frames, waiting `timeout` for each
pub async fn receive(
    session: &CanSession,
    interface: Option<&str>,
    timeout: Duration,
    count: usize,
    ctx: &OutputContext,
) -> Result<()> {
    connect(session, interface, ctx).await?;

    let mut rows = Vec::new();
    let mut failure = None;
    while rows.len() < count {
        match session.receive(timeout).await {
            Ok(ReceiveOutcome::Frame(frame)) => rows.push(FrameRow::from(&frame)),
            Ok(ReceiveOutcome::TimedOut) => {
                ctx.warn(&format!("No frame within {} ms", timeout.as_millis()));
                break;
            }
            Ok(ReceiveOutcome::Cancelled) => break,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    ctx.print(&rows);
    ctx.status(&session.status_line());
    session.disconnect().await;

    match failure {
        Some(e) => Err(e).context("Receive failed"),
        None => Ok(()),
    }
}
