//! Monitor command - print bus traffic until Ctrl+C

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use canlink_session::{CanSession, ReceiveOutcome};

use crate::commands::connect;
use crate::output::{OutputContext, OutputFormat};

/// How long one receive waits before the stop flag is checked again
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub async fn monitor(
    session: &CanSession,
    interface: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    connect(session, interface, ctx).await?;
    ctx.info("Press Ctrl+C to stop");

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if ctx.format == OutputFormat::Table && !ctx.quiet {
        println!();
    }

    let mut first = true;
    let mut failure = None;
    while running.load(Ordering::SeqCst) {
        match session.receive(POLL_TIMEOUT).await {
            Ok(ReceiveOutcome::Frame(frame)) => {
                ctx.print_frame_line(&frame, first);
                first = false;
            }
            Ok(ReceiveOutcome::TimedOut) => {}
            Ok(ReceiveOutcome::Cancelled) => break,
            Err(e) => {
                ctx.error(&format!("Receive error: {}", e));
                failure = Some(e);
                break;
            }
        }
    }

    ctx.info("\nStopping monitor...");
    session.disconnect().await;
    ctx.status(&session.status_line());

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
