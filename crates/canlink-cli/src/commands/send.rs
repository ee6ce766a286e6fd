//! Send command - transmit one frame

use anyhow::{Context, Result};
use canlink_session::{CanSession, FrameData};

use crate::commands::connect;
use crate::output::{FrameRow, OutputContext};

/// Send `payload` as one frame and report the session status
pub async fn send(
    session: &CanSession,
    interface: Option<&str>,
    payload: &str,
    id: u32,
    extended: bool,
    hex: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let request = if hex {
        FrameData::from_hex(id, payload, extended)
    } else {
        FrameData::from_text(id, payload, extended)
    }
    .context("Invalid frame")?;

    connect(session, interface, ctx).await?;

    let result = session.send(request).await;
    if let Ok(frame) = &result {
        ctx.print(&[FrameRow::from(frame)]);
    }
    ctx.status(&session.status_line());
    session.disconnect().await;

    result.context("Send failed")?;
    Ok(())
}
