//! Command implementations for canlink

pub mod interfaces;
pub mod log;
pub mod monitor;
pub mod receive;
pub mod send;

pub use interfaces::interfaces;
pub use log::log;
pub use monitor::monitor;
pub use receive::receive;
pub use send::send;

use anyhow::{Context, Result};
use canlink_session::{CanSession, InterfaceDescriptor};

use crate::output::OutputContext;

/// Connect by name when an interface was chosen, otherwise fall back
/// through the candidate list
pub async fn connect(
    session: &CanSession,
    interface: Option<&str>,
    ctx: &OutputContext,
) -> Result<InterfaceDescriptor> {
    let descriptor = match interface {
        Some(name) => session
            .connect_by_name(name)
            .await
            .with_context(|| format!("Failed to connect to {}", name))?,
        None => session
            .connect_fallback()
            .await
            .context("Failed to connect to any interface")?,
    };
    ctx.success(&format!("Connected to {}", descriptor));
    Ok(descriptor)
}
