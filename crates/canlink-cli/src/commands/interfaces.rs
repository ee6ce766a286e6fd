//! Interfaces command - list connection candidates

use anyhow::Result;
use canlink_session::CanSession;

use crate::output::{InterfaceRow, OutputContext};

/// List candidates in the order fallback tries them
pub async fn interfaces(session: &CanSession, ctx: &OutputContext) -> Result<()> {
    let registry = session.registry();
    let rows: Vec<InterfaceRow> = session
        .candidates()
        .await
        .iter()
        .map(|desc| InterfaceRow::new(desc, registry.capability(desc.kind()).is_some()))
        .collect();

    ctx.print(&rows);
    Ok(())
}
