//! Log command - show stored messages of a project

use anyhow::{Context, Result};
use canlink_session::CanSession;

use crate::output::{MessageRow, OutputContext};

pub fn log(session: &CanSession, project: &str, ctx: &OutputContext) -> Result<()> {
    let rows: Vec<MessageRow> = session
        .history(project)
        .with_context(|| format!("Failed to read messages of project {}", project))?
        .into_iter()
        .map(MessageRow::from)
        .collect();

    ctx.print(&rows);
    Ok(())
}
