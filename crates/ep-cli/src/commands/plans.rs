//! Plans command for listing a workspace's saved plans.

use std::io::Write;

use anyhow::{Context, Result};
use ep_core::WorkspaceId;
use ep_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, workspace: &str, json: bool) -> Result<()> {
    let workspace_id = WorkspaceId::new(workspace).context("invalid workspace id")?;
    let plans = db
        .list_plans(&workspace_id)
        .with_context(|| format!("failed to list plans of workspace {workspace_id}"))?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&plans)?)?;
        return Ok(());
    }

    if plans.is_empty() {
        writeln!(writer, "No saved plans.")?;
        return Ok(());
    }
    for plan in plans {
        writeln!(writer, "{}  {}  {}", plan.id, plan.created_at, plan.status)?;
    }
    Ok(())
}
