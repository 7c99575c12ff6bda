//! Workspaces command for listing workspaces.

use std::io::Write;

use anyhow::Result;
use ep_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let workspaces = db.list_workspaces()?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&workspaces)?)?;
        return Ok(());
    }

    if workspaces.is_empty() {
        writeln!(writer, "No workspaces. Run 'ep init <name>' or 'ep seed' to create one.")?;
        return Ok(());
    }
    for workspace in workspaces {
        writeln!(
            writer,
            "{}  {}  (created {})",
            workspace.id, workspace.name, workspace.created_at
        )?;
    }
    Ok(())
}
