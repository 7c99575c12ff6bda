//! Init command for creating a workspace.

use std::io::Write;

use anyhow::{Context, Result};
use ep_db::Database;

/// Runs the init command.
pub fn run<W: Write>(writer: &mut W, db: &Database, name: &str) -> Result<()> {
    let workspace = db
        .create_workspace(name)
        .context("failed to create workspace")?;
    tracing::info!(workspace = %workspace.id, "workspace created");

    writeln!(writer, "{}", workspace.id)?;
    Ok(())
}
