//! Show command for printing a saved plan.

use std::io::Write;

use anyhow::{Context, Result};
use ep_db::Database;

use super::report::write_plan;

pub fn run<W: Write>(writer: &mut W, db: &Database, id: &str, json: bool) -> Result<()> {
    let (record, plan) = db
        .get_plan(id)
        .with_context(|| format!("failed to load plan {id}"))?;

    if json {
        writeln!(writer, "{}", plan.to_json()?)?;
        return Ok(());
    }

    writeln!(writer, "Plan {}", record.id)?;
    writeln!(writer, "Workspace: {}", record.workspace_id)?;
    writeln!(writer, "Created: {}", record.created_at)?;
    writeln!(writer)?;
    write_plan(writer, &plan)
}
