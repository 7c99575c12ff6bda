//! Import command for loading a catalog document into a workspace.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use ep_core::{CatalogCounts, CatalogRecords, WorkspaceId};
use ep_db::Database;

/// Parses a catalog document.
pub fn read_catalog(path: &Path) -> Result<CatalogRecords> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse catalog {}", path.display()))
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    workspace_id: &WorkspaceId,
    path: &Path,
) -> Result<()> {
    let records = read_catalog(path)?;
    let counts = db
        .import_catalog(workspace_id, &records)
        .with_context(|| format!("failed to import catalog into workspace {workspace_id}"))?;
    tracing::info!(workspace = %workspace_id, path = %path.display(), "catalog imported");

    writeln!(writer, "Imported into workspace {workspace_id}:")?;
    write_counts(writer, &counts)?;
    Ok(())
}

/// One line per entity kind.
pub fn write_counts<W: Write>(writer: &mut W, counts: &CatalogCounts) -> Result<()> {
    writeln!(writer, "  Departments: {}", counts.departments)?;
    writeln!(writer, "  Programs:    {}", counts.programs)?;
    writeln!(writer, "  Courses:     {}", counts.courses)?;
    writeln!(writer, "  Exams:       {}", counts.exams)?;
    writeln!(writer, "  Buildings:   {}", counts.buildings)?;
    writeln!(writer, "  Halls:       {}", counts.halls)?;
    writeln!(writer, "  Students:    {}", counts.students)?;
    Ok(())
}
