//! Status command for showing the database location and catalog sizes.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use ep_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    writeln!(writer, "Exam planner status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    let workspaces = db.list_workspaces()?;
    if workspaces.is_empty() {
        writeln!(writer, "No workspaces.")?;
        return Ok(());
    }

    writeln!(writer, "Workspaces:")?;
    for workspace in workspaces {
        let counts = db.catalog_counts(&workspace.id)?;
        writeln!(
            writer,
            "- {} ({}): {} courses, {} exams, {} halls, {} students",
            workspace.name,
            workspace.id,
            counts.courses,
            counts.exams,
            counts.halls,
            counts.students
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::seed;

    #[test]
    fn status_without_workspaces() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ep.db");
        let db = Database::open(&path).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &path).unwrap();
        let text = String::from_utf8(output)
            .unwrap()
            .replace(&path.display().to_string(), "[DB]");

        assert_snapshot!(text, @r"
        Exam planner status
        Database: [DB]
        No workspaces.
        ");
    }

    #[test]
    fn status_lists_workspace_counts() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ep.db");
        let mut db = Database::open(&path).unwrap();
        seed::run(&mut Vec::<u8>::new(), &mut db, "Demo Workspace").unwrap();
        let workspace = db.list_workspaces().unwrap().remove(0);

        let mut output = Vec::new();
        run(&mut output, &db, &path).unwrap();
        let text = String::from_utf8(output)
            .unwrap()
            .replace(&path.display().to_string(), "[DB]")
            .replace(workspace.id.as_str(), "[ID]");

        assert_snapshot!(text, @r"
        Exam planner status
        Database: [DB]
        Workspaces:
        - Demo Workspace ([ID]): 7 courses, 7 exams, 5 halls, 50 students
        ");
    }
}
