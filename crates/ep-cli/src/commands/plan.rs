//! Plan command for building a timetable and seat allocation.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use ep_core::{CancelFlag, CourseCode, PlanRequest, Planner, WorkspaceId};
use ep_db::Database;

use super::report::write_plan;
use crate::{Config, PlanArgs};

/// Runs the plan command. `today` anchors the default start date.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    args: &PlanArgs,
    today: NaiveDate,
) -> Result<()> {
    let workspace_id =
        WorkspaceId::new(args.workspace.as_str()).context("invalid workspace id")?;
    let horizon = config
        .horizon
        .resolve(args.start, args.days, today)
        .context("invalid scheduling horizon")?;
    let exam_filter = if args.exams.is_empty() {
        None
    } else {
        Some(
            args.exams
                .iter()
                .map(|code| CourseCode::new(code.as_str()))
                .collect::<Result<Vec<_>, _>>()
                .context("invalid exam code")?,
        )
    };
    let request = PlanRequest {
        workspace_id: workspace_id.clone(),
        horizon: Some(horizon),
        exam_filter,
    };

    let planner = Planner::new(config.planner_config());
    let plan = planner
        .plan(db, &request, &CancelFlag::new())
        .with_context(|| format!("failed to plan workspace {workspace_id}"))?;
    tracing::info!(
        workspace = %workspace_id,
        status = %plan.status,
        exams = plan.timetable.len(),
        seats = plan.allocations.len(),
        conflicts = plan.conflicts.len(),
        "plan built"
    );

    if args.json {
        writeln!(writer, "{}", plan.to_json()?)?;
    } else {
        write_plan(writer, &plan)?;
    }

    if args.save {
        let record = db
            .save_plan(&workspace_id, &plan)
            .context("failed to save plan")?;
        // Keep stdout parseable in JSON mode.
        if args.json {
            eprintln!("Saved plan {}", record.id);
        } else {
            writeln!(writer)?;
            writeln!(writer, "Saved plan {}", record.id)?;
        }
    }

    Ok(())
}
