//! Human-readable rendering of exam plans.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use ep_core::{ExamPlan, TimetableEntry};

/// Writes the plan as sections: summary, timetable, seating, conflicts.
pub fn write_plan<W: Write>(writer: &mut W, plan: &ExamPlan) -> Result<()> {
    writeln!(writer, "Status: {}", plan.status)?;
    writeln!(writer, "Scheduled exams: {}", plan.timetable.len())?;
    writeln!(writer, "Allocated seats: {}", plan.allocations.len())?;

    writeln!(writer)?;
    writeln!(writer, "TIMETABLE")?;
    writeln!(writer, "─────────")?;
    if plan.timetable.is_empty() {
        writeln!(writer, "(no exams scheduled)")?;
    }
    for entry in &plan.timetable {
        let line = format!(
            "{}  {}-{}  {}  {}",
            entry.date,
            entry.start_time.format("%H:%M"),
            entry.end_time.format("%H:%M"),
            entry.course_code,
            entry.course_name.as_deref().unwrap_or_default()
        );
        writeln!(writer, "{}", line.trim_end())?;
    }

    writeln!(writer)?;
    writeln!(writer, "SEATING")?;
    writeln!(writer, "───────")?;
    let usage = hall_usage(plan);
    if usage.is_empty() {
        writeln!(writer, "(no seats allocated)")?;
    }
    for ((sitting, hall, course), seats) in usage {
        writeln!(writer, "{sitting}  {hall}  {course}  {seats} seats")?;
    }

    writeln!(writer)?;
    writeln!(writer, "CONFLICTS")?;
    writeln!(writer, "─────────")?;
    if plan.conflicts.is_empty() {
        writeln!(writer, "(none)")?;
    }
    for conflict in &plan.conflicts {
        writeln!(writer, "- {conflict}")?;
    }

    Ok(())
}

/// Seats per (sitting, hall, exam), in chronological then hall order.
fn hall_usage(plan: &ExamPlan) -> BTreeMap<(String, String, String), usize> {
    let entries: BTreeMap<&str, &TimetableEntry> = plan
        .timetable
        .iter()
        .map(|e| (e.course_code.as_str(), e))
        .collect();

    let mut usage = BTreeMap::new();
    for allocation in &plan.allocations {
        let Some(entry) = entries.get(allocation.exam_course_code.as_str()) else {
            continue;
        };
        let sitting = format!("{} {}", entry.date, entry.start_time.format("%H:%M"));
        *usage
            .entry((
                sitting,
                allocation.hall_key().to_string(),
                allocation.exam_course_code.to_string(),
            ))
            .or_default() += 1;
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, NaiveTime};
    use ep_core::{Allocation, BuildingId, CourseCode, HallId, PlanStatus, StudentId};
    use insta::assert_snapshot;

    fn seat(student: &str, code: &str, hall: &str, seat: &str) -> Allocation {
        Allocation {
            student_id: StudentId::new(student).unwrap(),
            exam_course_code: CourseCode::new(code).unwrap(),
            building_id: BuildingId::new("BGB").unwrap(),
            hall_id: HallId::new(hall).unwrap(),
            seat_number: seat.to_string(),
        }
    }

    fn entry(code: &str, name: Option<&str>, hour: u32) -> TimetableEntry {
        TimetableEntry {
            course_code: CourseCode::new(code).unwrap(),
            course_name: name.map(str::to_string),
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 3, 0, 0).unwrap(),
        }
    }

    #[test]
    fn plan_report_lists_every_section() {
        let plan = ExamPlan {
            status: PlanStatus::Partial,
            timetable: vec![
                entry("CS101", Some("Introduction to Programming"), 9),
                entry("MA101", None, 12),
            ],
            allocations: vec![
                seat("S1", "CS101", "101", "S-1"),
                seat("S2", "CS101", "101", "S-2"),
                seat("S3", "CS101", "102", "S-1"),
                seat("S1", "MA101", "101", "S-1"),
            ],
            conflicts: vec!["course EC101 has no enrolled students".to_string()],
            halls: Vec::new(),
        };

        let mut output = Vec::new();
        write_plan(&mut output, &plan).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Status: partial
        Scheduled exams: 2
        Allocated seats: 4

        TIMETABLE
        ─────────
        2025-03-03  09:00-12:00  CS101  Introduction to Programming
        2025-03-03  12:00-15:00  MA101

        SEATING
        ───────
        2025-03-03 09:00  BGB/101  CS101  2 seats
        2025-03-03 09:00  BGB/102  CS101  1 seats
        2025-03-03 12:00  BGB/101  MA101  1 seats

        CONFLICTS
        ─────────
        - course EC101 has no enrolled students
        ");
    }

    #[test]
    fn empty_plan_report() {
        let plan = ExamPlan {
            status: PlanStatus::Complete,
            timetable: Vec::new(),
            allocations: Vec::new(),
            conflicts: Vec::new(),
            halls: Vec::new(),
        };

        let mut output = Vec::new();
        write_plan(&mut output, &plan).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Status: complete
        Scheduled exams: 0
        Allocated seats: 0

        TIMETABLE
        ─────────
        (no exams scheduled)

        SEATING
        ───────
        (no seats allocated)

        CONFLICTS
        ─────────
        (none)
        ");
    }
}
