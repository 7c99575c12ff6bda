//! Seed command for creating a demo workspace.
//!
//! Three departments share three buildings with five halls. Fifty students
//! each take their department's two courses, and every other student also
//! takes the common mathematics course.

use std::io::Write;

use anyhow::{Context, Result};
use ep_core::{
    Building, BuildingId, CatalogRecords, Course, CourseCode, Department, DepartmentId, Exam,
    Hall, HallId, Program, ProgramCode, Student, StudentId, ValidationError,
};
use ep_db::Database;

use super::import::write_counts;

const DEPARTMENTS: [(&str, &str); 3] = [
    ("CSE", "Computer Science and Engineering"),
    ("ECE", "Electronics and Communication Engineering"),
    ("ME", "Mechanical Engineering"),
];

const BUILDINGS: [(&str, &str); 3] = [
    ("BGB", "Bill Gates Bhavan"),
    ("SRB", "Sarvepalli Radhakrishnan Bhavan"),
    ("LB", "Library Block"),
];

/// (building, hall, name, capacity)
const HALLS: [(&str, &str, &str, u32); 5] = [
    ("BGB", "101", "BGB Hall 101", 30),
    ("BGB", "102", "BGB Hall 102", 30),
    ("BGB", "201", "BGB Hall 201", 40),
    ("SRB", "105", "SRB Seminar Hall", 50),
    ("SRB", "210", "SRB Conf Room", 20),
];

/// (code, name, department)
const COURSES: [(&str, &str, &str); 7] = [
    ("CS101", "Introduction to Programming", "CSE"),
    ("CS102", "Data Structures", "CSE"),
    ("EC101", "Circuit Theory", "ECE"),
    ("EC102", "Signals and Systems", "ECE"),
    ("ME101", "Engineering Mechanics", "ME"),
    ("ME102", "Thermodynamics", "ME"),
    ("MA101", "Calculus I", "CSE"),
];

const STUDENTS: usize = 50;
const PROGRAM: &str = "BTECH";

/// Builds the demo catalog.
pub fn demo_catalog() -> Result<CatalogRecords, ValidationError> {
    let program = ProgramCode::new(PROGRAM)?;

    let departments = DEPARTMENTS
        .iter()
        .map(|(id, name)| {
            Ok(Department {
                id: DepartmentId::new(*id)?,
                name: (*name).to_string(),
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    let buildings = BUILDINGS
        .iter()
        .map(|(id, name)| {
            Ok(Building {
                id: BuildingId::new(*id)?,
                name: (*name).to_string(),
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    let halls = HALLS
        .iter()
        .map(|(building, id, name, capacity)| {
            Ok(Hall {
                id: HallId::new(*id)?,
                name: (*name).to_string(),
                building_id: BuildingId::new(*building)?,
                rows: ep_core::types::DEFAULT_HALL_ROWS,
                columns: ep_core::types::DEFAULT_HALL_COLUMNS,
                capacity: *capacity,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    let mut courses = Vec::new();
    let mut exams = Vec::new();
    for (code, name, department) in COURSES {
        courses.push(Course {
            code: CourseCode::new(code)?,
            name: name.to_string(),
            department_id: DepartmentId::new(department)?,
            program_code: program.clone(),
        });
        exams.push(Exam {
            course_code: CourseCode::new(code)?,
            course_name: name.to_string(),
            duration_minutes: ep_core::types::DEFAULT_EXAM_MINUTES,
            program_code: program.clone(),
        });
    }

    let mut students = Vec::with_capacity(STUDENTS);
    for i in 0..STUDENTS {
        let (department, _) = DEPARTMENTS[i % DEPARTMENTS.len()];
        let mut enrolled: Vec<&str> = COURSES
            .iter()
            .filter(|(code, _, dept)| *dept == department && !code.starts_with("MA"))
            .map(|(code, _, _)| *code)
            .collect();
        if i % 2 == 0 {
            enrolled.push("MA101");
        }
        students.push(Student {
            id: StudentId::new(format!("S{}", 2_024_000 + i))?,
            name: format!("Student {}", i + 1),
            department_id: DepartmentId::new(department)?,
            program: if i % 2 == 0 { "B.Tech" } else { "M.Tech" }.to_string(),
            enrolled_courses: enrolled
                .into_iter()
                .map(CourseCode::new)
                .collect::<Result<_, _>>()?,
        });
    }

    Ok(CatalogRecords {
        departments,
        programs: vec![Program {
            code: program,
            name: "Bachelor of Technology".to_string(),
        }],
        courses,
        exams,
        buildings,
        halls,
        students,
    })
}

pub fn run<W: Write>(writer: &mut W, db: &mut Database, name: &str) -> Result<()> {
    let records = demo_catalog().context("invalid demo catalog")?;
    let workspace = db
        .create_workspace(name)
        .context("failed to create workspace")?;
    let counts = db
        .import_catalog(&workspace.id, &records)
        .context("failed to import demo catalog")?;
    tracing::info!(workspace = %workspace.id, "demo workspace seeded");

    writeln!(writer, "Seeded workspace {} ({})", workspace.name, workspace.id)?;
    write_counts(writer, &counts)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use ep_core::{CancelFlag, PlanRequest, PlanStatus, Planner};

    use crate::HorizonSettings;

    #[test]
    fn demo_catalog_matches_documented_shape() {
        let records = demo_catalog().unwrap();
        assert_eq!(records.departments.len(), 3);
        assert_eq!(records.buildings.len(), 3);
        assert_eq!(records.halls.len(), 5);
        assert_eq!(records.exams.len(), 7);
        assert_eq!(records.students.len(), 50);

        let first = &records.students[0];
        let codes: Vec<&str> = first.enrolled_courses.iter().map(CourseCode::as_str).collect();
        assert_eq!(codes, vec!["CS101", "CS102", "MA101"]);
        assert_eq!(records.students[1].enrolled_courses.len(), 2);
    }

    #[test]
    fn seeded_workspace_plans_completely() {
        let mut db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &mut db, "Demo Workspace").unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Seeded workspace Demo Workspace ("));
        assert!(text.contains("Halls:       5"));

        let workspace = db.list_workspaces().unwrap().remove(0);
        let horizon = HorizonSettings::default()
            .resolve(
                Some(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()),
                None,
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            )
            .unwrap();
        let request = PlanRequest {
            horizon: Some(horizon),
            ..PlanRequest::new(workspace.id)
        };

        let plan = Planner::default()
            .plan(&db, &request, &CancelFlag::new())
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Complete);
        assert_eq!(plan.timetable.len(), 7);
        // 50 students with two department courses, half also take MA101.
        assert_eq!(plan.allocations.len(), 125);
    }
}
