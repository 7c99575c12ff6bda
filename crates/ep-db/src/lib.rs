//! Storage layer for exam planning.
//!
//! Persists workspaces, their catalogs and saved plans using `rusqlite`, and
//! serves catalogs to the planner through [`CatalogSource`].
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization. Use one instance per
//! thread, or a `Mutex<Database>`.
//!
//! # Schema
//!
//! Every catalog table is keyed by `workspace_id` first, so identifiers only
//! need to be unique within a workspace. Deleting a workspace cascades to its
//! catalog and plans.
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond
//! precision (e.g., `2025-03-03T09:00:00.000Z`), so lexicographic ordering
//! matches chronological ordering.
//!
//! ## Plan Storage
//!
//! Saved plans keep the serialized [`ExamPlan`] JSON in the `data` column. The
//! `status` column duplicates the plan status for listing without parsing.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ep_core::{
    Building, CancelFlag, CatalogCounts, CatalogRecords, CatalogSource, Course, CourseCode,
    Department, Exam, ExamPlan, Hall, PlanStatus, Program, Student, StudentId, ValidationError,
    Workspace, WorkspaceId, WorkspaceRecords,
};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to encode or decode a stored plan.
    #[error("invalid plan data: {0}")]
    Json(#[from] serde_json::Error),
    /// Imported or stored records failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),
    #[error("plan not found: {0}")]
    PlanNotFound(String),
    /// A catalog read was abandoned because cancellation was requested.
    #[error("catalog read cancelled")]
    Cancelled,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A workspace row with its creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSummary {
    pub id: WorkspaceId,
    pub name: String,
    pub created_at: String,
}

/// Metadata of a saved plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanRecord {
    pub id: String,
    pub workspace_id: WorkspaceId,
    pub created_at: String,
    pub status: PlanStatus,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS departments (
                workspace_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (workspace_id, id),
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS programs (
                workspace_id TEXT NOT NULL,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (workspace_id, code),
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS courses (
                workspace_id TEXT NOT NULL,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                department_id TEXT NOT NULL,
                program_code TEXT NOT NULL,
                PRIMARY KEY (workspace_id, code),
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
            );

            -- One exam per course; keyed by the course code.
            CREATE TABLE IF NOT EXISTS exams (
                workspace_id TEXT NOT NULL,
                course_code TEXT NOT NULL,
                course_name TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                program_code TEXT NOT NULL,
                PRIMARY KEY (workspace_id, course_code),
                FOREIGN KEY (workspace_id, course_code)
                    REFERENCES courses(workspace_id, code) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS buildings (
                workspace_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (workspace_id, id),
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
            );

            -- Hall ids repeat across buildings.
            CREATE TABLE IF NOT EXISTS halls (
                workspace_id TEXT NOT NULL,
                building_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                seat_rows INTEGER NOT NULL,
                seat_columns INTEGER NOT NULL,
                capacity INTEGER NOT NULL,
                PRIMARY KEY (workspace_id, building_id, id),
                FOREIGN KEY (workspace_id, building_id)
                    REFERENCES buildings(workspace_id, id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS students (
                workspace_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                department_id TEXT NOT NULL,
                program TEXT NOT NULL,
                PRIMARY KEY (workspace_id, id),
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS student_courses (
                workspace_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                course_code TEXT NOT NULL,
                PRIMARY KEY (workspace_id, student_id, course_code),
                FOREIGN KEY (workspace_id, student_id)
                    REFERENCES students(workspace_id, id) ON DELETE CASCADE,
                FOREIGN KEY (workspace_id, course_code)
                    REFERENCES courses(workspace_id, code) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_student_courses_course
                ON student_courses(workspace_id, course_code);

            -- Saved plans; data holds the plan JSON.
            CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL,
                FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_plans_workspace ON plans(workspace_id, created_at);
            ",
        )?;
        Ok(())
    }

    /// Creates a workspace with a fresh id.
    pub fn create_workspace(&self, name: &str) -> Result<Workspace, DbError> {
        self.create_workspace_at(name, Utc::now())
    }

    fn create_workspace_at(&self, name: &str, now: DateTime<Utc>) -> Result<Workspace, DbError> {
        if name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "workspace name",
            }
            .into());
        }
        let workspace = Workspace {
            id: WorkspaceId::new(Uuid::new_v4().to_string())?,
            name: name.to_string(),
        };
        self.conn.execute(
            "INSERT INTO workspaces (id, name, created_at) VALUES (?, ?, ?)",
            params![workspace.id.as_str(), workspace.name, format_timestamp(now)],
        )?;
        tracing::debug!(workspace = %workspace.id, name, "created workspace");
        Ok(workspace)
    }

    /// Lists workspaces, oldest first.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceSummary>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM workspaces ORDER BY created_at ASC, id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(WorkspaceSummary {
                id: get_id(row, 0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut workspaces = Vec::new();
        for row in rows {
            workspaces.push(row?);
        }
        Ok(workspaces)
    }

    pub fn workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM workspaces WHERE id = ?")?;
        let mut rows = stmt.query_map([id.as_str()], |row| {
            Ok(Workspace {
                id: get_id(row, 0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    /// Replaces the catalog of a workspace.
    ///
    /// The records are validated as a whole first; on any error the stored
    /// catalog is left untouched.
    pub fn import_catalog(
        &mut self,
        workspace_id: &WorkspaceId,
        records: &CatalogRecords,
    ) -> Result<CatalogCounts, DbError> {
        let workspace = self
            .workspace(workspace_id)?
            .ok_or_else(|| DbError::WorkspaceNotFound(workspace_id.to_string()))?;
        let counts = ep_core::Catalog::from_records(workspace, records.clone())?.counts();

        let ws = workspace_id.as_str();
        let tx = self.conn.transaction()?;
        for table in [
            "student_courses",
            "students",
            "halls",
            "buildings",
            "exams",
            "courses",
            "programs",
            "departments",
        ] {
            tx.execute(&format!("DELETE FROM {table} WHERE workspace_id = ?"), [ws])?;
        }
        {
            let mut stmt =
                tx.prepare("INSERT INTO departments (workspace_id, id, name) VALUES (?, ?, ?)")?;
            for department in &records.departments {
                stmt.execute(params![ws, department.id.as_str(), department.name])?;
            }

            let mut stmt =
                tx.prepare("INSERT INTO programs (workspace_id, code, name) VALUES (?, ?, ?)")?;
            for program in &records.programs {
                stmt.execute(params![ws, program.code.as_str(), program.name])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT INTO courses (workspace_id, code, name, department_id, program_code)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for course in &records.courses {
                stmt.execute(params![
                    ws,
                    course.code.as_str(),
                    course.name,
                    course.department_id.as_str(),
                    course.program_code.as_str(),
                ])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT INTO exams (workspace_id, course_code, course_name, duration_minutes, program_code)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for exam in &records.exams {
                stmt.execute(params![
                    ws,
                    exam.course_code.as_str(),
                    exam.course_name,
                    exam.duration_minutes,
                    exam.program_code.as_str(),
                ])?;
            }

            let mut stmt =
                tx.prepare("INSERT INTO buildings (workspace_id, id, name) VALUES (?, ?, ?)")?;
            for building in &records.buildings {
                stmt.execute(params![ws, building.id.as_str(), building.name])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT INTO halls (workspace_id, building_id, id, name, seat_rows, seat_columns, capacity)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for hall in &records.halls {
                stmt.execute(params![
                    ws,
                    hall.building_id.as_str(),
                    hall.id.as_str(),
                    hall.name,
                    hall.rows,
                    hall.columns,
                    hall.capacity,
                ])?;
            }

            let mut student_stmt = tx.prepare(
                "
                INSERT INTO students (workspace_id, id, name, department_id, program)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            let mut enrollment_stmt = tx.prepare(
                "INSERT INTO student_courses (workspace_id, student_id, course_code) VALUES (?, ?, ?)",
            )?;
            for student in &records.students {
                student_stmt.execute(params![
                    ws,
                    student.id.as_str(),
                    student.name,
                    student.department_id.as_str(),
                    student.program,
                ])?;
                for code in &student.enrolled_courses {
                    enrollment_stmt.execute(params![ws, student.id.as_str(), code.as_str()])?;
                }
            }
        }
        tx.commit()?;

        tracing::debug!(
            workspace = %workspace_id,
            courses = counts.courses,
            exams = counts.exams,
            halls = counts.halls,
            students = counts.students,
            "imported catalog"
        );
        Ok(counts)
    }

    /// Entity counts of a workspace's stored catalog.
    pub fn catalog_counts(&self, workspace_id: &WorkspaceId) -> Result<CatalogCounts, DbError> {
        let count = |table: &str| -> Result<usize, DbError> {
            let n: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE workspace_id = ?"),
                [workspace_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(n).unwrap_or_default())
        };
        Ok(CatalogCounts {
            departments: count("departments")?,
            programs: count("programs")?,
            courses: count("courses")?,
            exams: count("exams")?,
            buildings: count("buildings")?,
            halls: count("halls")?,
            students: count("students")?,
        })
    }

    /// Stores a plan in the workspace's history and returns its record.
    pub fn save_plan(
        &self,
        workspace_id: &WorkspaceId,
        plan: &ExamPlan,
    ) -> Result<PlanRecord, DbError> {
        self.save_plan_at(workspace_id, plan, Utc::now())
    }

    fn save_plan_at(
        &self,
        workspace_id: &WorkspaceId,
        plan: &ExamPlan,
        now: DateTime<Utc>,
    ) -> Result<PlanRecord, DbError> {
        if self.workspace(workspace_id)?.is_none() {
            return Err(DbError::WorkspaceNotFound(workspace_id.to_string()));
        }
        let record = PlanRecord {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.clone(),
            created_at: format_timestamp(now),
            status: plan.status,
        };
        let data = serde_json::to_string(plan)?;
        self.conn.execute(
            "INSERT INTO plans (id, workspace_id, created_at, status, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.id,
                workspace_id.as_str(),
                record.created_at,
                record.status.as_str(),
                data,
            ],
        )?;
        tracing::debug!(plan = %record.id, workspace = %workspace_id, status = %record.status, "saved plan");
        Ok(record)
    }

    /// Lists saved plans of a workspace, newest first.
    pub fn list_plans(&self, workspace_id: &WorkspaceId) -> Result<Vec<PlanRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, workspace_id, created_at, status
            FROM plans
            WHERE workspace_id = ?
            ORDER BY created_at DESC, id DESC
            ",
        )?;
        let rows = stmt.query_map([workspace_id.as_str()], plan_record)?;
        let mut plans = Vec::new();
        for row in rows {
            plans.push(row?);
        }
        Ok(plans)
    }

    /// Loads a saved plan by id.
    pub fn get_plan(&self, id: &str) -> Result<(PlanRecord, ExamPlan), DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, workspace_id, created_at, status, data FROM plans WHERE id = ?",
        )?;
        let mut rows = stmt.query_map([id], |row| Ok((plan_record(row)?, row.get::<_, String>(4)?)))?;
        let (record, data) = rows
            .next()
            .transpose()?
            .ok_or_else(|| DbError::PlanNotFound(id.to_string()))?;
        let plan = serde_json::from_str(&data)?;
        Ok((record, plan))
    }

    fn read_records(
        &self,
        ws: &str,
        cancel: &CancelFlag,
    ) -> Result<CatalogRecords, DbError> {
        let checkpoint = || {
            if cancel.is_cancelled() {
                Err(DbError::Cancelled)
            } else {
                Ok(())
            }
        };
        let mut records = CatalogRecords::default();

        checkpoint()?;
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM departments WHERE workspace_id = ? ORDER BY id")?;
        for row in stmt.query_map([ws], |row| {
            Ok(Department {
                id: get_id(row, 0)?,
                name: row.get(1)?,
            })
        })? {
            records.departments.push(row?);
        }

        checkpoint()?;
        let mut stmt = self
            .conn
            .prepare("SELECT code, name FROM programs WHERE workspace_id = ? ORDER BY code")?;
        for row in stmt.query_map([ws], |row| {
            Ok(Program {
                code: get_id(row, 0)?,
                name: row.get(1)?,
            })
        })? {
            records.programs.push(row?);
        }

        checkpoint()?;
        let mut stmt = self.conn.prepare(
            "
            SELECT code, name, department_id, program_code
            FROM courses
            WHERE workspace_id = ?
            ORDER BY code
            ",
        )?;
        for row in stmt.query_map([ws], |row| {
            Ok(Course {
                code: get_id(row, 0)?,
                name: row.get(1)?,
                department_id: get_id(row, 2)?,
                program_code: get_id(row, 3)?,
            })
        })? {
            records.courses.push(row?);
        }

        checkpoint()?;
        let mut stmt = self.conn.prepare(
            "
            SELECT course_code, course_name, duration_minutes, program_code
            FROM exams
            WHERE workspace_id = ?
            ORDER BY course_code
            ",
        )?;
        for row in stmt.query_map([ws], |row| {
            Ok(Exam {
                course_code: get_id(row, 0)?,
                course_name: row.get(1)?,
                duration_minutes: row.get(2)?,
                program_code: get_id(row, 3)?,
            })
        })? {
            records.exams.push(row?);
        }

        checkpoint()?;
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM buildings WHERE workspace_id = ? ORDER BY id")?;
        for row in stmt.query_map([ws], |row| {
            Ok(Building {
                id: get_id(row, 0)?,
                name: row.get(1)?,
            })
        })? {
            records.buildings.push(row?);
        }

        checkpoint()?;
        let mut stmt = self.conn.prepare(
            "
            SELECT building_id, id, name, seat_rows, seat_columns, capacity
            FROM halls
            WHERE workspace_id = ?
            ORDER BY building_id, id
            ",
        )?;
        for row in stmt.query_map([ws], |row| {
            Ok(Hall {
                building_id: get_id(row, 0)?,
                id: get_id(row, 1)?,
                name: row.get(2)?,
                rows: row.get(3)?,
                columns: row.get(4)?,
                capacity: row.get(5)?,
            })
        })? {
            records.halls.push(row?);
        }

        checkpoint()?;
        let mut enrollments: BTreeMap<StudentId, Vec<CourseCode>> = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "
            SELECT student_id, course_code
            FROM student_courses
            WHERE workspace_id = ?
            ORDER BY student_id, course_code
            ",
        )?;
        for row in stmt.query_map([ws], |row| Ok((get_id(row, 0)?, get_id(row, 1)?)))? {
            let (student_id, code) = row?;
            enrollments.entry(student_id).or_default().push(code);
        }

        checkpoint()?;
        let mut stmt = self.conn.prepare(
            "
            SELECT id, name, department_id, program
            FROM students
            WHERE workspace_id = ?
            ORDER BY id
            ",
        )?;
        for row in stmt.query_map([ws], |row| {
            Ok(Student {
                id: get_id(row, 0)?,
                name: row.get(1)?,
                department_id: get_id(row, 2)?,
                program: row.get(3)?,
                enrolled_courses: Default::default(),
            })
        })? {
            let mut student = row?;
            if let Some(codes) = enrollments.remove(&student.id) {
                student.enrolled_courses = codes.into_iter().collect();
            }
            records.students.push(student);
        }

        Ok(records)
    }
}

impl CatalogSource for Database {
    type Error = DbError;

    /// Reads every catalog table of the workspace inside one transaction.
    fn fetch(
        &self,
        workspace_id: &WorkspaceId,
        cancel: &CancelFlag,
    ) -> Result<Option<WorkspaceRecords>, Self::Error> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(workspace) = self.workspace(workspace_id)? else {
            return Ok(None);
        };
        let records = self.read_records(workspace_id.as_str(), cancel)?;
        tx.commit()?;
        Ok(Some(WorkspaceRecords { workspace, records }))
    }
}

fn plan_record(row: &Row<'_>) -> rusqlite::Result<PlanRecord> {
    let status: String = row.get(3)?;
    Ok(PlanRecord {
        id: row.get(0)?,
        workspace_id: get_id(row, 1)?,
        created_at: row.get(2)?,
        status: status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
    })
}

/// Reads a validated identifier column.
fn get_id<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: TryFrom<String, Error = ValidationError>,
{
    let raw: String = row.get(idx)?;
    T::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
