//! Read-only catalog snapshot for one scheduling run.
//!
//! All entities are loaded once into id-indexed maps. Later stages refer to
//! entities by id and never mutate the catalog, so a run sees one consistent
//! view even if the backing store is edited concurrently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    Building, BuildingId, Course, CourseCode, Department, DepartmentId, Exam, Hall, HallKey,
    Program, ProgramCode, Student, StudentId, ValidationError, Workspace, WorkspaceId,
};

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The workspace does not exist in the source.
    #[error("workspace not found: {0}")]
    NotFound(WorkspaceId),
    /// The fetched records are malformed or reference missing entities.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Cancellation was requested before scheduling started.
    #[error("catalog load cancelled")]
    Cancelled,
    /// The backing store failed.
    #[error("catalog source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Cooperative cancellation for the catalog load.
///
/// Clones share the same flag. Once scheduling starts the flag is ignored.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raw, unvalidated catalog contents of a workspace.
///
/// Also the shape of the JSON documents accepted by `ep import`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRecords {
    pub departments: Vec<Department>,
    pub programs: Vec<Program>,
    pub courses: Vec<Course>,
    pub exams: Vec<Exam>,
    pub buildings: Vec<Building>,
    pub halls: Vec<Hall>,
    pub students: Vec<Student>,
}

/// A workspace together with its raw catalog contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRecords {
    pub workspace: Workspace,
    pub records: CatalogRecords,
}

/// Source of truth for catalog data.
///
/// Implementations must read every table of the workspace as one atomic
/// snapshot and should check `cancel` between reads.
pub trait CatalogSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the workspace's records, or `None` if the workspace does not exist.
    fn fetch(
        &self,
        workspace_id: &WorkspaceId,
        cancel: &CancelFlag,
    ) -> Result<Option<WorkspaceRecords>, Self::Error>;
}

/// Validated, immutable view over one workspace's entities.
#[derive(Debug, Clone)]
pub struct Catalog {
    workspace: Workspace,
    departments: BTreeMap<DepartmentId, Department>,
    programs: BTreeMap<ProgramCode, Program>,
    courses: BTreeMap<CourseCode, Course>,
    exams: BTreeMap<CourseCode, Exam>,
    buildings: BTreeMap<BuildingId, Building>,
    halls: BTreeMap<HallKey, Hall>,
    students: BTreeMap<StudentId, Student>,
    rosters: BTreeMap<CourseCode, Vec<StudentId>>,
}

impl Catalog {
    /// Loads and validates the catalog of `workspace_id` from `source`.
    pub fn load<S: CatalogSource>(
        source: &S,
        workspace_id: &WorkspaceId,
        cancel: &CancelFlag,
    ) -> Result<Self, CatalogError> {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let fetched = match source.fetch(workspace_id, cancel) {
            Ok(fetched) => fetched,
            Err(_) if cancel.is_cancelled() => return Err(CatalogError::Cancelled),
            Err(err) => return Err(CatalogError::Source(Box::new(err))),
        };
        let Some(WorkspaceRecords { workspace, records }) = fetched else {
            return Err(CatalogError::NotFound(workspace_id.clone()));
        };

        // Last point at which a run may be abandoned.
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let catalog = Self::from_records(workspace, records)?;
        tracing::debug!(
            workspace = %catalog.workspace.id,
            courses = catalog.courses.len(),
            exams = catalog.exams.len(),
            halls = catalog.halls.len(),
            students = catalog.students.len(),
            "loaded catalog snapshot"
        );
        Ok(catalog)
    }

    /// Builds a catalog from raw records, validating every entity and reference.
    pub fn from_records(
        workspace: Workspace,
        records: CatalogRecords,
    ) -> Result<Self, ValidationError> {
        let departments = index_unique(records.departments, "department", |d| d.id.clone())?;
        let programs = index_unique(records.programs, "program", |p| p.code.clone())?;
        let buildings = index_unique(records.buildings, "building", |b| b.id.clone())?;

        let courses = index_unique(records.courses, "course", |c| c.code.clone())?;
        for course in courses.values() {
            require(
                departments.contains_key(&course.department_id),
                "course",
                &course.code,
                "department",
                &course.department_id,
            )?;
            require(
                programs.contains_key(&course.program_code),
                "course",
                &course.code,
                "program",
                &course.program_code,
            )?;
        }

        let exams = index_unique(records.exams, "exam", |e| e.course_code.clone())?;
        for exam in exams.values() {
            exam.validate()?;
            require(
                courses.contains_key(&exam.course_code),
                "exam",
                &exam.course_code,
                "course",
                &exam.course_code,
            )?;
            require(
                programs.contains_key(&exam.program_code),
                "exam",
                &exam.course_code,
                "program",
                &exam.program_code,
            )?;
        }

        let halls = index_unique(records.halls, "hall", Hall::key)?;
        for (key, hall) in &halls {
            hall.validate()?;
            require(
                buildings.contains_key(&hall.building_id),
                "hall",
                key,
                "building",
                &hall.building_id,
            )?;
        }

        let students = index_unique(records.students, "student", |s| s.id.clone())?;
        let mut rosters: BTreeMap<CourseCode, Vec<StudentId>> = BTreeMap::new();
        for student in students.values() {
            require(
                departments.contains_key(&student.department_id),
                "student",
                &student.id,
                "department",
                &student.department_id,
            )?;
            for code in &student.enrolled_courses {
                require(
                    courses.contains_key(code),
                    "student",
                    &student.id,
                    "course",
                    code,
                )?;
                // Students iterate in id order, so rosters come out sorted.
                rosters
                    .entry(code.clone())
                    .or_default()
                    .push(student.id.clone());
            }
        }

        Ok(Self {
            workspace,
            departments,
            programs,
            courses,
            exams,
            buildings,
            halls,
            students,
            rosters,
        })
    }

    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn department(&self, id: &DepartmentId) -> Option<&Department> {
        self.departments.get(id)
    }

    pub fn program(&self, code: &ProgramCode) -> Option<&Program> {
        self.programs.get(code)
    }

    pub fn building(&self, id: &BuildingId) -> Option<&Building> {
        self.buildings.get(id)
    }

    pub fn course(&self, code: &CourseCode) -> Option<&Course> {
        self.courses.get(code)
    }

    /// Courses in code order.
    pub fn courses(&self) -> impl Iterator<Item = &Course> {
        self.courses.values()
    }

    pub fn exam(&self, code: &CourseCode) -> Option<&Exam> {
        self.exams.get(code)
    }

    /// Exams in course code order.
    pub fn exams(&self) -> impl Iterator<Item = &Exam> {
        self.exams.values()
    }

    pub fn hall(&self, key: &HallKey) -> Option<&Hall> {
        self.halls.get(key)
    }

    /// Halls ordered by building then hall id.
    pub fn halls(&self) -> impl Iterator<Item = &Hall> {
        self.halls.values()
    }

    pub fn student(&self, id: &StudentId) -> Option<&Student> {
        self.students.get(id)
    }

    /// Students in id order.
    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    /// Students enrolled in `code`, ascending by id.
    pub fn roster(&self, code: &CourseCode) -> &[StudentId] {
        self.rosters.get(code).map_or(&[], Vec::as_slice)
    }

    /// Sum of all hall capacities; the seats available in any one slot.
    pub fn total_capacity(&self) -> u64 {
        self.halls.values().map(|h| u64::from(h.capacity)).sum()
    }

    /// Counts of each entity kind, for status output.
    pub fn counts(&self) -> CatalogCounts {
        CatalogCounts {
            departments: self.departments.len(),
            programs: self.programs.len(),
            courses: self.courses.len(),
            exams: self.exams.len(),
            buildings: self.buildings.len(),
            halls: self.halls.len(),
            students: self.students.len(),
        }
    }

    /// Course codes that have an exam record and at least one enrolled student.
    pub fn schedulable_exams(&self) -> BTreeSet<CourseCode> {
        self.exams
            .keys()
            .filter(|code| !self.roster(code).is_empty())
            .cloned()
            .collect()
    }
}

/// Entity counts of a catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub departments: usize,
    pub programs: usize,
    pub courses: usize,
    pub exams: usize,
    pub buildings: usize,
    pub halls: usize,
    pub students: usize,
}

fn index_unique<K, V>(
    items: Vec<V>,
    kind: &'static str,
    key: impl Fn(&V) -> K,
) -> Result<BTreeMap<K, V>, ValidationError>
where
    K: Ord + std::fmt::Display,
{
    let mut map = BTreeMap::new();
    for item in items {
        let k = key(&item);
        if map.contains_key(&k) {
            return Err(ValidationError::Duplicate {
                kind,
                id: k.to_string(),
            });
        }
        map.insert(k, item);
    }
    Ok(map)
}

fn require(
    present: bool,
    kind: &'static str,
    id: &impl std::fmt::Display,
    target_kind: &'static str,
    target: &impl std::fmt::Display,
) -> Result<(), ValidationError> {
    if present {
        Ok(())
    } else {
        Err(ValidationError::DanglingReference {
            kind,
            id: id.to_string(),
            target_kind,
            target: target.to_string(),
        })
    }
}
