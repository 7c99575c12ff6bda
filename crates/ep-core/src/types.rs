//! Catalog entity types with validation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for catalog entities and planning requests.
///
/// Any of these aborts a run before scheduling starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An exam with a zero duration.
    #[error("exam {course_code} must have a positive duration")]
    NonPositiveDuration { course_code: String },

    /// A hall whose grid has no rows or no columns.
    #[error("hall {hall} must have at least one row and one column")]
    EmptyLayout { hall: String },

    /// A hall with more seats than its grid can hold.
    #[error("hall {hall} has capacity {capacity} but only {rows}x{columns} seats")]
    CapacityExceedsLayout {
        hall: String,
        capacity: u32,
        rows: u32,
        columns: u32,
    },

    /// Two entities of the same kind share an identifier.
    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// A reference to an entity that does not exist in the workspace.
    #[error("{kind} {id} references unknown {target_kind} {target}")]
    DanglingReference {
        kind: &'static str,
        id: String,
        target_kind: &'static str,
        target: String,
    },

    /// The scheduling horizon is malformed.
    #[error("invalid scheduling horizon: {reason}")]
    InvalidHorizon { reason: String },

    /// Neither the request nor the planner configuration supplied a horizon.
    #[error("no scheduling horizon was given and no default is configured")]
    MissingHorizon,

    /// The exam filter names a course without an exam record.
    #[error("no exam is defined for course {course_code}")]
    UnknownExam { course_code: String },

    /// The request targets a different workspace than the loaded catalog.
    #[error("catalog belongs to workspace {catalog} but the request names {requested}")]
    WorkspaceMismatch { catalog: String, requested: String },

    /// Unrecognized seating mode string.
    #[error("invalid seating mode: {value}")]
    InvalidSeatingMode { value: String },

    /// Unrecognized adjacency string.
    #[error("invalid seat adjacency: {value}")]
    InvalidAdjacency { value: String },

    /// Unrecognized plan status string.
    #[error("invalid plan status: {value}")]
    InvalidPlanStatus { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValidationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated workspace identifier.
    WorkspaceId, "workspace ID"
);

define_string_id!(
    /// A validated department identifier (e.g., "CSE").
    DepartmentId, "department ID"
);

define_string_id!(
    /// A validated program code (e.g., "BTECH").
    ProgramCode, "program code"
);

define_string_id!(
    /// A validated course code (e.g., "CS101").
    ///
    /// Exams are keyed by the code of the course they examine.
    CourseCode, "course code"
);

define_string_id!(
    /// A validated student identifier (roll number).
    StudentId, "student ID"
);

define_string_id!(
    /// A validated building identifier (e.g., "BGB").
    BuildingId, "building ID"
);

define_string_id!(
    /// A validated hall identifier.
    ///
    /// Unique only within its building. Conventionally a 3 digit number whose
    /// first digit is the floor.
    HallId, "hall ID"
);

/// Program code used when imported data leaves it out.
pub const UNKNOWN_PROGRAM: &str = "Unknown";

/// Exam length used when imported data leaves it out.
pub const DEFAULT_EXAM_MINUTES: u32 = 180;

/// Hall grid used when imported data leaves it out.
pub const DEFAULT_HALL_ROWS: u32 = 10;
pub const DEFAULT_HALL_COLUMNS: u32 = 6;

fn unknown_program_code() -> ProgramCode {
    ProgramCode(UNKNOWN_PROGRAM.to_string())
}

fn unknown_program() -> String {
    UNKNOWN_PROGRAM.to_string()
}

const fn default_exam_minutes() -> u32 {
    DEFAULT_EXAM_MINUTES
}

const fn default_hall_rows() -> u32 {
    DEFAULT_HALL_ROWS
}

const fn default_hall_columns() -> u32 {
    DEFAULT_HALL_COLUMNS
}

/// A tenant boundary. Every scheduling run is scoped to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub code: ProgramCode,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: CourseCode,
    pub name: String,
    pub department_id: DepartmentId,
    #[serde(default = "unknown_program_code")]
    pub program_code: ProgramCode,
}

/// The examination of one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub course_code: CourseCode,
    pub course_name: String,
    #[serde(default = "default_exam_minutes")]
    pub duration_minutes: u32,
    #[serde(default = "unknown_program_code")]
    pub program_code: ProgramCode,
}

impl Exam {
    /// Checks field-level invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.duration_minutes == 0 {
            return Err(ValidationError::NonPositiveDuration {
                course_code: self.course_code.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub department_id: DepartmentId,
    /// Free-text program name; not cross-referenced.
    #[serde(default = "unknown_program")]
    pub program: String,
    #[serde(default)]
    pub enrolled_courses: BTreeSet<CourseCode>,
}

impl Student {
    pub fn is_enrolled(&self, course_code: &CourseCode) -> bool {
        self.enrolled_courses.contains(course_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub name: String,
}

/// Identifies a hall across the workspace.
///
/// Hall IDs repeat between buildings, so the building is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HallKey {
    pub building_id: BuildingId,
    pub hall_id: HallId,
}

impl fmt::Display for HallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.building_id, self.hall_id)
    }
}

/// An examination hall with a rectangular seat grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hall {
    pub id: HallId,
    pub name: String,
    pub building_id: BuildingId,
    #[serde(default = "default_hall_rows")]
    pub rows: u32,
    #[serde(default = "default_hall_columns")]
    pub columns: u32,
    pub capacity: u32,
}

impl Hall {
    pub fn key(&self) -> HallKey {
        HallKey {
            building_id: self.building_id.clone(),
            hall_id: self.id.clone(),
        }
    }

    /// Checks that the grid is non-empty and can hold every seat.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(ValidationError::EmptyLayout {
                hall: self.key().to_string(),
            });
        }
        if u64::from(self.capacity) > u64::from(self.rows) * u64::from(self.columns) {
            return Err(ValidationError::CapacityExceedsLayout {
                hall: self.key().to_string(),
                capacity: self.capacity,
                rows: self.rows,
                columns: self.columns,
            });
        }
        Ok(())
    }
}

/// Serde adapter for `HH:MM` times.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
