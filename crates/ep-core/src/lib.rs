//! Core engine for exam planning.
//!
//! This crate contains the fundamental types and logic for:
//! - Catalog: validated, immutable snapshot of a workspace's entities
//! - Timetable: placing exams into slots without student clashes
//! - Allocation: seating every student of every scheduled exam
//! - Planning: assembling timetable, seats and conflicts into one plan

mod allocation;
pub mod catalog;
pub mod conflict;
pub mod horizon;
mod plan;
pub mod seating;
mod timetable;
pub mod types;

pub use allocation::{Allocation, AllocationConfig, AllocationResult, allocate_seats};
pub use catalog::{
    CancelFlag, Catalog, CatalogCounts, CatalogError, CatalogRecords, CatalogSource,
    WorkspaceRecords,
};
pub use conflict::{CatalogWarning, Conflict, SlotFailure, Violation};
pub use horizon::{Horizon, Slot};
pub use plan::{ExamPlan, PlanError, PlanRequest, PlanStatus, Planner, PlannerConfig};
pub use seating::{Adjacency, SeatingConfig, SeatingMode};
pub use timetable::{
    BuilderConfig, DEFAULT_MAX_BACKTRACK_STEPS, Schedule, TimetableEntry, build_timetable,
};
pub use types::{
    Building, BuildingId, Course, CourseCode, Department, DepartmentId, Exam, Hall, HallId,
    HallKey, Program, ProgramCode, Student, StudentId, ValidationError, Workspace, WorkspaceId,
};
