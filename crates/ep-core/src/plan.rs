//! Plan assembly and the engine entry point.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocation::{Allocation, AllocationConfig, allocate_seats};
use crate::catalog::{CancelFlag, Catalog, CatalogError, CatalogSource};
use crate::conflict;
use crate::horizon::Horizon;
use crate::seating::SeatingConfig;
use crate::timetable::{
    BuilderConfig, DEFAULT_MAX_BACKTRACK_STEPS, TimetableEntry, build_timetable,
};
use crate::types::{CourseCode, Hall, ValidationError, WorkspaceId};

/// Errors that abort a planning run. Nothing is returned when these occur.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Whether everything requested was scheduled and seated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Complete,
    Partial,
}

impl PlanStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Self::Complete),
            "partial" => Ok(Self::Partial),
            _ => Err(ValidationError::InvalidPlanStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// A single planning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub workspace_id: WorkspaceId,
    /// Falls back to the planner's default horizon when absent.
    #[serde(default)]
    pub horizon: Option<Horizon>,
    /// Restricts the run to these exams. Otherwise every exam with enrolled
    /// students is planned.
    #[serde(default)]
    pub exam_filter: Option<Vec<CourseCode>>,
}

impl PlanRequest {
    pub const fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            horizon: None,
            exam_filter: None,
        }
    }
}

/// The outcome of one run. Fresh per run and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamPlan {
    pub status: PlanStatus,
    pub timetable: Vec<TimetableEntry>,
    pub allocations: Vec<Allocation>,
    pub conflicts: Vec<String>,
    pub halls: Vec<Hall>,
}

impl ExamPlan {
    /// Pretty JSON; identical catalogs and requests give identical output.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration for the planner.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Used when a request carries no horizon.
    pub default_horizon: Option<Horizon>,
    pub seating: SeatingConfig,
    pub max_backtrack_steps: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_horizon: None,
            seating: SeatingConfig::default(),
            max_backtrack_steps: DEFAULT_MAX_BACKTRACK_STEPS,
        }
    }
}

/// Runs the pipeline: catalog, timetable, seats, conflicts, plan.
///
/// Holds no state between runs, so one planner can serve any number of
/// workspaces concurrently.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub const fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Loads the workspace from `source` and plans it.
    ///
    /// `cancel` is honoured only until the catalog is loaded.
    pub fn plan<S: CatalogSource>(
        &self,
        source: &S,
        request: &PlanRequest,
        cancel: &CancelFlag,
    ) -> Result<ExamPlan, PlanError> {
        let catalog = Catalog::load(source, &request.workspace_id, cancel)?;
        self.plan_catalog(&catalog, request)
    }

    /// Plans an already loaded catalog.
    pub fn plan_catalog(
        &self,
        catalog: &Catalog,
        request: &PlanRequest,
    ) -> Result<ExamPlan, PlanError> {
        if catalog.workspace().id != request.workspace_id {
            return Err(ValidationError::WorkspaceMismatch {
                catalog: catalog.workspace().id.to_string(),
                requested: request.workspace_id.to_string(),
            }
            .into());
        }

        let horizon = request
            .horizon
            .as_ref()
            .or(self.config.default_horizon.as_ref())
            .ok_or(ValidationError::MissingHorizon)?;
        horizon.validate()?;

        let requested = requested_exams(catalog, request.exam_filter.as_deref())?;
        let slots = horizon.slots();
        tracing::debug!(
            workspace = %request.workspace_id,
            exams = requested.len(),
            slots = slots.len(),
            "planning"
        );

        let schedule = build_timetable(
            catalog,
            &requested,
            &slots,
            &BuilderConfig {
                max_backtrack_steps: self.config.max_backtrack_steps,
            },
        );
        let seating = allocate_seats(
            catalog,
            &schedule.entries,
            &AllocationConfig {
                seating: self.config.seating,
            },
        );
        let conflicts = conflict::report(catalog, &schedule, &seating);

        let status = if schedule.unscheduled.is_empty() && seating.unseated == 0 {
            PlanStatus::Complete
        } else {
            PlanStatus::Partial
        };

        tracing::debug!(
            %status,
            scheduled = schedule.entries.len(),
            allocations = seating.allocations.len(),
            conflicts = conflicts.len(),
            "plan assembled"
        );

        Ok(ExamPlan {
            status,
            timetable: schedule.entries,
            allocations: seating.allocations,
            conflicts: conflicts.iter().map(ToString::to_string).collect(),
            halls: catalog.halls().cloned().collect(),
        })
    }
}

fn requested_exams(
    catalog: &Catalog,
    filter: Option<&[CourseCode]>,
) -> Result<BTreeSet<CourseCode>, ValidationError> {
    let Some(filter) = filter else {
        return Ok(catalog.schedulable_exams());
    };
    filter
        .iter()
        .map(|code| {
            catalog
                .exam(code)
                .map(|exam| exam.course_code.clone())
                .ok_or_else(|| ValidationError::UnknownExam {
                    course_code: code.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::catalog::tests::{Fixture, workspace};
    use crate::catalog::{CatalogRecords, WorkspaceRecords};
    use crate::seating::{Adjacency, SeatingMode};

    fn horizon(days: u32) -> Horizon {
        Horizon::from_days(
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            days,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            180,
            true,
        )
        .unwrap()
    }

    fn request(days: u32) -> PlanRequest {
        PlanRequest {
            horizon: Some(horizon(days)),
            ..PlanRequest::new(workspace().id)
        }
    }

    /// Mirrors a small faculty: overlapping cohorts, two halls.
    fn faculty() -> Catalog {
        let mut fixture = Fixture::new().hall("101", 30, 5, 6).hall("201", 24, 4, 6);
        for code in ["CS101", "CS102", "CS201", "MA101", "PH101"] {
            fixture = fixture.exam(code, 180);
        }
        fixture
            .students("A", 12, &["CS101", "MA101"])
            .students("B", 12, &["CS102", "MA101", "PH101"])
            .students("C", 10, &["CS201", "CS102"])
            .students("D", 6, &["CS101", "PH101"])
            .build()
    }

    struct Snapshot(CatalogRecords);

    impl CatalogSource for Snapshot {
        type Error = std::convert::Infallible;

        fn fetch(
            &self,
            workspace_id: &WorkspaceId,
            _cancel: &CancelFlag,
        ) -> Result<Option<WorkspaceRecords>, Self::Error> {
            Ok((workspace_id == &workspace().id).then(|| WorkspaceRecords {
                workspace: workspace(),
                records: self.0.clone(),
            }))
        }
    }

    #[test]
    fn overflow_scenario_is_partial_with_one_conflict() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .hall("H1", 10, 2, 5)
            .students("S", 15, &["CS101"])
            .build();

        let plan = Planner::default()
            .plan_catalog(&catalog, &request(1))
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Partial);
        assert_eq!(plan.timetable.len(), 1);
        assert_eq!(plan.allocations.len(), 10);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].contains("5 students unassigned"));
    }

    #[test]
    fn shared_student_scenario_is_complete() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .exam("CS102", 180)
            .hall("101", 60, 10, 6)
            .student("S1", &["CS101", "CS102"])
            .build();

        let plan = Planner::default()
            .plan_catalog(&catalog, &request(1))
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Complete);
        assert!(plan.conflicts.is_empty());
        assert_ne!(
            plan.timetable[0].sitting(),
            plan.timetable[1].sitting()
        );
        assert_eq!(plan.allocations.len(), 2);
    }

    #[test]
    fn plan_invariants_hold() {
        let catalog = faculty();
        let plan = Planner::default()
            .plan_catalog(&catalog, &request(2))
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Complete);
        assert_eq!(plan.timetable.len(), 5);
        let enrolled: usize = catalog.exams().map(|e| catalog.roster(&e.course_code).len()).sum();
        assert_eq!(plan.allocations.len(), enrolled);
        assert!(conflict::verify(&catalog, &plan.timetable, &plan.allocations).is_empty());
        assert!(plan.conflicts.iter().all(|c| !c.starts_with("verification failed")));
    }

    #[test]
    fn repeated_runs_serialize_identically() {
        let catalog = faculty();
        let planner = Planner::new(PlannerConfig {
            seating: SeatingConfig {
                mode: SeatingMode::Interleaved,
                adjacency: Adjacency::Grid,
            },
            ..PlannerConfig::default()
        });

        let first = planner.plan_catalog(&catalog, &request(2)).unwrap().to_json().unwrap();
        let second = planner.plan_catalog(&catalog, &request(2)).unwrap().to_json().unwrap();
        assert_eq!(first, second);
        assert!(first.contains(r#""status": "complete""#));
    }

    #[test]
    fn unscheduled_exam_makes_plan_partial() {
        let catalog = faculty();
        let mut short = request(1);
        if let Some(h) = short.horizon.as_mut() {
            h.day_end = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        }

        let plan = Planner::default().plan_catalog(&catalog, &short).unwrap();
        assert_eq!(plan.status, PlanStatus::Partial);
        assert!(
            plan.conflicts
                .iter()
                .any(|c| c.contains(": exceeds horizon or capacity"))
        );
    }

    #[test]
    fn exam_filter_limits_the_run() {
        let catalog = faculty();
        let request = PlanRequest {
            exam_filter: Some(vec![CourseCode::new("CS201").unwrap()]),
            ..request(1)
        };

        let plan = Planner::default().plan_catalog(&catalog, &request).unwrap();
        assert_eq!(plan.timetable.len(), 1);
        assert_eq!(plan.allocations.len(), 10);
        assert_eq!(plan.halls.len(), 2);
    }

    #[test]
    fn filter_naming_unknown_exam_is_rejected() {
        let catalog = Fixture::new().exam("CS101", 180).course("EC101").build();
        let request = PlanRequest {
            exam_filter: Some(vec![CourseCode::new("EC101").unwrap()]),
            ..request(1)
        };

        let err = Planner::default()
            .plan_catalog(&catalog, &request)
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Validation(ValidationError::UnknownExam { .. })
        ));
    }

    #[test]
    fn missing_horizon_uses_default_or_fails() {
        let catalog = faculty();
        let bare = PlanRequest::new(workspace().id);

        let err = Planner::default().plan_catalog(&catalog, &bare).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Validation(ValidationError::MissingHorizon)
        ));

        let planner = Planner::new(PlannerConfig {
            default_horizon: Some(horizon(2)),
            ..PlannerConfig::default()
        });
        assert!(planner.plan_catalog(&catalog, &bare).is_ok());
    }

    #[test]
    fn plan_loads_through_source() {
        let records = Fixture::new()
            .exam("CS101", 180)
            .hall("101", 30, 5, 6)
            .students("S", 3, &["CS101"])
            .records();
        let source = Snapshot(records);

        let plan = Planner::default()
            .plan(&source, &request(1), &CancelFlag::new())
            .unwrap();
        assert_eq!(plan.allocations.len(), 3);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = Planner::default()
            .plan(&source, &request(1), &cancel)
            .unwrap_err();
        assert!(matches!(err, PlanError::Catalog(CatalogError::Cancelled)));
    }

    #[test]
    fn status_parses_and_serializes_lowercase() {
        assert_eq!("partial".parse::<PlanStatus>().unwrap(), PlanStatus::Partial);
        assert!("done".parse::<PlanStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&PlanStatus::Complete).unwrap(),
            r#""complete""#
        );
    }
}
