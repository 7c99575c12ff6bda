//! Conflict reporting.
//!
//! Every problem a run records but does not abort on is a [`Conflict`]. The
//! plan exposes them as strings; the typed form is kept for tests and for
//! callers that want to tell warnings from real failures.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::allocation::{Allocation, AllocationResult};
use crate::catalog::Catalog;
use crate::timetable::{Schedule, TimetableEntry};
use crate::types::{CourseCode, HallKey, StudentId};

/// Unseated ids listed in an overflow message before it is truncated.
pub const UNSEATED_PREVIEW: usize = 10;

/// Why the builder found no slot for an exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotFailure {
    /// Every slot already holds an exam sharing a student.
    Clash,
    /// Every clash-free slot lacks the seats this exam needs.
    Capacity { demand: u64, total_capacity: u64 },
    /// The exam is longer than any block of the horizon.
    DurationTooLong {
        duration_minutes: u32,
        slot_minutes: i64,
    },
    /// The horizon yields no slots at all.
    NoSlots,
}

impl fmt::Display for SlotFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clash => write!(f, "every slot clashes with an exam sharing students"),
            Self::Capacity {
                demand,
                total_capacity,
            } => write!(
                f,
                "needs {demand} seats but no clash-free slot has that many of {total_capacity} free"
            ),
            Self::DurationTooLong {
                duration_minutes,
                slot_minutes,
            } => write!(
                f,
                "duration of {duration_minutes} minutes exceeds the {slot_minutes} minute slot"
            ),
            Self::NoSlots => write!(f, "the horizon contains no slots"),
        }
    }
}

/// Informational findings about the catalog itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogWarning {
    ZeroEnrollment { course_code: CourseCode },
    MissingExam { course_code: CourseCode, enrolled: usize },
    NoCourses { student_id: StudentId },
}

impl fmt::Display for CatalogWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroEnrollment { course_code } => {
                write!(f, "course {course_code} has no enrolled students")
            }
            Self::MissingExam {
                course_code,
                enrolled,
            } => write!(
                f,
                "course {course_code} has {enrolled} enrolled students but no exam"
            ),
            Self::NoCourses { student_id } => {
                write!(f, "student {student_id} is not enrolled in any course")
            }
        }
    }
}

/// Broken invariants found by re-checking the assembled plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DoubleBooking {
        student_id: StudentId,
        first: CourseCode,
        second: CourseCode,
    },
    DuplicateSeat {
        hall: HallKey,
        seat_number: String,
        date: NaiveDate,
        start_time: NaiveTime,
    },
    OverCapacity {
        hall: HallKey,
        seated: usize,
        capacity: u32,
        date: NaiveDate,
        start_time: NaiveTime,
    },
    DuplicateAllocation {
        student_id: StudentId,
        course_code: CourseCode,
    },
    StrayAllocation {
        student_id: StudentId,
        course_code: CourseCode,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleBooking {
                student_id,
                first,
                second,
            } => write!(
                f,
                "student {student_id} is booked into {first} and {second} at the same time"
            ),
            Self::DuplicateSeat {
                hall,
                seat_number,
                date,
                start_time,
            } => write!(
                f,
                "seat {seat_number} in hall {hall} is assigned twice on {date} at {}",
                start_time.format("%H:%M")
            ),
            Self::OverCapacity {
                hall,
                seated,
                capacity,
                date,
                start_time,
            } => write!(
                f,
                "hall {hall} seats {seated} students on {date} at {} but holds {capacity}",
                start_time.format("%H:%M")
            ),
            Self::DuplicateAllocation {
                student_id,
                course_code,
            } => write!(f, "student {student_id} has more than one seat for {course_code}"),
            Self::StrayAllocation {
                student_id,
                course_code,
            } => write!(
                f,
                "student {student_id} is seated for {course_code} without being enrolled in a scheduled exam"
            ),
        }
    }
}

/// A recorded, non-fatal problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The builder could not place the exam.
    Slot {
        course_code: CourseCode,
        reason: SlotFailure,
    },
    /// The allocator ran out of seats for the exam.
    Overflow {
        course_code: CourseCode,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        overflow: usize,
        unseated: Vec<StudentId>,
    },
    /// Interleaving could not keep every neighbour pair apart in a hall.
    Seating {
        hall: HallKey,
        date: NaiveDate,
        start_time: NaiveTime,
        pairs: usize,
    },
    Catalog(CatalogWarning),
    Verification(Violation),
}

impl Conflict {
    /// Warnings that never affect plan status.
    pub const fn is_informational(&self) -> bool {
        matches!(self, Self::Seating { .. } | Self::Catalog(_))
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot {
                course_code,
                reason,
            } => write!(
                f,
                "no feasible slot for {course_code}: exceeds horizon or capacity ({reason})"
            ),
            Self::Overflow {
                course_code,
                date,
                start_time,
                end_time,
                overflow,
                unseated,
            } => {
                write!(
                    f,
                    "not enough capacity for {course_code} on {date} {}-{}: {overflow} students unassigned (",
                    start_time.format("%H:%M"),
                    end_time.format("%H:%M")
                )?;
                for (i, id) in unseated.iter().take(UNSEATED_PREVIEW).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                if unseated.len() > UNSEATED_PREVIEW {
                    write!(f, ", …")?;
                }
                write!(f, ")")
            }
            Self::Seating {
                hall,
                date,
                start_time,
                pairs,
            } => write!(
                f,
                "seating in hall {hall} on {date} at {}: {pairs} adjacent seat pairs share a course",
                start_time.format("%H:%M")
            ),
            Self::Catalog(warning) => write!(f, "{warning}"),
            Self::Verification(violation) => write!(f, "verification failed: {violation}"),
        }
    }
}

/// Collects every conflict of a run in reporting order: builder, allocator,
/// catalog warnings, verification.
pub fn report(catalog: &Catalog, schedule: &Schedule, seating: &AllocationResult) -> Vec<Conflict> {
    let mut conflicts = schedule.conflicts.clone();
    conflicts.extend(seating.conflicts.iter().cloned());
    conflicts.extend(catalog_warnings(catalog).into_iter().map(Conflict::Catalog));
    conflicts.extend(
        verify(catalog, &schedule.entries, &seating.allocations)
            .into_iter()
            .map(Conflict::Verification),
    );
    conflicts
}

/// Informational findings about courses and students.
pub fn catalog_warnings(catalog: &Catalog) -> Vec<CatalogWarning> {
    let mut warnings = Vec::new();
    for course in catalog.courses() {
        let enrolled = catalog.roster(&course.code).len();
        if enrolled == 0 {
            warnings.push(CatalogWarning::ZeroEnrollment {
                course_code: course.code.clone(),
            });
        } else if catalog.exam(&course.code).is_none() {
            warnings.push(CatalogWarning::MissingExam {
                course_code: course.code.clone(),
                enrolled,
            });
        }
    }
    for student in catalog.students() {
        if student.enrolled_courses.is_empty() {
            warnings.push(CatalogWarning::NoCourses {
                student_id: student.id.clone(),
            });
        }
    }
    warnings
}

/// Re-checks the timetable and allocations against the plan invariants.
pub fn verify(
    catalog: &Catalog,
    entries: &[TimetableEntry],
    allocations: &[Allocation],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let by_course: BTreeMap<&CourseCode, &TimetableEntry> =
        entries.iter().map(|e| (&e.course_code, e)).collect();

    // Students never sit two exams in one slot.
    let mut booked: BTreeMap<(&StudentId, NaiveDate, NaiveTime), &CourseCode> = BTreeMap::new();
    for student in catalog.students() {
        for code in &student.enrolled_courses {
            let Some(entry) = by_course.get(code) else {
                continue;
            };
            let (date, start) = entry.sitting();
            if let Some(first) = booked.insert((&student.id, date, start), code) {
                violations.push(Violation::DoubleBooking {
                    student_id: student.id.clone(),
                    first: first.clone(),
                    second: code.clone(),
                });
            }
        }
    }

    let mut seen_pairs: BTreeSet<(&StudentId, &CourseCode)> = BTreeSet::new();
    let mut seen_seats: BTreeSet<(NaiveDate, NaiveTime, HallKey, &str)> = BTreeSet::new();
    let mut seated: BTreeMap<(NaiveDate, NaiveTime, HallKey), usize> = BTreeMap::new();

    for allocation in allocations {
        if !seen_pairs.insert((&allocation.student_id, &allocation.exam_course_code)) {
            violations.push(Violation::DuplicateAllocation {
                student_id: allocation.student_id.clone(),
                course_code: allocation.exam_course_code.clone(),
            });
        }

        let enrolled = catalog
            .student(&allocation.student_id)
            .is_some_and(|s| s.is_enrolled(&allocation.exam_course_code));
        let Some(entry) = by_course.get(&allocation.exam_course_code).filter(|_| enrolled) else {
            violations.push(Violation::StrayAllocation {
                student_id: allocation.student_id.clone(),
                course_code: allocation.exam_course_code.clone(),
            });
            continue;
        };

        let (date, start_time) = entry.sitting();
        let hall = allocation.hall_key();
        if !seen_seats.insert((date, start_time, hall.clone(), allocation.seat_number.as_str())) {
            violations.push(Violation::DuplicateSeat {
                hall: hall.clone(),
                seat_number: allocation.seat_number.clone(),
                date,
                start_time,
            });
        }
        *seated.entry((date, start_time, hall)).or_default() += 1;
    }

    for ((date, start_time, hall), count) in seated {
        let capacity = catalog.hall(&hall).map_or(0, |h| h.capacity);
        if count > capacity as usize {
            violations.push(Violation::OverCapacity {
                hall,
                seated: count,
                capacity,
                date,
                start_time,
            });
        }
    }

    violations
}
