//! Seat allocation.
//!
//! Assigns every student of every scheduled exam to a hall seat.
//!
//! # Algorithm Summary
//!
//! 1. Group timetable entries into sittings (exams sharing a slot)
//! 2. Per sitting, pick the fewest halls (largest first) whose combined
//!    capacity covers the sitting's students
//! 3. Fill the picked halls exam by exam, largest roster first, students in
//!    id order; whoever does not fit is reported as overflow
//! 4. Within each hall, the seating policy decides which seat each occupant
//!    gets
//!
//! Sittings never share halls in time, so they are allocated in parallel and
//! merged back in a fixed order.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::conflict::Conflict;
use crate::seating::{SeatLayout, SeatingConfig, SeatingPolicy, seat_label};
use crate::timetable::TimetableEntry;
use crate::types::{BuildingId, CourseCode, Hall, HallId, HallKey, StudentId};

/// Configuration for seat allocation.
#[derive(Debug, Clone, Default)]
pub struct AllocationConfig {
    pub seating: SeatingConfig,
}

/// One student's seat for one exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub student_id: StudentId,
    pub exam_course_code: CourseCode,
    pub building_id: BuildingId,
    pub hall_id: HallId,
    /// `S-1` is the first seat of the first row.
    pub seat_number: String,
}

impl Allocation {
    pub fn hall_key(&self) -> HallKey {
        HallKey {
            building_id: self.building_id.clone(),
            hall_id: self.hall_id.clone(),
        }
    }
}

/// Result of seat allocation.
#[derive(Debug, Clone, Default)]
pub struct AllocationResult {
    /// Sorted by exam course code, then student id.
    pub allocations: Vec<Allocation>,

    /// Overflow and seating diagnostics, sitting by sitting.
    pub conflicts: Vec<Conflict>,

    /// Students left without a seat, summed over all exams.
    pub unseated: usize,
}

/// Exams of one slot, keyed by the slot's date and start time.
struct Sitting<'e> {
    date: NaiveDate,
    start_time: NaiveTime,
    entries: Vec<&'e TimetableEntry>,
}

/// Students of one exam placed in one hall.
struct Occupants<'c> {
    course_code: &'c CourseCode,
    students: Vec<&'c StudentId>,
}

/// Allocates seats for every entry of the timetable.
pub fn allocate_seats(
    catalog: &Catalog,
    entries: &[TimetableEntry],
    config: &AllocationConfig,
) -> AllocationResult {
    let mut sittings: BTreeMap<(NaiveDate, NaiveTime), Vec<&TimetableEntry>> = BTreeMap::new();
    for entry in entries {
        sittings.entry(entry.sitting()).or_default().push(entry);
    }
    let sittings: Vec<Sitting<'_>> = sittings
        .into_iter()
        .map(|((date, start_time), entries)| Sitting {
            date,
            start_time,
            entries,
        })
        .collect();

    let mut halls: Vec<&Hall> = catalog.halls().filter(|h| h.capacity > 0).collect();
    halls.sort_by(|a, b| b.capacity.cmp(&a.capacity).then_with(|| a.key().cmp(&b.key())));

    let policy = config.seating.policy();
    let per_sitting: Vec<AllocationResult> = sittings
        .par_iter()
        .map(|sitting| allocate_sitting(catalog, sitting, &halls, policy.as_ref()))
        .collect();

    let mut result = AllocationResult::default();
    for partial in per_sitting {
        result.allocations.extend(partial.allocations);
        result.conflicts.extend(partial.conflicts);
        result.unseated += partial.unseated;
    }
    result.allocations.sort_by(|a, b| {
        a.exam_course_code
            .cmp(&b.exam_course_code)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    tracing::debug!(
        sittings = sittings.len(),
        allocations = result.allocations.len(),
        unseated = result.unseated,
        "allocated seats"
    );
    result
}

fn allocate_sitting(
    catalog: &Catalog,
    sitting: &Sitting<'_>,
    halls_by_size: &[&Hall],
    policy: &dyn SeatingPolicy,
) -> AllocationResult {
    let mut exams: Vec<(&CourseCode, &[StudentId], &TimetableEntry)> = sitting
        .entries
        .iter()
        .map(|e| (&e.course_code, catalog.roster(&e.course_code), *e))
        .collect();
    exams.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let students: u64 = exams.iter().map(|(_, roster, _)| roster.len() as u64).sum();
    let halls = select_halls(halls_by_size, students);

    let mut occupants: Vec<Vec<Occupants<'_>>> = halls.iter().map(|_| Vec::new()).collect();
    let mut result = AllocationResult::default();
    let mut hall_index = 0;
    let mut used = 0usize;

    for &(course_code, roster, entry) in &exams {
        let mut unseated = Vec::new();
        for student in roster {
            while hall_index < halls.len() && used == halls[hall_index].capacity as usize {
                hall_index += 1;
                used = 0;
            }
            let Some(hall_occupants) = occupants.get_mut(hall_index) else {
                unseated.push(student.clone());
                continue;
            };
            match hall_occupants.last_mut() {
                Some(group) if group.course_code == course_code => group.students.push(student),
                _ => hall_occupants.push(Occupants {
                    course_code,
                    students: vec![student],
                }),
            }
            used += 1;
        }

        if !unseated.is_empty() {
            tracing::warn!(
                course_code = %course_code,
                date = %sitting.date,
                overflow = unseated.len(),
                "not enough hall capacity"
            );
            result.unseated += unseated.len();
            result.conflicts.push(Conflict::Overflow {
                course_code: course_code.clone(),
                date: entry.date,
                start_time: entry.start_time,
                end_time: entry.end_time,
                overflow: unseated.len(),
                unseated,
            });
        }
    }

    for (hall, groups) in halls.iter().zip(&occupants) {
        if groups.is_empty() {
            continue;
        }
        let sizes: Vec<usize> = groups.iter().map(|g| g.students.len()).collect();
        let arrangement = policy.arrange(&SeatLayout::from(*hall), &sizes);

        let mut next: Vec<usize> = vec![0; groups.len()];
        for (index, seat) in arrangement.seats.iter().enumerate() {
            let Some(group) = *seat else { continue };
            let members = &groups[group];
            let Some(student) = members.students.get(next[group]) else {
                continue;
            };
            next[group] += 1;
            result.allocations.push(Allocation {
                student_id: (*student).clone(),
                exam_course_code: members.course_code.clone(),
                building_id: hall.building_id.clone(),
                hall_id: hall.id.clone(),
                seat_number: seat_label(index),
            });
        }

        if arrangement.same_course_pairs > 0 {
            result.conflicts.push(Conflict::Seating {
                hall: hall.key(),
                date: sitting.date,
                start_time: sitting.start_time,
                pairs: arrangement.same_course_pairs,
            });
        }
    }

    result
}

/// Largest halls first until `students` fit; every hall if they never do.
fn select_halls<'h>(halls_by_size: &[&'h Hall], students: u64) -> Vec<&'h Hall> {
    let mut selected = Vec::new();
    let mut capacity = 0u64;
    for hall in halls_by_size {
        if capacity >= students {
            break;
        }
        capacity += u64::from(hall.capacity);
        selected.push(*hall);
    }
    selected
}
