//! Timetable builder.
//!
//! Places each requested exam into one slot of the horizon such that no two
//! exams sharing a student land in the same slot and the seats needed in a
//! slot never exceed the total hall capacity.
//!
//! # Algorithm Summary
//!
//! 1. Build the conflict graph: exams are adjacent iff they share a student
//! 2. Order exams by conflict degree, then enrollment, then course code
//! 3. Depth-first search over slots in chronological order, undoing earlier
//!    placements when an exam has nowhere to go (bounded by a step budget)
//! 4. If the search gives up, fall back to a single greedy pass that leaves
//!    exams without a feasible slot unscheduled

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::conflict::{Conflict, SlotFailure};
use crate::horizon::Slot;
use crate::types::{CourseCode, hhmm};

/// Default placement attempts allowed for the backtracking search.
pub const DEFAULT_MAX_BACKTRACK_STEPS: usize = 100_000;

/// Configuration for the timetable builder.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Placement attempts the backtracking search may make before falling
    /// back to greedy placement. Zero disables backtracking.
    pub max_backtrack_steps: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_backtrack_steps: DEFAULT_MAX_BACKTRACK_STEPS,
        }
    }
}

/// One scheduled exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub course_code: CourseCode,
    pub course_name: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
}

impl TimetableEntry {
    /// Exams with equal sitting keys share a slot.
    pub const fn sitting(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.start_time)
    }
}

/// Output of the builder.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Ordered by date, start time, course code.
    pub entries: Vec<TimetableEntry>,
    /// Requested exams that could not be placed, in course code order.
    pub unscheduled: Vec<CourseCode>,
    /// One diagnostic per unscheduled exam, in placement order.
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug)]
struct Node<'a> {
    code: &'a CourseCode,
    name: &'a str,
    duration_minutes: u32,
    enrollment: usize,
    demand: u64,
    neighbours: Vec<usize>,
}

/// Search state shared by the backtracking and greedy passes.
struct Board<'n, 'a> {
    nodes: &'n [Node<'a>],
    slots: &'n [Slot],
    capacity: u64,
    assigned: Vec<Option<usize>>,
    load: Vec<u64>,
}

impl<'n, 'a> Board<'n, 'a> {
    fn new(nodes: &'n [Node<'a>], slots: &'n [Slot], capacity: u64) -> Self {
        Self {
            nodes,
            slots,
            capacity,
            assigned: vec![None; nodes.len()],
            load: vec![0; slots.len()],
        }
    }

    fn fits_duration(&self, node: usize, slot: usize) -> bool {
        i64::from(self.nodes[node].duration_minutes) <= self.slots[slot].minutes()
    }

    fn clashes(&self, node: usize, slot: usize) -> bool {
        self.nodes[node]
            .neighbours
            .iter()
            .any(|&n| self.assigned[n] == Some(slot))
    }

    fn has_room(&self, node: usize, slot: usize) -> bool {
        self.load[slot] + self.nodes[node].demand <= self.capacity
    }

    fn feasible(&self, node: usize, slot: usize) -> bool {
        self.fits_duration(node, slot) && !self.clashes(node, slot) && self.has_room(node, slot)
    }

    fn place(&mut self, node: usize, slot: usize) {
        self.assigned[node] = Some(slot);
        self.load[slot] += self.nodes[node].demand;
    }

    fn unplace(&mut self, node: usize) {
        if let Some(slot) = self.assigned[node].take() {
            self.load[slot] -= self.nodes[node].demand;
        }
    }

    /// Why `node` has no feasible slot in the current state.
    fn diagnose(&self, node: usize) -> SlotFailure {
        let usable: Vec<usize> = (0..self.slots.len())
            .filter(|&s| self.fits_duration(node, s))
            .collect();
        if usable.is_empty() {
            return self.static_failure(node);
        }
        if usable.iter().any(|&s| !self.clashes(node, s)) {
            SlotFailure::Capacity {
                demand: self.nodes[node].demand,
                total_capacity: self.capacity,
            }
        } else {
            SlotFailure::Clash
        }
    }

    /// Failure that holds regardless of other placements, if any.
    fn static_failure(&self, node: usize) -> SlotFailure {
        match self.slots.iter().map(Slot::minutes).max() {
            None => SlotFailure::NoSlots,
            Some(longest) => SlotFailure::DurationTooLong {
                duration_minutes: self.nodes[node].duration_minutes,
                slot_minutes: longest,
            },
        }
    }

    fn never_fits(&self, node: usize) -> bool {
        !(0..self.slots.len()).any(|s| self.fits_duration(node, s))
    }

    /// Depth-first search over `order`. Returns false if the budget ran out
    /// or no complete assignment exists; the board is then left cleared.
    fn backtrack(&mut self, order: &[usize], budget: usize) -> bool {
        let mut cursor = vec![0usize; order.len()];
        let mut depth = 0;
        let mut steps = 0usize;

        while depth < order.len() {
            let node = order[depth];
            self.unplace(node);

            let mut placed = false;
            while cursor[depth] < self.slots.len() {
                let slot = cursor[depth];
                cursor[depth] += 1;
                steps += 1;
                if steps > budget {
                    self.clear();
                    return false;
                }
                if self.feasible(node, slot) {
                    self.place(node, slot);
                    placed = true;
                    break;
                }
            }

            if placed {
                depth += 1;
            } else if depth == 0 {
                self.clear();
                return false;
            } else {
                cursor[depth] = 0;
                depth -= 1;
            }
        }

        tracing::debug!(steps, exams = order.len(), "backtracking placed every exam");
        true
    }

    /// Single pass in `order`, first feasible slot wins.
    fn greedy(&mut self, order: &[usize]) -> BTreeMap<usize, SlotFailure> {
        let mut failures = BTreeMap::new();
        for &node in order {
            match (0..self.slots.len()).find(|&s| self.feasible(node, s)) {
                Some(slot) => self.place(node, slot),
                None => {
                    failures.insert(node, self.diagnose(node));
                }
            }
        }
        failures
    }

    fn clear(&mut self) {
        self.assigned.iter_mut().for_each(|a| *a = None);
        self.load.iter_mut().for_each(|l| *l = 0);
    }
}

/// Builds the timetable for `requested` exams over `slots`.
///
/// Codes without an exam record in the catalog are ignored; the planner
/// rejects them before calling this.
pub fn build_timetable(
    catalog: &Catalog,
    requested: &BTreeSet<CourseCode>,
    slots: &[Slot],
    config: &BuilderConfig,
) -> Schedule {
    let capacity = catalog.total_capacity();
    let nodes = conflict_graph(catalog, requested, capacity);
    let order = placement_order(&nodes);

    let mut board = Board::new(&nodes, slots, capacity);
    let mut failures: BTreeMap<usize, SlotFailure> = BTreeMap::new();

    let (doomed, placeable): (Vec<usize>, Vec<usize>) =
        order.iter().copied().partition(|&n| board.never_fits(n));
    for &node in &doomed {
        failures.insert(node, board.static_failure(node));
    }

    let solved = config.max_backtrack_steps > 0
        && board.backtrack(&placeable, config.max_backtrack_steps);
    if !solved {
        if config.max_backtrack_steps > 0 {
            tracing::debug!(
                budget = config.max_backtrack_steps,
                "backtracking gave up, falling back to greedy placement"
            );
        }
        failures.extend(board.greedy(&placeable));
    }

    let mut conflicts = Vec::new();
    for &node in &order {
        if let Some(reason) = failures.remove(&node) {
            tracing::warn!(
                course_code = %nodes[node].code,
                reason = %reason,
                "exam left unscheduled"
            );
            conflicts.push(Conflict::Slot {
                course_code: nodes[node].code.clone(),
                reason,
            });
        }
    }

    let mut entries = Vec::new();
    let mut unscheduled = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        let Some(slot) = board.assigned[index].map(|s| slots[s]) else {
            unscheduled.push(node.code.clone());
            continue;
        };
        entries.push(TimetableEntry {
            course_code: node.code.clone(),
            course_name: (!node.name.is_empty()).then(|| node.name.to_string()),
            date: slot.date,
            start_time: slot.start,
            end_time: slot.start + Duration::minutes(i64::from(node.duration_minutes)),
        });
    }
    entries.sort_by(|a, b| {
        a.sitting()
            .cmp(&b.sitting())
            .then_with(|| a.course_code.cmp(&b.course_code))
    });

    tracing::debug!(
        requested = nodes.len(),
        scheduled = entries.len(),
        unscheduled = unscheduled.len(),
        slots = slots.len(),
        "built timetable"
    );

    Schedule {
        entries,
        unscheduled,
        conflicts,
    }
}

/// Nodes in course code order with adjacency by shared students.
fn conflict_graph<'a>(
    catalog: &'a Catalog,
    requested: &BTreeSet<CourseCode>,
    capacity: u64,
) -> Vec<Node<'a>> {
    let exams: Vec<_> = requested.iter().filter_map(|c| catalog.exam(c)).collect();
    let index: BTreeMap<&CourseCode, usize> = exams
        .iter()
        .enumerate()
        .map(|(i, e)| (&e.course_code, i))
        .collect();

    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); exams.len()];
    for student in catalog.students() {
        let sitting: Vec<usize> = student
            .enrolled_courses
            .iter()
            .filter_map(|c| index.get(c).copied())
            .collect();
        for (i, &a) in sitting.iter().enumerate() {
            for &b in &sitting[i + 1..] {
                edges[a].insert(b);
                edges[b].insert(a);
            }
        }
    }

    exams
        .into_iter()
        .zip(edges)
        .map(|(exam, neighbours)| {
            let enrollment = catalog.roster(&exam.course_code).len();
            Node {
                code: &exam.course_code,
                name: &exam.course_name,
                duration_minutes: exam.duration_minutes,
                enrollment,
                demand: u64::try_from(enrollment).unwrap_or(u64::MAX).min(capacity),
                neighbours: neighbours.into_iter().collect(),
            }
        })
        .collect()
}

fn placement_order(nodes: &[Node<'_>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| {
        let (na, nb) = (&nodes[a], &nodes[b]);
        nb.neighbours
            .len()
            .cmp(&na.neighbours.len())
            .then(nb.enrollment.cmp(&na.enrollment))
            .then_with(|| na.code.cmp(nb.code))
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::Fixture;
    use crate::horizon::Horizon;

    fn slots(days: u32, day_end: &str) -> Vec<Slot> {
        Horizon::from_days(
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            days,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::parse_from_str(day_end, "%H:%M").unwrap(),
            180,
            true,
        )
        .unwrap()
        .slots()
    }

    fn codes(codes: &[&str]) -> BTreeSet<CourseCode> {
        codes.iter().map(|c| CourseCode::new(*c).unwrap()).collect()
    }

    fn slot_of(schedule: &Schedule, code: &str) -> Option<(NaiveDate, NaiveTime)> {
        schedule
            .entries
            .iter()
            .find(|e| e.course_code.as_str() == code)
            .map(TimetableEntry::sitting)
    }

    #[test]
    fn shared_student_forces_different_slots() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .exam("CS102", 180)
            .hall("101", 60, 10, 6)
            .student("S1", &["CS101", "CS102"])
            .build();

        let schedule = build_timetable(
            &catalog,
            &codes(&["CS101", "CS102"]),
            &slots(1, "18:00"),
            &BuilderConfig::default(),
        );

        assert!(schedule.conflicts.is_empty());
        assert_eq!(schedule.entries.len(), 2);
        assert_ne!(slot_of(&schedule, "CS101"), slot_of(&schedule, "CS102"));
    }

    #[test]
    fn disjoint_exams_share_a_slot_when_capacity_allows() {
        let catalog = Fixture::new()
            .exam("CS101", 120)
            .exam("MA101", 180)
            .hall("101", 60, 10, 6)
            .students("C", 20, &["CS101"])
            .students("M", 20, &["MA101"])
            .build();

        let schedule = build_timetable(
            &catalog,
            &codes(&["CS101", "MA101"]),
            &slots(1, "18:00"),
            &BuilderConfig::default(),
        );

        assert_eq!(slot_of(&schedule, "CS101"), slot_of(&schedule, "MA101"));
        let cs = &schedule.entries[0];
        assert_eq!(cs.course_code.as_str(), "CS101");
        assert_eq!(cs.end_time, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
        assert_eq!(cs.course_name.as_deref(), Some("CS101 course"));
    }

    #[test]
    fn capacity_splits_disjoint_exams() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .exam("MA101", 180)
            .hall("101", 30, 5, 6)
            .students("C", 20, &["CS101"])
            .students("M", 20, &["MA101"])
            .build();

        let schedule = build_timetable(
            &catalog,
            &codes(&["CS101", "MA101"]),
            &slots(1, "18:00"),
            &BuilderConfig::default(),
        );

        assert!(schedule.conflicts.is_empty());
        assert_ne!(slot_of(&schedule, "CS101"), slot_of(&schedule, "MA101"));
    }

    #[test]
    fn oversized_exam_still_gets_a_slot() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .hall("H1", 10, 2, 5)
            .students("S", 15, &["CS101"])
            .build();

        let schedule = build_timetable(
            &catalog,
            &codes(&["CS101"]),
            &slots(1, "12:00"),
            &BuilderConfig::default(),
        );

        assert!(schedule.conflicts.is_empty());
        assert_eq!(schedule.entries.len(), 1);
    }

    #[test]
    fn clashing_exams_beyond_horizon_are_reported() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .exam("CS102", 180)
            .hall("101", 60, 10, 6)
            .student("S1", &["CS101", "CS102"])
            .build();

        let schedule = build_timetable(
            &catalog,
            &codes(&["CS101", "CS102"]),
            &slots(1, "12:00"),
            &BuilderConfig::default(),
        );

        assert_eq!(schedule.entries.len(), 1);
        assert_eq!(schedule.unscheduled.len(), 1);
        assert_eq!(schedule.conflicts.len(), 1);
        assert!(
            schedule.conflicts[0]
                .to_string()
                .starts_with("no feasible slot for CS102: exceeds horizon or capacity")
        );
    }

    #[test]
    fn exam_longer_than_a_block_is_unschedulable() {
        let catalog = Fixture::new()
            .exam("CS101", 240)
            .hall("101", 60, 10, 6)
            .student("S1", &["CS101"])
            .build();

        let schedule = build_timetable(
            &catalog,
            &codes(&["CS101"]),
            &slots(2, "18:00"),
            &BuilderConfig::default(),
        );

        assert!(schedule.entries.is_empty());
        assert!(matches!(
            schedule.conflicts[0],
            Conflict::Slot {
                reason: SlotFailure::DurationTooLong {
                    duration_minutes: 240,
                    slot_minutes: 180
                },
                ..
            }
        ));
    }

    #[test]
    fn empty_horizon_reports_no_slots() {
        let catalog = Fixture::new()
            .exam("CS101", 180)
            .hall("101", 60, 10, 6)
            .student("S1", &["CS101"])
            .build();

        let schedule =
            build_timetable(&catalog, &codes(&["CS101"]), &[], &BuilderConfig::default());
        assert!(matches!(
            schedule.conflicts[0],
            Conflict::Slot {
                reason: SlotFailure::NoSlots,
                ..
            }
        ));
    }

    /// Six exams in the cycle A-C-E-B-D-F-A are two-colourable, but the
    /// degree order with first-fit puts A and B together and then strands E and F.
    fn six_cycle() -> Catalog {
        let mut fixture = Fixture::new().hall("101", 60, 10, 6);
        for code in ["A", "B", "C", "D", "E", "F"] {
            fixture = fixture.exam(code, 180);
        }
        let ring = ["A", "C", "E", "B", "D", "F"];
        for i in 0..ring.len() {
            let pair = [ring[i], ring[(i + 1) % ring.len()]];
            fixture = fixture.student(&format!("S{i}"), &pair);
        }
        fixture.build()
    }

    #[test]
    fn greedy_alone_strands_an_exam() {
        let catalog = six_cycle();
        let schedule = build_timetable(
            &catalog,
            &codes(&["A", "B", "C", "D", "E", "F"]),
            &slots(1, "15:00"),
            &BuilderConfig {
                max_backtrack_steps: 0,
            },
        );
        assert!(!schedule.unscheduled.is_empty());
        assert!(matches!(
            schedule.conflicts[0],
            Conflict::Slot {
                reason: SlotFailure::Clash,
                ..
            }
        ));
    }

    #[test]
    fn backtracking_recovers_two_colouring() {
        let catalog = six_cycle();
        let schedule = build_timetable(
            &catalog,
            &codes(&["A", "B", "C", "D", "E", "F"]),
            &slots(1, "15:00"),
            &BuilderConfig::default(),
        );

        assert!(schedule.conflicts.is_empty());
        assert_eq!(schedule.entries.len(), 6);
        for student in catalog.students() {
            let sittings: BTreeSet<_> = student
                .enrolled_courses
                .iter()
                .filter_map(|c| slot_of(&schedule, c.as_str()))
                .collect();
            assert_eq!(sittings.len(), student.enrolled_courses.len());
        }
    }

    #[test]
    fn exhausted_budget_falls_back_to_greedy() {
        let catalog = six_cycle();
        let schedule = build_timetable(
            &catalog,
            &codes(&["A", "B", "C", "D", "E", "F"]),
            &slots(1, "15:00"),
            &BuilderConfig {
                max_backtrack_steps: 3,
            },
        );
        assert_eq!(schedule.entries.len() + schedule.unscheduled.len(), 6);
        assert!(!schedule.conflicts.is_empty());
    }
}
