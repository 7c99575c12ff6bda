//! Seating policies: how the occupants of one hall are laid out on its grid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{Hall, ValidationError};

/// Which seating policy the allocator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeatingMode {
    /// Fill seats row by row, one course after another.
    Sequential,
    /// Alternate courses so neighbours sit different exams.
    #[default]
    Interleaved,
}

/// Which seats count as neighbours when interleaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Adjacency {
    /// Left and right within a row.
    #[default]
    Row,
    /// Left, right, front and back.
    Grid,
}

impl SeatingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Interleaved => "interleaved",
        }
    }
}

impl Adjacency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Grid => "grid",
        }
    }
}

impl fmt::Display for SeatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Adjacency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SeatingMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "interleaved" => Ok(Self::Interleaved),
            _ => Err(ValidationError::InvalidSeatingMode {
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Adjacency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "row" => Ok(Self::Row),
            "grid" => Ok(Self::Grid),
            _ => Err(ValidationError::InvalidAdjacency {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for SeatingMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SeatingMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Adjacency {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Adjacency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Seating policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeatingConfig {
    #[serde(default)]
    pub mode: SeatingMode,
    /// Ignored by sequential seating.
    #[serde(default)]
    pub adjacency: Adjacency,
}

impl SeatingConfig {
    pub fn policy(&self) -> Box<dyn SeatingPolicy> {
        match self.mode {
            SeatingMode::Sequential => Box::new(Sequential),
            SeatingMode::Interleaved => Box::new(Interleaved {
                adjacency: self.adjacency,
            }),
        }
    }
}

/// The seat grid of one hall.
///
/// Only the first `capacity` positions in row-major order are usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLayout {
    pub rows: u32,
    pub columns: u32,
    pub capacity: u32,
}

impl SeatLayout {
    pub const fn seats(&self) -> usize {
        self.capacity as usize
    }

    /// Zero-based `(row, column)` of seat `index`.
    pub const fn position(&self, index: usize) -> (usize, usize) {
        let columns = self.columns as usize;
        (index / columns, index % columns)
    }
}

impl From<&Hall> for SeatLayout {
    fn from(hall: &Hall) -> Self {
        Self {
            rows: hall.rows,
            columns: hall.columns,
            capacity: hall.capacity,
        }
    }
}

/// Label of the seat at zero-based `index`: `S-1`, `S-2`, ...
pub fn seat_label(index: usize) -> String {
    format!("S-{}", index + 1)
}

/// Result of arranging one hall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrangement {
    /// One entry per seat: the index of the group sitting there, if any.
    pub seats: Vec<Option<usize>>,
    /// Adjacent seat pairs that ended up holding the same group.
    pub same_course_pairs: usize,
}

/// Decides which group occupies each seat of a hall.
///
/// `group_sizes[g]` students of group `g` must all be seated; callers never
/// pass more students than the layout has seats.
pub trait SeatingPolicy: Send + Sync {
    fn arrange(&self, layout: &SeatLayout, group_sizes: &[usize]) -> Arrangement;
}

/// Row-major fill, groups one after another.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl SeatingPolicy for Sequential {
    fn arrange(&self, layout: &SeatLayout, group_sizes: &[usize]) -> Arrangement {
        let mut seats = vec![None; layout.seats()];
        let mut next = 0;
        for (group, &size) in group_sizes.iter().enumerate() {
            for seat in seats.iter_mut().skip(next).take(size) {
                *seat = Some(group);
            }
            next += size;
        }
        Arrangement {
            seats,
            same_course_pairs: 0,
        }
    }
}

/// Alternates groups so that no two neighbours share a course where possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interleaved {
    pub adjacency: Adjacency,
}

impl SeatingPolicy for Interleaved {
    fn arrange(&self, layout: &SeatLayout, group_sizes: &[usize]) -> Arrangement {
        if group_sizes.iter().filter(|&&n| n > 0).count() <= 1 {
            return Sequential.arrange(layout, group_sizes);
        }

        let total: usize = group_sizes.iter().sum();
        let columns = layout.columns as usize;
        let mut spare = layout.seats().saturating_sub(total);
        let mut remaining = group_sizes.to_vec();
        let mut seats: Vec<Option<usize>> = vec![None; layout.seats()];
        let mut same_course_pairs = 0;

        for index in 0..seats.len() {
            if remaining.iter().all(|&n| n == 0) {
                break;
            }

            let (row, column) = layout.position(index);
            let left = if column > 0 { seats[index - 1] } else { None };
            let front = if self.adjacency == Adjacency::Grid && row > 0 {
                seats[index - columns]
            } else {
                None
            };

            let group = match largest(&remaining, |g| Some(g) != left && Some(g) != front) {
                Some(group) => group,
                None if spare > 0 => {
                    // Leave the seat empty as a spacer.
                    spare -= 1;
                    continue;
                }
                None => {
                    let Some(group) = largest(&remaining, |_| true) else {
                        break;
                    };
                    same_course_pairs +=
                        usize::from(left == Some(group)) + usize::from(front == Some(group));
                    group
                }
            };

            seats[index] = Some(group);
            remaining[group] -= 1;
        }

        Arrangement {
            seats,
            same_course_pairs,
        }
    }
}

/// Group with the most students left among those passing `allowed`; lowest index on ties.
fn largest(remaining: &[usize], allowed: impl Fn(usize) -> bool) -> Option<usize> {
    remaining
        .iter()
        .enumerate()
        .filter(|&(g, &n)| n > 0 && allowed(g))
        .max_by(|(ga, na), (gb, nb)| na.cmp(nb).then(gb.cmp(ga)))
        .map(|(g, _)| g)
}
