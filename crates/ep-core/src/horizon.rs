//! Scheduling horizon and the time slots it yields.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::{ValidationError, hhmm};

/// Longest horizon accepted, in days.
pub const MAX_HORIZON_DAYS: i64 = 366;

/// The date and time range exams may be placed in.
///
/// Each included day is cut into back-to-back blocks of `slot_minutes`
/// starting at `day_start`. Blocks that would run past `day_end` are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub day_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub day_end: NaiveTime,
    pub slot_minutes: u32,
    #[serde(default)]
    pub skip_weekends: bool,
}

/// One schedulable block. Slots of a horizon never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    /// Length of the block in minutes.
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

impl Horizon {
    /// Horizon of `days` consecutive calendar days starting at `start_date`.
    pub fn from_days(
        start_date: NaiveDate,
        days: u32,
        day_start: NaiveTime,
        day_end: NaiveTime,
        slot_minutes: u32,
        skip_weekends: bool,
    ) -> Result<Self, ValidationError> {
        if days == 0 {
            return Err(invalid("must span at least one day"));
        }
        let end_date = start_date
            .checked_add_signed(Duration::days(i64::from(days) - 1))
            .ok_or_else(|| invalid("end date is out of range"))?;
        let horizon = Self {
            start_date,
            end_date,
            day_start,
            day_end,
            slot_minutes,
            skip_weekends,
        };
        horizon.validate()?;
        Ok(horizon)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_date < self.start_date {
            return Err(invalid("end date is before start date"));
        }
        if (self.end_date - self.start_date).num_days() >= MAX_HORIZON_DAYS {
            return Err(invalid(&format!(
                "spans more than {MAX_HORIZON_DAYS} days"
            )));
        }
        if self.day_end <= self.day_start {
            return Err(invalid("day end must be after day start"));
        }
        if self.slot_minutes == 0 {
            return Err(invalid("slot length must be positive"));
        }
        Ok(())
    }

    /// All slots in chronological order.
    pub fn slots(&self) -> Vec<Slot> {
        let block = Duration::minutes(i64::from(self.slot_minutes));
        let mut slots = Vec::new();

        for date in self.start_date.iter_days() {
            if date > self.end_date {
                break;
            }
            if self.skip_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }

            let mut start = self.day_start;
            loop {
                let (end, wrapped) = start.overflowing_add_signed(block);
                if wrapped != 0 || end > self.day_end {
                    break;
                }
                slots.push(Slot { date, start, end });
                start = end;
            }
        }

        slots
    }
}

fn invalid(reason: &str) -> ValidationError {
    ValidationError::InvalidHorizon {
        reason: reason.to_string(),
    }
}
