//! Schedule calculation for recurring templates.
//!
//! The rules are pure date arithmetic: step forward by the frequency's interval,
//! then optionally pin the result to a preferred weekday or day of month. Pinning
//! never moves a date backwards, so the result is always on or after the plain
//! interval step.

use crate::entities::Frequency;
use chrono::{Datelike, Days, Months, NaiveDate};

/// Number of days in `month` of `year`.
#[must_use]
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next_first| next_first.pred_opt())
        .map_or(28, |last| last.day())
}

/// Computes the occurrence following `anchor`.
///
/// * `day_of_week` (0 = Sunday .. 6) only affects weekly and biweekly schedules.
/// * `day_of_month` (1-31) only affects monthly and quarterly schedules, and is
///   clamped to the length of the target month.
///
/// Returns `None` only when the result falls outside the representable date range.
#[must_use]
pub fn next_occurrence(
    anchor: NaiveDate,
    frequency: Frequency,
    day_of_month: Option<u32>,
    day_of_week: Option<u32>,
) -> Option<NaiveDate> {
    match frequency {
        Frequency::Daily => anchor.checked_add_days(Days::new(1)),
        Frequency::Weekly => anchor
            .checked_add_days(Days::new(7))
            .and_then(|date| roll_to_weekday(date, day_of_week)),
        Frequency::Biweekly => anchor
            .checked_add_days(Days::new(14))
            .and_then(|date| roll_to_weekday(date, day_of_week)),
        Frequency::Monthly => anchor
            .checked_add_months(Months::new(1))
            .and_then(|date| pin_day_of_month(date, day_of_month)),
        Frequency::Quarterly => anchor
            .checked_add_months(Months::new(3))
            .and_then(|date| pin_day_of_month(date, day_of_month)),
        Frequency::Yearly => anchor.checked_add_months(Months::new(12)),
    }
}

fn roll_to_weekday(date: NaiveDate, day_of_week: Option<u32>) -> Option<NaiveDate> {
    let Some(target) = day_of_week else {
        return Some(date);
    };
    let current = date.weekday().num_days_from_sunday();
    let forward = (target % 7 + 7 - current) % 7;
    date.checked_add_days(Days::new(u64::from(forward)))
}

// `checked_add_months` has already clamped to the target month, so the month here is
// the target month rather than the anchor's.
fn pin_day_of_month(date: NaiveDate, day_of_month: Option<u32>) -> Option<NaiveDate> {
    let Some(preferred) = day_of_month else {
        return Some(date);
    };
    let last = last_day_of_month(date.year(), date.month());
    date.with_day(preferred.clamp(1, last))
}

/// A frequency together with its optional anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Repetition rule
    pub frequency: Frequency,
    /// Preferred day of month (1-31)
    pub day_of_month: Option<u32>,
    /// Preferred weekday (0 = Sunday .. 6)
    pub day_of_week: Option<u32>,
}

impl Schedule {
    /// A schedule with no anchors.
    #[must_use]
    pub const fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            day_of_month: None,
            day_of_week: None,
        }
    }

    /// The occurrence following `anchor`.
    #[must_use]
    pub fn next_after(&self, anchor: NaiveDate) -> Option<NaiveDate> {
        next_occurrence(anchor, self.frequency, self.day_of_month, self.day_of_week)
    }

    /// Iterates occurrences starting at `first` (inclusive), each derived from the
    /// previous one, stopping after `until` when given.
    #[must_use]
    pub const fn occurrences(&self, first: NaiveDate, until: Option<NaiveDate>) -> Occurrences {
        Occurrences {
            schedule: *self,
            next: Some(first),
            until,
        }
    }
}

/// Iterator returned by [`Schedule::occurrences`].
#[derive(Debug, Clone)]
pub struct Occurrences {
    schedule: Schedule,
    next: Option<NaiveDate>,
    until: Option<NaiveDate>,
}

impl Iterator for Occurrences {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        if self.until.is_some_and(|until| current > until) {
            self.next = None;
            return None;
        }
        self.next = self.schedule.next_after(current);
        Some(current)
    }
}
