//! Weekday calendar.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::{BreakKind, WorkingDay};
use crate::traits::CalendarBuilder;

/// Monday to Friday of a month; Fridays carry the extended break.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    /// Dates to skip, e.g. public holidays.
    pub excluded: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn excluding(mut self, date: NaiveDate) -> Self {
        self.excluded.insert(date);
        self
    }
}

impl CalendarBuilder for WeekdayCalendar {
    fn working_days(&self, year: i32, month: u32) -> Vec<WorkingDay> {
        let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Vec::new();
        };

        first
            .iter_days()
            .take_while(|d| d.month() == month)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .filter(|d| !self.excluded.contains(d))
            .map(|date| {
                let kind = if date.weekday() == Weekday::Fri {
                    BreakKind::ExtendedFriday
                } else {
                    BreakKind::Lunch
                };
                WorkingDay::new(date, kind)
            })
            .collect()
    }
}
