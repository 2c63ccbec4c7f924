//! Planner data model.
//!
//! Times of day are stored as minutes from midnight. `Plan` and everything
//! inside it is serializable so callers can persist or diff plans.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;
use crate::stats::Statistics;

/// Stable store identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub String);

impl StoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A retail location with a required visit cadence. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub retailer: String,
    pub district: String,
    pub location: Coordinates,
    pub sales_volume: f64,
    /// Ordinal priority class; 1 is the most important.
    pub priority_class: u8,
    /// Visits per month, may be fractional.
    pub base_frequency: f64,
    /// Per-visit duration. Falls back to the configured default.
    pub visit_duration_minutes: Option<u32>,
}

/// One required (or optional filler) occurrence of a store visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitInstance {
    pub store_id: StoreId,
    /// 1-based occurrence number within the month.
    pub sequence: u32,
    /// Number of occurrences allotted to the store this month.
    pub occurrences: u32,
    pub multi_visit: bool,
    pub priority_class: u8,
    pub location: Coordinates,
    pub duration_minutes: u32,
    /// Optional back-fill candidate, outside required-visit accounting.
    pub filler: bool,
}

impl VisitInstance {
    /// Unique key of this occurrence within one run.
    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            store_id: self.store_id.clone(),
            sequence: self.sequence,
            filler: self.filler,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub store_id: StoreId,
    pub sequence: u32,
    pub filler: bool,
}

/// Which break interrupts the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakKind {
    Lunch,
    ExtendedFriday,
}

/// A visit placed in a working day with its simulated timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledVisit {
    pub instance: VisitInstance,
    pub order: usize,
    pub distance_from_previous_km: f64,
    pub travel_minutes: u32,
    pub arrival_minute: u32,
    pub departure_minute: u32,
    /// Service straddles the start of the day's break.
    pub window_violation: bool,
}

impl ScheduledVisit {
    pub fn arrival_time(&self) -> Option<NaiveTime> {
        time_from_minutes(self.arrival_minute)
    }

    pub fn departure_time(&self) -> Option<NaiveTime> {
        time_from_minutes(self.departure_minute)
    }
}

/// A weekday slot in the planning month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingDay {
    pub date: NaiveDate,
    pub break_kind: BreakKind,
    pub visits: Vec<ScheduledVisit>,
}

impl WorkingDay {
    pub fn new(date: NaiveDate, break_kind: BreakKind) -> Self {
        Self {
            date,
            break_kind,
            visits: Vec::new(),
        }
    }

    pub fn total_distance_km(&self) -> f64 {
        self.visits.iter().map(|v| v.distance_from_previous_km).sum()
    }

    pub fn finish_minute(&self) -> Option<u32> {
        self.visits.last().map(|v| v.departure_minute)
    }

    pub fn contains_store(&self, store_id: &StoreId) -> bool {
        self.visits.iter().any(|v| &v.instance.store_id == store_id)
    }
}

/// Pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub working_days: Vec<WorkingDay>,
    /// Required instances that could not be scheduled.
    pub unassigned: Vec<VisitInstance>,
    /// Stores excluded by the home-base distance limit.
    pub out_of_range: Vec<StoreId>,
    pub statistics: Statistics,
}

impl Plan {
    pub fn scheduled_visits(&self) -> impl Iterator<Item = (usize, &ScheduledVisit)> {
        self.working_days
            .iter()
            .enumerate()
            .flat_map(|(idx, day)| day.visits.iter().map(move |v| (idx, v)))
    }

    /// Number of scheduled required (non-filler) visits.
    pub fn scheduled_required(&self) -> usize {
        self.scheduled_visits()
            .filter(|(_, v)| !v.instance.filler)
            .count()
    }
}

/// Minutes from midnight for a wall-clock time.
pub fn minutes_of_day(time: NaiveTime) -> u32 {
    use chrono::Timelike;
    time.hour() * 60 + time.minute()
}

pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_round_trip() {
        let t = NaiveTime::from_hms_opt(13, 45, 0).unwrap();
        assert_eq!(minutes_of_day(t), 825);
        assert_eq!(time_from_minutes(825), Some(t));
        assert_eq!(time_from_minutes(24 * 60), None);
    }

    #[test]
    fn test_instance_key_distinguishes_sequence() {
        let base = VisitInstance {
            store_id: StoreId::new("s1"),
            sequence: 1,
            occurrences: 2,
            multi_visit: true,
            priority_class: 1,
            location: Coordinates::new(0.0, 0.0),
            duration_minutes: 30,
            filler: false,
        };
        let mut second = base.clone();
        second.sequence = 2;
        assert_ne!(base.key(), second.key());
    }
}
