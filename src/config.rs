//! Planner configuration.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::geo::{Coordinates, TravelModel};
use crate::model::{BreakKind, minutes_of_day};

/// How visit instances are grouped before day assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringStrategy {
    Grid,
    Kmeans,
}

/// How clusters are packed onto days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingStrategy {
    /// Each cluster goes to the best-scoring day with room, splitting when needed.
    BestFit,
    /// Clusters are swept in spatial order, spilling over day borders at a
    /// balanced target load.
    GridCapacity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_stores_per_day: usize,
    pub min_stores_per_day: usize,
    pub max_cluster_radius_km: f64,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub lunch_start: NaiveTime,
    pub lunch_end: NaiveTime,
    pub friday_break_start: NaiveTime,
    pub friday_break_end: NaiveTime,
    pub buffer_minutes: u32,
    pub default_visit_minutes: u32,
    pub min_visit_gap_days: usize,
    pub min_frequency_threshold: f64,
    pub home_base: Coordinates,
    pub max_distance_from_home_km: f64,
    pub clustering_strategy: ClusteringStrategy,
    pub packing_strategy: PackingStrategy,

    /// Grid cell edge for the grid clustering strategy.
    pub grid_cell_km: f64,
    pub kmeans_max_iterations: usize,
    pub driving_minutes_per_km: f64,
    pub walking_minutes_per_km: f64,
    pub co_located_threshold_km: f64,
    /// Travel allowance per stop used by the day capacity estimate.
    pub estimated_travel_minutes_per_stop: u32,
    pub merge_distance_km: f64,
    pub backfill_radius_km: f64,
    pub backfill_max_expansions: u32,
    pub max_two_opt_passes: usize,
    /// Sampling epoch; derived from the first working day when absent.
    pub month_epoch: Option<i64>,
    /// Frequency per priority class, overriding `Store::base_frequency`.
    pub priority_frequencies: BTreeMap<u8, f64>,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_stores_per_day: 15,
            min_stores_per_day: 5,
            max_cluster_radius_km: 5.0,
            work_start: hm(8, 30),
            work_end: hm(17, 30),
            lunch_start: hm(12, 30),
            lunch_end: hm(13, 30),
            friday_break_start: hm(12, 0),
            friday_break_end: hm(14, 30),
            buffer_minutes: 5,
            default_visit_minutes: 20,
            min_visit_gap_days: 5,
            min_frequency_threshold: 0.1,
            home_base: Coordinates::new(0.0, 0.0),
            max_distance_from_home_km: 150.0,
            clustering_strategy: ClusteringStrategy::Kmeans,
            packing_strategy: PackingStrategy::BestFit,
            grid_cell_km: 5.0,
            kmeans_max_iterations: 50,
            driving_minutes_per_km: 2.0,
            walking_minutes_per_km: 12.0,
            co_located_threshold_km: 0.15,
            estimated_travel_minutes_per_stop: 10,
            merge_distance_km: 10.0,
            backfill_radius_km: 5.0,
            backfill_max_expansions: 3,
            max_two_opt_passes: 100,
            month_epoch: None,
            priority_frequencies: BTreeMap::new(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        let invalid = |msg: &str| Err(InputError::InvalidConfig(msg.to_string()));

        if self.max_stores_per_day == 0 {
            return invalid("max_stores_per_day must be positive");
        }
        if self.min_stores_per_day > self.max_stores_per_day {
            return invalid("min_stores_per_day exceeds max_stores_per_day");
        }
        if self.work_start >= self.work_end {
            return invalid("work_start must be before work_end");
        }
        if self.lunch_start > self.lunch_end || self.friday_break_start > self.friday_break_end {
            return invalid("break windows must not be inverted");
        }
        if !self.home_base.is_valid() {
            return invalid("home base coordinates are malformed");
        }
        let positive = [
            self.max_cluster_radius_km,
            self.grid_cell_km,
            self.driving_minutes_per_km,
            self.walking_minutes_per_km,
            self.max_distance_from_home_km,
        ];
        if positive.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return invalid("distances and travel rates must be positive");
        }
        if !self.min_frequency_threshold.is_finite() || self.min_frequency_threshold < 0.0 {
            return invalid("min_frequency_threshold must be non-negative");
        }
        if self.priority_frequencies.values().any(|f| !f.is_finite() || *f < 0.0) {
            return invalid("priority frequencies must be non-negative");
        }
        Ok(())
    }

    pub fn work_start_minute(&self) -> u32 {
        minutes_of_day(self.work_start)
    }

    pub fn work_end_minute(&self) -> u32 {
        minutes_of_day(self.work_end)
    }

    /// Break window `(start, end)` in minutes for a day.
    pub fn break_window(&self, kind: BreakKind) -> (u32, u32) {
        match kind {
            BreakKind::Lunch => (minutes_of_day(self.lunch_start), minutes_of_day(self.lunch_end)),
            BreakKind::ExtendedFriday => (
                minutes_of_day(self.friday_break_start),
                minutes_of_day(self.friday_break_end),
            ),
        }
    }

    /// Working minutes available for visits on a day.
    pub fn available_minutes(&self, kind: BreakKind) -> u32 {
        let (start, end) = self.break_window(kind);
        let window = self.work_end_minute().saturating_sub(self.work_start_minute());
        window.saturating_sub(end.saturating_sub(start))
    }

    pub fn travel_model(&self) -> TravelModel {
        TravelModel {
            driving_minutes_per_km: self.driving_minutes_per_km,
            walking_minutes_per_km: self.walking_minutes_per_km,
            co_located_threshold_km: self.co_located_threshold_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(PlannerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_inverted_work_window() {
        let config = PlannerConfig {
            work_start: hm(18, 0),
            ..PlannerConfig::default()
        };
        assert!(matches!(config.validate(), Err(InputError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_min_above_max() {
        let config = PlannerConfig {
            min_stores_per_day: 20,
            max_stores_per_day: 10,
            ..PlannerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_friday_has_less_time() {
        let config = PlannerConfig::default();
        assert_eq!(config.available_minutes(BreakKind::Lunch), 480);
        assert_eq!(config.available_minutes(BreakKind::ExtendedFriday), 390);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: PlannerConfig = serde_json::from_str(
            r#"{"max_stores_per_day": 12, "clustering_strategy": "grid", "work_start": "09:00:00"}"#,
        )
        .unwrap();
        assert_eq!(config.max_stores_per_day, 12);
        assert_eq!(config.clustering_strategy, ClusteringStrategy::Grid);
        assert_eq!(config.work_start_minute(), 540);
        assert_eq!(config.min_visit_gap_days, 5);
    }
}
