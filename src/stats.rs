//! Plan statistics. Pure aggregation, no decisions.

use serde::{Deserialize, Serialize};

use crate::gap::{GapWarning, gap_violations, placements_by_store};
use crate::model::{StoreId, WorkingDay};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_required: usize,
    pub total_planned: usize,
    pub unassigned: usize,
    pub coverage_percent: f64,
    pub fillers_scheduled: usize,

    pub active_days: usize,
    pub empty_days: usize,
    pub min_stores_per_active_day: usize,
    pub max_stores_per_active_day: usize,
    /// min / max stores across active days.
    pub balance_ratio: f64,

    pub total_distance_km: f64,
    pub average_distance_per_active_day_km: f64,

    pub gap_compliance_percent: f64,
    pub gap_warnings: Vec<GapWarning>,

    pub out_of_range_stores: usize,
    /// Stops trimmed from days by the work-window check.
    pub trimmed_visits: usize,
    pub gap_relocations: usize,
    pub duplicates_dropped: usize,
    pub dedup_shortfalls: Vec<StoreId>,
}

/// Counters produced by the pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct StageCounters {
    pub total_required: usize,
    pub unassigned: usize,
    pub out_of_range: usize,
    pub trimmed_visits: usize,
    pub gap_relocations: usize,
    pub duplicates_dropped: usize,
    pub dedup_shortfalls: Vec<StoreId>,
}

pub struct StatisticsCollector {
    min_visit_gap_days: usize,
}

impl StatisticsCollector {
    pub fn new(min_visit_gap_days: usize) -> Self {
        Self { min_visit_gap_days }
    }

    pub fn collect(&self, days: &[WorkingDay], counters: StageCounters) -> Statistics {
        let scheduled = days.iter().flat_map(|d| &d.visits);
        let total_planned = scheduled.clone().filter(|v| !v.instance.filler).count();
        let fillers_scheduled = scheduled.filter(|v| v.instance.filler).count();

        let loads: Vec<usize> = days
            .iter()
            .map(|d| d.visits.len())
            .filter(|&n| n > 0)
            .collect();
        let active_days = loads.len();
        let min_load = loads.iter().copied().min().unwrap_or(0);
        let max_load = loads.iter().copied().max().unwrap_or(0);

        let total_distance_km: f64 = days.iter().map(WorkingDay::total_distance_km).sum();

        let repeat_pairs: usize = placements_by_store(days)
            .values()
            .map(|p| p.len().saturating_sub(1))
            .sum();
        let gap_warnings = gap_violations(days, self.min_visit_gap_days);

        Statistics {
            total_required: counters.total_required,
            total_planned,
            unassigned: counters.unassigned,
            coverage_percent: percent(total_planned, counters.total_required),
            fillers_scheduled,
            active_days,
            empty_days: days.len() - active_days,
            min_stores_per_active_day: min_load,
            max_stores_per_active_day: max_load,
            balance_ratio: if max_load == 0 { 0.0 } else { min_load as f64 / max_load as f64 },
            total_distance_km,
            average_distance_per_active_day_km: if active_days == 0 {
                0.0
            } else {
                total_distance_km / active_days as f64
            },
            gap_compliance_percent: percent(repeat_pairs - gap_warnings.len(), repeat_pairs),
            gap_warnings,
            out_of_range_stores: counters.out_of_range,
            trimmed_visits: counters.trimmed_visits,
            gap_relocations: counters.gap_relocations,
            duplicates_dropped: counters.duplicates_dropped,
            dedup_shortfalls: counters.dedup_shortfalls,
        }
    }
}

/// Percentage of `part` in `whole`; 100 when there is nothing to measure.
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        100.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
