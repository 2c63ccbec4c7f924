//! The monthly optimization pipeline.
//!
//! Stores -> expansion -> clustering -> day assignment -> sequencing ->
//! gap enforcement -> deduplication -> statistics. Each stage takes the
//! previous stage's output by value; invariants are checked on the final
//! snapshot.

use std::collections::BTreeSet;

use chrono::Datelike;
use tracing::{debug, error, info, warn};

use crate::cluster::GeographicClusterer;
use crate::config::PlannerConfig;
use crate::dedup::Deduplicator;
use crate::error::{InputError, PlanError};
use crate::expander::VisitExpander;
use crate::gap::GapEnforcer;
use crate::geo::{Coordinates, HaversineMatrix, centroid, haversine_km};
use crate::invariants;
use crate::model::{BreakKind, InstanceKey, Plan, Store, StoreId, VisitInstance, WorkingDay};
use crate::scheduler::DayScheduler;
use crate::sequencer::RouteSequencer;
use crate::stats::{StageCounters, StatisticsCollector};
use crate::traits::{CalendarBuilder, DistanceMatrixProvider, StoreDataSource};

/// Build the month's plan for `stores` over `working_days`.
pub fn optimize(stores: &[Store], working_days: &[WorkingDay], config: &PlannerConfig) -> Result<Plan, InputError> {
    optimize_with_fillers(stores, &[], working_days, config)
}

/// As [`optimize`], with lower-priority `fillers` available to back-fill
/// under-filled days.
pub fn optimize_with_fillers(
    stores: &[Store],
    fillers: &[Store],
    working_days: &[WorkingDay],
    config: &PlannerConfig,
) -> Result<Plan, InputError> {
    config.validate()?;
    validate_stores(stores, true)?;
    validate_stores(fillers, false)?;

    let mut days: Vec<WorkingDay> = working_days
        .iter()
        .map(|d| WorkingDay::new(d.date, d.break_kind))
        .collect();
    let collector = StatisticsCollector::new(config.min_visit_gap_days);

    if stores.is_empty() {
        let statistics = collector.collect(&days, StageCounters::default());
        return Ok(Plan {
            working_days: days,
            unassigned: Vec::new(),
            out_of_range: Vec::new(),
            statistics,
        });
    }

    let (in_range, out_of_range) = split_by_home_distance(stores, config);
    if !out_of_range.is_empty() {
        info!(excluded = out_of_range.len(), "stores beyond home-base distance limit");
    }

    let epoch = config.month_epoch.unwrap_or_else(|| month_epoch(&days));
    let expander = VisitExpander::new(config, epoch);

    let schedulable = in_range
        .iter()
        .any(|s| expander.effective_frequency(s) >= config.min_frequency_threshold.max(f64::MIN_POSITIVE));
    if !in_range.is_empty() && !schedulable {
        return Err(InputError::NoSchedulableFrequency {
            threshold: config.min_frequency_threshold,
        });
    }

    let expansion = expander.expand(&in_range);
    let required_ids: BTreeSet<&StoreId> = stores.iter().map(|s| &s.id).collect();
    let filler_stores: Vec<Store> = fillers
        .iter()
        .filter(|f| !required_ids.contains(&f.id))
        .filter(|f| haversine_km(config.home_base, f.location) <= config.max_distance_from_home_km)
        .cloned()
        .collect();
    let filler_instances = expander.expand_fillers(&filler_stores);

    let required = expansion.instances.len();
    let mut allotted = expansion.allotted.clone();
    for filler in &filler_instances {
        allotted.insert(filler.store_id.clone(), 1);
    }
    let instances: Vec<VisitInstance> = expansion
        .instances
        .iter()
        .cloned()
        .chain(filler_instances)
        .collect();

    let points: Vec<Coordinates> = instances[..required].iter().map(|i| i.location).collect();
    let clusters = GeographicClusterer::new(config, days.len()).cluster(&points);

    let matrix = HaversineMatrix;
    let sequencer = RouteSequencer::new(config, &matrix);
    let kinds: Vec<BreakKind> = days.iter().map(|d| d.break_kind).collect();
    let assignment = DayScheduler::new(config, &sequencer).assign(&kinds, &instances, required, &clusters);

    let mut overflow = Vec::new();
    for (day, members) in days.iter_mut().zip(&assignment.days) {
        let stops: Vec<VisitInstance> = members.iter().map(|&i| instances[i].clone()).collect();
        let route = sequencer.sequence(day.break_kind, stops);
        day.visits = route.visits;
        overflow.extend(route.overflow);
    }

    let mut trimmed_visits = overflow.len();
    let relocated = relocate_all(&mut days, overflow, config, &sequencer);
    if trimmed_visits > 0 {
        info!(trimmed = trimmed_visits, relocated, "time-window trimming");
    }

    let gap_outcome = GapEnforcer::new(config, &sequencer).enforce(days);
    let mut days = gap_outcome.days;
    if !gap_outcome.displaced.is_empty() {
        trimmed_visits += gap_outcome.displaced.len();
        let relocated = relocate_all(&mut days, gap_outcome.displaced, config, &sequencer);
        debug!(relocated, "re-offered stops displaced by gap moves");
    }

    let dedup = Deduplicator::new(config, &sequencer).deduplicate(days, &allotted);
    let days = dedup.days;

    // Reconcile: every required instance not scheduled is unassigned.
    let scheduled: BTreeSet<InstanceKey> = days
        .iter()
        .flat_map(|d| &d.visits)
        .map(|v| v.instance.key())
        .collect();
    let unassigned: Vec<VisitInstance> = expansion
        .instances
        .iter()
        .filter(|i| !scheduled.contains(&i.key()))
        .cloned()
        .collect();
    if !unassigned.is_empty() {
        warn!(unassigned = unassigned.len(), "required visits exceed schedulable capacity");
    }

    let counters = StageCounters {
        total_required: required,
        unassigned: unassigned.len(),
        out_of_range: out_of_range.len(),
        trimmed_visits,
        gap_relocations: gap_outcome.relocations,
        duplicates_dropped: dedup.dropped.len(),
        dedup_shortfalls: dedup.shortfalls,
    };
    let statistics = collector.collect(&days, counters);

    let plan = Plan {
        working_days: days,
        unassigned,
        out_of_range,
        statistics,
    };

    for violation in invariants::check(&plan, config) {
        error!(?violation, "plan invariant violated");
    }
    info!(
        planned = plan.statistics.total_planned,
        required = plan.statistics.total_required,
        coverage = plan.statistics.coverage_percent,
        "plan complete"
    );
    Ok(plan)
}

/// Load data through the collaborators and plan one month.
pub fn plan_month<S, C>(
    source: &S,
    calendar: &C,
    year: i32,
    month: u32,
    config: &PlannerConfig,
) -> Result<Plan, PlanError>
where
    S: StoreDataSource,
    C: CalendarBuilder,
{
    let stores = source.load_stores().map_err(|e| PlanError::DataSource(Box::new(e)))?;
    let fillers = source
        .load_filler_candidates()
        .map_err(|e| PlanError::DataSource(Box::new(e)))?;
    let days = calendar.working_days(year, month);
    Ok(optimize_with_fillers(&stores, &fillers, &days, config)?)
}

fn validate_stores(stores: &[Store], check_frequency: bool) -> Result<(), InputError> {
    let mut ids = BTreeSet::new();
    for store in stores {
        if !store.location.is_valid() {
            return Err(InputError::MalformedCoordinates {
                store_id: store.id.clone(),
                lat: store.location.lat,
                lng: store.location.lng,
            });
        }
        if check_frequency && (!store.base_frequency.is_finite() || store.base_frequency < 0.0) {
            return Err(InputError::InvalidFrequency {
                store_id: store.id.clone(),
                frequency: store.base_frequency,
            });
        }
        if !ids.insert(&store.id) {
            return Err(InputError::DuplicateStore(store.id.clone()));
        }
    }
    Ok(())
}

fn split_by_home_distance(stores: &[Store], config: &PlannerConfig) -> (Vec<Store>, Vec<StoreId>) {
    let mut in_range = Vec::with_capacity(stores.len());
    let mut out_of_range = Vec::new();
    for store in stores {
        if haversine_km(config.home_base, store.location) > config.max_distance_from_home_km {
            out_of_range.push(store.id.clone());
        } else {
            in_range.push(store.clone());
        }
    }
    (in_range, out_of_range)
}

/// `year * 12 + month0` of the first working day.
fn month_epoch(days: &[WorkingDay]) -> i64 {
    days.first()
        .map(|d| i64::from(d.date.year()) * 12 + i64::from(d.date.month0()))
        .unwrap_or(0)
}

/// Re-offer trimmed stops; returns how many found a day.
fn relocate_all<M: DistanceMatrixProvider>(
    days: &mut [WorkingDay],
    stops: Vec<VisitInstance>,
    config: &PlannerConfig,
    sequencer: &RouteSequencer<'_, M>,
) -> usize {
    stops
        .into_iter()
        .filter(|instance| relocate(days, instance, config, sequencer))
        .count()
}

/// Offer a trimmed stop to other days, nearest area first.
fn relocate<M: DistanceMatrixProvider>(
    days: &mut [WorkingDay],
    instance: &VisitInstance,
    config: &PlannerConfig,
    sequencer: &RouteSequencer<'_, M>,
) -> bool {
    let store_days: Vec<usize> = days
        .iter()
        .enumerate()
        .filter(|(_, d)| d.contains_store(&instance.store_id))
        .map(|(i, _)| i)
        .collect();

    let mut candidates: Vec<(usize, f64)> = days
        .iter()
        .enumerate()
        .filter(|(_, d)| d.visits.len() < config.max_stores_per_day)
        .filter(|(i, _)| store_days.iter().all(|s| s.abs_diff(*i) >= config.min_visit_gap_days.max(1)))
        .map(|(i, d)| {
            let anchor = centroid(d.visits.iter().map(|v| v.instance.location)).unwrap_or(config.home_base);
            (i, haversine_km(anchor, instance.location))
        })
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    for (day, _) in candidates {
        if let Some(route) = sequencer.try_insert(days[day].break_kind, &days[day].visits, instance) {
            days[day].visits = route.visits;
            return true;
        }
    }
    false
}
