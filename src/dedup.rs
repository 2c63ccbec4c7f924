//! Whole-plan reconciliation.
//!
//! Every visit instance may be scheduled at most once and no store may hold
//! more placements than it was allotted. Surplus placements are dropped by a
//! deterministic policy: earliest day, then higher priority, then no
//! time-window flag, then earlier position within the day. The pass is
//! idempotent.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::model::{InstanceKey, StoreId, VisitInstance, WorkingDay};
use crate::sequencer::RouteSequencer;
use crate::traits::DistanceMatrixProvider;

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub days: Vec<WorkingDay>,
    pub dropped: Vec<VisitInstance>,
    /// Stores whose kept occurrences could not all satisfy the minimum gap.
    pub shortfalls: Vec<StoreId>,
}

#[derive(Debug, Clone)]
struct Candidate {
    day: usize,
    position: usize,
    priority_class: u8,
    window_violation: bool,
    key: InstanceKey,
}

impl Candidate {
    fn rank(&self) -> (usize, u8, bool, usize) {
        (self.day, self.priority_class, self.window_violation, self.position)
    }
}

pub struct Deduplicator<'a, M: DistanceMatrixProvider> {
    config: &'a PlannerConfig,
    sequencer: &'a RouteSequencer<'a, M>,
}

impl<'a, M: DistanceMatrixProvider> Deduplicator<'a, M> {
    pub fn new(config: &'a PlannerConfig, sequencer: &'a RouteSequencer<'a, M>) -> Self {
        Self { config, sequencer }
    }

    /// `allotted` is the number of instances each store received.
    pub fn deduplicate(&self, mut days: Vec<WorkingDay>, allotted: &BTreeMap<StoreId, u32>) -> DedupOutcome {
        let mut by_store: BTreeMap<StoreId, Vec<Candidate>> = BTreeMap::new();
        for (d, day) in days.iter().enumerate() {
            for (p, visit) in day.visits.iter().enumerate() {
                by_store
                    .entry(visit.instance.store_id.clone())
                    .or_default()
                    .push(Candidate {
                        day: d,
                        position: p,
                        priority_class: visit.instance.priority_class,
                        window_violation: visit.window_violation,
                        key: visit.instance.key(),
                    });
            }
        }

        let mut doomed: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut shortfalls = Vec::new();

        for (store, mut candidates) in by_store {
            candidates.sort_by_key(Candidate::rank);

            let mut seen = BTreeSet::new();
            let (unique, duplicates): (Vec<Candidate>, Vec<Candidate>) =
                candidates.into_iter().partition(|c| seen.insert(c.key.clone()));
            doomed.extend(duplicates.iter().map(|c| (c.day, c.position)));

            let allowed = allotted.get(&store).copied().unwrap_or(0) as usize;
            if unique.len() <= allowed {
                continue;
            }

            let (kept, short) = self.select(&unique, allowed);
            if short {
                warn!(store = %store, allowed, "kept occurrences fall short of the minimum gap");
                shortfalls.push(store.clone());
            }
            doomed.extend(
                unique
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !kept.contains(i))
                    .map(|(_, c)| (c.day, c.position)),
            );
        }

        let mut dropped = Vec::new();
        let mut touched: BTreeSet<usize> = BTreeSet::new();
        // positions removed back to front so earlier indices stay valid
        for &(day, position) in doomed.iter().rev() {
            dropped.push(days[day].visits.remove(position).instance);
            touched.insert(day);
        }
        for day in touched {
            let kind = days[day].break_kind;
            let ordered: Vec<VisitInstance> = days[day].visits.iter().map(|v| v.instance.clone()).collect();
            let route = self.sequencer.retime(kind, ordered);
            days[day].visits = route.visits;
            dropped.extend(route.overflow);
        }

        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "dropped surplus placements");
        }
        DedupOutcome {
            days,
            dropped,
            shortfalls,
        }
    }

    /// Indices into `ranked` to keep. The flag reports that gap-respecting
    /// selection could not reach `allowed`.
    fn select(&self, ranked: &[Candidate], allowed: usize) -> (BTreeSet<usize>, bool) {
        let mut kept = BTreeSet::new();
        if allowed == 0 {
            return (kept, false);
        }

        let mut last_day: Option<usize> = None;
        for (i, candidate) in ranked.iter().enumerate() {
            if kept.len() == allowed {
                break;
            }
            if last_day.is_none_or(|d| candidate.day >= d + self.config.min_visit_gap_days) {
                kept.insert(i);
                last_day = Some(candidate.day);
            }
        }

        let short = kept.len() < allowed;
        for i in 0..ranked.len() {
            if kept.len() == allowed {
                break;
            }
            kept.insert(i);
        }
        (kept, short)
    }
}
