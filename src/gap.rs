//! Minimum-gap enforcement for repeat visits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::model::{StoreId, VisitInstance, WorkingDay};
use crate::sequencer::RouteSequencer;
use crate::traits::DistanceMatrixProvider;

/// Two occurrences of a store closer than the minimum gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapWarning {
    pub store_id: StoreId,
    pub earlier_day: usize,
    pub later_day: usize,
    pub required_gap: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GapOutcome {
    pub days: Vec<WorkingDay>,
    pub relocations: usize,
    /// Stops that no longer fit their day after retiming.
    pub displaced: Vec<VisitInstance>,
}

/// `(day, position)` of every placement of each store, sorted by day.
pub(crate) fn placements_by_store(days: &[WorkingDay]) -> BTreeMap<StoreId, Vec<(usize, usize)>> {
    let mut placements: BTreeMap<StoreId, Vec<(usize, usize)>> = BTreeMap::new();
    for (d, day) in days.iter().enumerate() {
        for (p, visit) in day.visits.iter().enumerate() {
            placements
                .entry(visit.instance.store_id.clone())
                .or_default()
                .push((d, p));
        }
    }
    placements
}

/// Consecutive placements of one store closer than `gap` days.
pub(crate) fn gap_violations(days: &[WorkingDay], gap: usize) -> Vec<GapWarning> {
    placements_by_store(days)
        .into_iter()
        .flat_map(|(store_id, placements)| {
            placements
                .windows(2)
                .filter(|w| w[1].0 - w[0].0 < gap)
                .map(|w| GapWarning {
                    store_id: store_id.clone(),
                    earlier_day: w[0].0,
                    later_day: w[1].0,
                    required_gap: gap,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

pub struct GapEnforcer<'a, M: DistanceMatrixProvider> {
    config: &'a PlannerConfig,
    sequencer: &'a RouteSequencer<'a, M>,
}

impl<'a, M: DistanceMatrixProvider> GapEnforcer<'a, M> {
    pub fn new(config: &'a PlannerConfig, sequencer: &'a RouteSequencer<'a, M>) -> Self {
        Self { config, sequencer }
    }

    pub fn enforce(&self, days: Vec<WorkingDay>) -> GapOutcome {
        let gap = self.config.min_visit_gap_days;
        let mut outcome = GapOutcome {
            days,
            ..GapOutcome::default()
        };
        if gap == 0 {
            return outcome;
        }

        let repeated: Vec<StoreId> = placements_by_store(&outcome.days)
            .into_iter()
            .filter(|(_, p)| p.len() > 1)
            .map(|(store, _)| store)
            .collect();

        for store in repeated {
            let mut i = 0usize;
            loop {
                let placements = self.placements_of(&outcome.days, &store);
                if i + 1 >= placements.len() {
                    break;
                }
                let (previous_day, _) = placements[i];
                let (day, position) = placements[i + 1];
                if day - previous_day >= gap {
                    i += 1;
                    continue;
                }

                if self.relocate(&mut outcome, &store, previous_day + gap, day, position) {
                    outcome.relocations += 1;
                    // the moved occurrence may now follow another one; rescan
                    continue;
                }

                warn!(store = %store, earlier_day = previous_day, later_day = day, "minimum visit gap not satisfiable");
                i += 1;
            }
        }

        if outcome.relocations > 0 {
            debug!(relocations = outcome.relocations, "relocated repeat visits for minimum gap");
        }
        outcome
    }

    fn placements_of(&self, days: &[WorkingDay], store: &StoreId) -> Vec<(usize, usize)> {
        let mut placements = Vec::new();
        for (d, day) in days.iter().enumerate() {
            for (p, visit) in day.visits.iter().enumerate() {
                if &visit.instance.store_id == store {
                    placements.push((d, p));
                }
            }
        }
        placements
    }

    /// Move the visit at exactly `(day, position)` to the earliest day at or
    /// after `earliest` with room for it.
    fn relocate(
        &self,
        outcome: &mut GapOutcome,
        store: &StoreId,
        earliest: usize,
        day: usize,
        position: usize,
    ) -> bool {
        let days = &outcome.days;
        let instance = days[day].visits[position].instance.clone();

        let target = (earliest..days.len()).find_map(|d| {
            if days[d].visits.len() >= self.config.max_stores_per_day || days[d].contains_store(store) {
                return None;
            }
            self.sequencer
                .try_insert(days[d].break_kind, &days[d].visits, &instance)
                .map(|route| (d, route))
        });
        let Some((target, route)) = target else {
            return false;
        };

        let source = &mut outcome.days[day];
        source.visits.remove(position);
        let remaining: Vec<VisitInstance> = source.visits.iter().map(|v| v.instance.clone()).collect();
        let retimed = self.sequencer.retime(source.break_kind, remaining);
        source.visits = retimed.visits;
        outcome.displaced.extend(retimed.overflow);

        outcome.days[target].visits = route.visits;
        true
    }
}
