//! Intra-day route sequencing and timeline simulation.
//!
//! Stops are ordered by nearest neighbour from the home base and improved
//! with 2-opt on the open path. The timeline then walks the order from
//! `work_start`, jumping over the day's break, and trims the first stop that
//! would depart after `work_end` together with everything behind it.

use tracing::debug;

use crate::config::PlannerConfig;
use crate::model::{BreakKind, ScheduledVisit, VisitInstance};
use crate::traits::DistanceMatrixProvider;

const EPSILON: f64 = 1e-9;

/// A sequenced day: committed stops plus stops trimmed for time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayRoute {
    pub visits: Vec<ScheduledVisit>,
    pub overflow: Vec<VisitInstance>,
}

impl DayRoute {
    pub fn total_distance_km(&self) -> f64 {
        self.visits.iter().map(|v| v.distance_from_previous_km).sum()
    }
}

pub struct RouteSequencer<'a, M: DistanceMatrixProvider> {
    config: &'a PlannerConfig,
    matrix_provider: &'a M,
}

impl<'a, M: DistanceMatrixProvider> RouteSequencer<'a, M> {
    pub fn new(config: &'a PlannerConfig, matrix_provider: &'a M) -> Self {
        Self {
            config,
            matrix_provider,
        }
    }

    /// Order, simulate and trim a day's stops.
    pub fn sequence(&self, kind: BreakKind, instances: Vec<VisitInstance>) -> DayRoute {
        if instances.is_empty() {
            return DayRoute::default();
        }

        let matrix = self.matrix(&instances);
        let mut order = nearest_neighbor_order(&matrix);

        for _ in 0..self.config.max_two_opt_passes {
            if !two_opt_improve(&mut order, &matrix) {
                break;
            }
        }

        let mut slots: Vec<Option<VisitInstance>> = instances.into_iter().map(Some).collect();
        let ordered: Vec<VisitInstance> = order.iter().filter_map(|&i| slots[i - 1].take()).collect();
        let ordered_matrix = reorder_matrix(&matrix, &order);

        let route = self.simulate(kind, ordered, &ordered_matrix);
        if !route.overflow.is_empty() {
            debug!(
                kept = route.visits.len(),
                trimmed = route.overflow.len(),
                "trimmed stops past end of work window"
            );
        }
        route
    }

    /// Recompute the timeline for stops in their given order.
    pub fn retime(&self, kind: BreakKind, ordered: Vec<VisitInstance>) -> DayRoute {
        if ordered.is_empty() {
            return DayRoute::default();
        }
        let matrix = self.matrix(&ordered);
        self.simulate(kind, ordered, &matrix)
    }

    /// Insert `instance` at the position adding the least distance while the
    /// whole day still fits the work window.
    pub fn try_insert(
        &self,
        kind: BreakKind,
        current: &[ScheduledVisit],
        instance: &VisitInstance,
    ) -> Option<DayRoute> {
        let base: Vec<VisitInstance> = current.iter().map(|v| v.instance.clone()).collect();
        let mut best: Option<(f64, DayRoute)> = None;

        for position in 0..=base.len() {
            let mut candidate = base.clone();
            candidate.insert(position, instance.clone());
            let route = self.retime(kind, candidate);
            if !route.overflow.is_empty() {
                continue;
            }
            let distance = route.total_distance_km();
            if best.as_ref().is_none_or(|(d, _)| distance + EPSILON < *d) {
                best = Some((distance, route));
            }
        }

        best.map(|(_, route)| route)
    }

    /// Departure minute of the last stop if all stops were kept.
    pub fn projected_finish(&self, kind: BreakKind, instances: &[VisitInstance]) -> u32 {
        if instances.is_empty() {
            return self.config.work_start_minute();
        }
        let matrix = self.matrix(instances);
        let order = nearest_neighbor_order(&matrix);
        let ordered: Vec<VisitInstance> = order.iter().map(|&i| instances[i - 1].clone()).collect();
        let ordered_matrix = reorder_matrix(&matrix, &order);
        self.timeline(kind, &ordered, &ordered_matrix)
            .last()
            .map_or(self.config.work_start_minute(), |v| v.departure_minute)
    }

    /// Matrix over `[home, stops...]`.
    fn matrix(&self, instances: &[VisitInstance]) -> Vec<Vec<f64>> {
        let mut locations = Vec::with_capacity(instances.len() + 1);
        locations.push(self.config.home_base);
        locations.extend(instances.iter().map(|i| i.location));
        self.matrix_provider.matrix_for(&locations)
    }

    fn simulate(&self, kind: BreakKind, ordered: Vec<VisitInstance>, matrix: &[Vec<f64>]) -> DayRoute {
        let mut visits = self.timeline(kind, &ordered, matrix);
        let work_end = self.config.work_end_minute();

        let cut = visits
            .iter()
            .position(|v| v.departure_minute > work_end)
            .unwrap_or(visits.len());
        visits.truncate(cut);
        let overflow = ordered.into_iter().skip(cut).collect();

        DayRoute { visits, overflow }
    }

    /// Walk the ordered stops; `matrix` is indexed `[home, ordered...]`.
    fn timeline(&self, kind: BreakKind, ordered: &[VisitInstance], matrix: &[Vec<f64>]) -> Vec<ScheduledVisit> {
        let model = self.config.travel_model();
        let (break_start, break_end) = self.config.break_window(kind);
        let mut break_taken = break_start >= break_end;
        let mut clock = self.config.work_start_minute();
        let mut previous = 0usize;
        let mut visits = Vec::with_capacity(ordered.len());

        for (order, instance) in ordered.iter().enumerate() {
            let current = order + 1;
            let km = matrix[previous][current];
            let travel = model.minutes_for(km);

            let mut arrival = clock + travel;
            if !break_taken && arrival >= break_start {
                break_taken = true;
                arrival = arrival.max(break_end);
            }
            let departure = arrival + self.config.buffer_minutes + instance.duration_minutes;
            let window_violation = !break_taken && departure > break_start;

            visits.push(ScheduledVisit {
                instance: instance.clone(),
                order,
                distance_from_previous_km: km,
                travel_minutes: travel,
                arrival_minute: arrival,
                departure_minute: departure,
                window_violation,
            });

            clock = departure;
            previous = current;
        }

        visits
    }
}

/// Greedy path from node 0 (home). Returns stop nodes `1..n` in visit order.
fn nearest_neighbor_order(matrix: &[Vec<f64>]) -> Vec<usize> {
    let n = matrix.len();
    let mut unvisited: Vec<usize> = (1..n).collect();
    let mut order = Vec::with_capacity(n.saturating_sub(1));
    let mut current = 0usize;

    while !unvisited.is_empty() {
        let mut best_idx = 0;
        let mut best_distance = f64::MAX;
        for (i, &candidate) in unvisited.iter().enumerate() {
            let distance = matrix[current][candidate];
            if distance < best_distance {
                best_distance = distance;
                best_idx = i;
            }
        }
        let next = unvisited.remove(best_idx);
        order.push(next);
        current = next;
    }

    order
}

/// 2-opt: reverse the first segment whose reversal shortens the path.
/// Returns true if an improvement was made.
fn two_opt_improve(order: &mut [usize], matrix: &[Vec<f64>]) -> bool {
    let n = order.len();
    if n < 2 {
        return false;
    }

    for i in 0..n - 1 {
        let before = if i == 0 { 0 } else { order[i - 1] };
        for j in i + 1..n {
            let after_old = if j + 1 < n { matrix[order[j]][order[j + 1]] } else { 0.0 };
            let after_new = if j + 1 < n { matrix[order[i]][order[j + 1]] } else { 0.0 };
            let delta = matrix[before][order[j]] + after_new - matrix[before][order[i]] - after_old;
            if delta < -EPSILON {
                order[i..=j].reverse();
                return true;
            }
        }
    }

    false
}

/// Matrix re-indexed as `[home, order...]`.
fn reorder_matrix(matrix: &[Vec<f64>], order: &[usize]) -> Vec<Vec<f64>> {
    let nodes: Vec<usize> = std::iter::once(0).chain(order.iter().copied()).collect();
    nodes
        .iter()
        .map(|&a| nodes.iter().map(|&b| matrix[a][b]).collect())
        .collect()
}
