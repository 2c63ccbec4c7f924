//! Assignment of visit instances to working days.
//!
//! Clusters of first occurrences are packed onto days by the configured
//! [`PackingStrategy`]. Repeat occurrences are then placed gap-aware,
//! under-filled days are consolidated, and remaining under-filled days are
//! back-filled from the unplaced and filler pools.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::config::{PackingStrategy, PlannerConfig};
use crate::geo::{Coordinates, centroid, haversine_km};
use crate::model::{BreakKind, StoreId, VisitInstance};
use crate::sequencer::RouteSequencer;
use crate::traits::DistanceMatrixProvider;

/// Weight of remaining capacity in the day score.
const CAPACITY_WEIGHT: f64 = 1.0;
/// Weight of geographic compatibility in the day score.
const GEO_WEIGHT: f64 = 2.0;
/// Weight of the priority concentration penalty.
const BALANCE_WEIGHT: f64 = 0.5;
/// Penalty per day of distance from the ideal repeat-visit day.
const SPACING_WEIGHT: f64 = 0.05;

/// Instance indices per day plus required instances that found no day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    pub days: Vec<Vec<usize>>,
    pub unplaced: Vec<usize>,
}

#[derive(Debug, Clone)]
struct DayBin {
    kind: BreakKind,
    capacity: usize,
    members: Vec<usize>,
}

impl DayBin {
    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.members.len())
    }
}

pub struct DayScheduler<'a, M: DistanceMatrixProvider> {
    config: &'a PlannerConfig,
    sequencer: &'a RouteSequencer<'a, M>,
}

/// Working state for one assignment run.
struct Board<'i> {
    instances: &'i [VisitInstance],
    bins: Vec<DayBin>,
    /// Day indices holding each store.
    store_days: BTreeMap<StoreId, Vec<usize>>,
    gap: usize,
}

impl<'i> Board<'i> {
    fn centroid_of(&self, day: usize) -> Option<Coordinates> {
        centroid(self.bins[day].members.iter().map(|&i| self.instances[i].location))
    }

    fn holds_store(&self, day: usize, store: &StoreId) -> bool {
        self.store_days.get(store).is_some_and(|days| days.contains(&day))
    }

    /// True when `day` keeps the minimum gap to every other day of `store`,
    /// ignoring `except` (the day a member is moving away from).
    fn gap_ok(&self, store: &StoreId, day: usize, except: Option<usize>) -> bool {
        self.store_days.get(store).is_none_or(|days| {
            days.iter()
                .filter(|&&d| Some(d) != except)
                .all(|&d| d.abs_diff(day) >= self.gap)
        })
    }

    fn can_take(&self, day: usize, instance: &VisitInstance) -> bool {
        self.bins[day].remaining() > 0 && !self.holds_store(day, &instance.store_id)
    }

    fn place(&mut self, day: usize, index: usize) {
        self.bins[day].members.push(index);
        let days = self
            .store_days
            .entry(self.instances[index].store_id.clone())
            .or_default();
        days.push(day);
        days.sort_unstable();
    }

    fn remove(&mut self, day: usize, index: usize) {
        self.bins[day].members.retain(|&m| m != index);
        if let Some(days) = self.store_days.get_mut(&self.instances[index].store_id) {
            if let Some(pos) = days.iter().position(|&d| d == day) {
                days.remove(pos);
            }
        }
    }

    fn priority_share(&self, day: usize, priority: u8, extra: usize, extra_same: usize) -> f64 {
        let members = &self.bins[day].members;
        let total = members.len() + extra;
        if total == 0 {
            return 0.0;
        }
        let same = members
            .iter()
            .filter(|&&m| self.instances[m].priority_class == priority)
            .count()
            + extra_same;
        same as f64 / total as f64
    }
}

impl<'a, M: DistanceMatrixProvider> DayScheduler<'a, M> {
    pub fn new(config: &'a PlannerConfig, sequencer: &'a RouteSequencer<'a, M>) -> Self {
        Self { config, sequencer }
    }

    /// Stops a day can hold: the time-based estimate capped by
    /// `max_stores_per_day`.
    pub fn day_capacity(&self, kind: BreakKind, instances: &[VisitInstance]) -> usize {
        let average_visit = if instances.is_empty() {
            f64::from(self.config.default_visit_minutes)
        } else {
            instances.iter().map(|i| f64::from(i.duration_minutes)).sum::<f64>() / instances.len() as f64
        };
        let handling = average_visit
            + f64::from(self.config.buffer_minutes)
            + f64::from(self.config.estimated_travel_minutes_per_stop);
        let by_time = (f64::from(self.config.available_minutes(kind)) / handling.max(1.0)).floor() as usize;
        by_time.min(self.config.max_stores_per_day)
    }

    /// Assign `instances[..required]` (clustered in `clusters`) and use
    /// `instances[required..]` as filler candidates.
    pub fn assign(
        &self,
        day_kinds: &[BreakKind],
        instances: &[VisitInstance],
        required: usize,
        clusters: &[Cluster],
    ) -> Assignment {
        let required_instances = &instances[..required];
        let mut board = Board {
            instances,
            bins: day_kinds
                .iter()
                .map(|&kind| DayBin {
                    kind,
                    capacity: self.day_capacity(kind, required_instances),
                    members: Vec::new(),
                })
                .collect(),
            store_days: BTreeMap::new(),
            gap: self.config.min_visit_gap_days,
        };
        let mut unplaced = Vec::new();

        if board.bins.is_empty() {
            unplaced.extend(0..required);
            return Assignment {
                days: Vec::new(),
                unplaced,
            };
        }

        // First occurrences go by cluster; repeats are placed afterwards.
        let mut first_clusters: Vec<Cluster> = Vec::with_capacity(clusters.len());
        let mut repeats: Vec<usize> = Vec::new();
        for cluster in clusters {
            let (firsts, rest): (Vec<usize>, Vec<usize>) = cluster
                .members
                .iter()
                .copied()
                .filter(|&i| i < required)
                .partition(|&i| instances[i].sequence == 1);
            repeats.extend(rest);
            if !firsts.is_empty() {
                first_clusters.push(Cluster {
                    centroid: cluster.centroid,
                    members: firsts,
                });
            }
        }

        match self.config.packing_strategy {
            PackingStrategy::BestFit => self.pack_best_fit(&mut board, first_clusters, &mut unplaced),
            PackingStrategy::GridCapacity => self.pack_grid_capacity(&mut board, first_clusters, &mut unplaced),
        }

        repeats.sort_by(|&a, &b| {
            instances[a]
                .store_id
                .cmp(&instances[b].store_id)
                .then(instances[a].sequence.cmp(&instances[b].sequence))
        });
        for index in repeats {
            if !self.place_repeat(&mut board, index) {
                unplaced.push(index);
            }
        }

        self.consolidate(&mut board);
        self.backfill(&mut board, &mut unplaced, required);

        unplaced.sort_unstable();
        Assignment {
            days: board.bins.into_iter().map(|b| b.members).collect(),
            unplaced,
        }
    }

    fn score(&self, board: &Board<'_>, day: usize, center: Coordinates, members: &[usize]) -> f64 {
        let bin = &board.bins[day];
        let remaining = bin.remaining() as f64 / bin.capacity.max(1) as f64;

        let geo = match board.centroid_of(day) {
            None => 0.5,
            Some(existing) => {
                1.0 / (1.0 + haversine_km(center, existing) / self.config.max_cluster_radius_km)
            }
        };

        let priority = members
            .iter()
            .map(|&m| board.instances[m].priority_class)
            .min()
            .unwrap_or(u8::MAX);
        let same = members
            .iter()
            .filter(|&&m| board.instances[m].priority_class == priority)
            .count();
        let balance = if bin.members.is_empty() {
            0.0
        } else {
            board.priority_share(day, priority, members.len(), same)
        };

        CAPACITY_WEIGHT * remaining + GEO_WEIGHT * geo - BALANCE_WEIGHT * balance
    }

    /// Highest-scoring day among `candidates`; ties go to the earlier day.
    fn best_day(
        &self,
        board: &Board<'_>,
        candidates: impl Iterator<Item = usize>,
        center: Coordinates,
        members: &[usize],
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for day in candidates {
            let score = self.score(board, day, center, members);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((day, score));
            }
        }
        best.map(|(day, _)| day)
    }

    fn sort_clusters(&self, board: &Board<'_>, clusters: &mut [Cluster]) {
        let key = |c: &Cluster| {
            c.members
                .iter()
                .map(|&m| board.instances[m].priority_class)
                .min()
                .unwrap_or(u8::MAX)
        };
        clusters.sort_by(|a, b| {
            key(a)
                .cmp(&key(b))
                .then(b.len().cmp(&a.len()))
                .then(a.centroid.lat.total_cmp(&b.centroid.lat))
                .then(a.centroid.lng.total_cmp(&b.centroid.lng))
        });
    }

    fn pack_best_fit(&self, board: &mut Board<'_>, mut clusters: Vec<Cluster>, unplaced: &mut Vec<usize>) {
        self.sort_clusters(board, &mut clusters);

        for cluster in clusters {
            let mut pending = cluster.members;
            let mut split = 0usize;

            while !pending.is_empty() {
                let center = centroid(pending.iter().map(|&m| board.instances[m].location))
                    .unwrap_or(cluster.centroid);
                let open: Vec<usize> = (0..board.bins.len())
                    .filter(|&d| board.bins[d].remaining() > 0)
                    .collect();
                if open.is_empty() {
                    unplaced.append(&mut pending);
                    break;
                }

                let whole = open.iter().copied().filter(|&d| board.bins[d].remaining() >= pending.len());
                if let Some(day) = self.best_day(board, whole, center, &pending) {
                    for index in pending.drain(..) {
                        board.place(day, index);
                    }
                    break;
                }

                // Too big for any single day: fill the best day with the
                // members nearest to its anchor and carry the rest.
                let Some(day) = self.best_day(board, open.into_iter(), center, &pending) else {
                    break;
                };
                let anchor = board.centroid_of(day).unwrap_or_else(|| {
                    farthest_from(board.instances, &pending, center).unwrap_or(center)
                });
                sort_by_distance(board.instances, &mut pending, anchor);
                let take = board.bins[day].remaining().min(pending.len());
                for index in pending.drain(..take) {
                    board.place(day, index);
                }
                split += 1;
            }

            if split > 0 {
                debug!(days = split + 1, "split oversized cluster across days");
            }
        }
    }

    fn pack_grid_capacity(&self, board: &mut Board<'_>, mut clusters: Vec<Cluster>, unplaced: &mut Vec<usize>) {
        clusters.sort_by(|a, b| {
            b.centroid
                .lat
                .total_cmp(&a.centroid.lat)
                .then(a.centroid.lng.total_cmp(&b.centroid.lng))
        });

        let total: usize = clusters.iter().map(Cluster::len).sum();
        let target = total.div_ceil(board.bins.len()).max(1);
        let mut cursor = 0usize;
        let mut last = self.config.home_base;

        for cluster in clusters {
            let mut members = cluster.members;
            sort_by_distance(board.instances, &mut members, last);
            for index in members {
                while cursor < board.bins.len()
                    && board.bins[cursor].members.len() >= target.min(board.bins[cursor].capacity)
                {
                    cursor += 1;
                }
                if cursor < board.bins.len() {
                    board.place(cursor, index);
                } else {
                    let location = board.instances[index].location;
                    let open = (0..board.bins.len()).filter(|&d| board.bins[d].remaining() > 0);
                    match self.best_day(board, open, location, &[index]) {
                        Some(day) => board.place(day, index),
                        None => unplaced.push(index),
                    }
                }
                last = board.instances[index].location;
            }
        }
    }

    /// Place a repeat occurrence on the best gap-respecting day, falling back
    /// to any day without the store (the gap pass reports what remains).
    fn place_repeat(&self, board: &mut Board<'_>, index: usize) -> bool {
        let instances = board.instances;
        let instance = &instances[index];
        let store = instance.store_id.clone();
        let location = instance.location;
        let days = board.bins.len();
        let spacing = (days / instance.occurrences.max(1) as usize).max(board.gap);
        let ideal = board
            .store_days
            .get(&store)
            .and_then(|d| d.last().copied())
            .map(|last| last + spacing);

        let mut best: Option<(usize, f64)> = None;
        for day in (0..days).filter(|&d| board.can_take(d, instance) && board.gap_ok(&store, d, None)) {
            let mut score = self.score(board, day, location, &[index]);
            if let Some(ideal) = ideal {
                score -= SPACING_WEIGHT * day.abs_diff(ideal) as f64;
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((day, score));
            }
        }

        let fallback = || {
            let open = (0..days).filter(|&d| board.can_take(d, instance));
            self.best_day(board, open, location, &[index])
        };
        match best.map(|(d, _)| d).or_else(fallback) {
            Some(day) => {
                board.place(day, index);
                true
            }
            None => false,
        }
    }

    fn under_filled(&self, board: &Board<'_>, day: usize) -> bool {
        board.bins[day].members.len() < self.config.min_stores_per_day
    }

    fn fits_in_window(&self, kind: BreakKind, instances: &[VisitInstance], members: &[usize]) -> bool {
        let stops: Vec<VisitInstance> = members.iter().map(|&m| instances[m].clone()).collect();
        self.sequencer.projected_finish(kind, &stops) <= self.config.work_end_minute()
    }

    /// Merge pairs of under-filled days whose centroids are close.
    fn consolidate(&self, board: &mut Board<'_>) {
        let mut merges = 0usize;

        for _ in 0..board.bins.len() {
            let under: Vec<usize> = (0..board.bins.len())
                .filter(|&d| !board.bins[d].members.is_empty() && self.under_filled(board, d))
                .collect();

            let mut best: Option<(usize, usize, f64)> = None;
            for (ai, &a) in under.iter().enumerate() {
                for &b in &under[ai + 1..] {
                    let (Some(ca), Some(cb)) = (board.centroid_of(a), board.centroid_of(b)) else {
                        continue;
                    };
                    let distance = haversine_km(ca, cb);
                    if distance > self.config.merge_distance_km {
                        continue;
                    }
                    let (target, source) = if board.bins[b].members.len() > board.bins[a].members.len() {
                        (b, a)
                    } else {
                        (a, b)
                    };
                    if !self.can_merge(board, source, target) {
                        continue;
                    }
                    if best.is_none_or(|(_, _, d)| distance < d) {
                        best = Some((source, target, distance));
                    }
                }
            }

            let Some((source, target, _)) = best else {
                break;
            };
            let moving = board.bins[source].members.clone();
            for index in moving {
                board.remove(source, index);
                board.place(target, index);
            }
            merges += 1;
        }

        if merges > 0 {
            info!(merges, "consolidated under-filled days");
        }
    }

    fn can_merge(&self, board: &Board<'_>, source: usize, target: usize) -> bool {
        let combined = board.bins[source].members.len() + board.bins[target].members.len();
        if combined > board.bins[target].capacity {
            return false;
        }
        let movable = board.bins[source].members.iter().all(|&m| {
            let store = &board.instances[m].store_id;
            !board.holds_store(target, store) && board.gap_ok(store, target, Some(source))
        });
        if !movable {
            return false;
        }
        let members: Vec<usize> = board.bins[target]
            .members
            .iter()
            .chain(&board.bins[source].members)
            .copied()
            .collect();
        self.fits_in_window(board.bins[target].kind, board.instances, &members)
    }

    /// Fill under-filled days from unplaced required instances, then from
    /// filler candidates, searching outward from the day's area.
    fn backfill(&self, board: &mut Board<'_>, unplaced: &mut Vec<usize>, required: usize) {
        let mut pool: Vec<usize> = unplaced.drain(..).collect();
        pool.sort_by_key(|&i| (board.instances[i].priority_class, i));
        let mut fillers: Vec<usize> = (required..board.instances.len())
            .filter(|&i| !board.store_days.contains_key(&board.instances[i].store_id))
            .collect();
        fillers.sort_by_key(|&i| (board.instances[i].priority_class, i));
        pool.extend(fillers);

        let mut filled = 0usize;
        for day in 0..board.bins.len() {
            if !self.under_filled(board, day) {
                continue;
            }
            let mut radius = self.config.backfill_radius_km;

            for _ in 0..=self.config.backfill_max_expansions {
                let anchor = board.centroid_of(day).unwrap_or(self.config.home_base);
                let mut nearby: Vec<(usize, f64)> = pool
                    .iter()
                    .map(|&i| (i, haversine_km(anchor, board.instances[i].location)))
                    .filter(|&(_, d)| d <= radius)
                    .collect();
                nearby.sort_by(|a, b| {
                    let (ia, ib) = (&board.instances[a.0], &board.instances[b.0]);
                    ia.filler
                        .cmp(&ib.filler)
                        .then(ia.priority_class.cmp(&ib.priority_class))
                        .then(a.1.total_cmp(&b.1))
                        .then(a.0.cmp(&b.0))
                });

                let instances = board.instances;
                for (index, _) in nearby {
                    if !self.under_filled(board, day) {
                        break;
                    }
                    let instance = &instances[index];
                    if instance.filler && board.store_days.contains_key(&instance.store_id) {
                        continue;
                    }
                    if !board.can_take(day, instance) || !board.gap_ok(&instance.store_id, day, None) {
                        continue;
                    }
                    let mut members = board.bins[day].members.clone();
                    members.push(index);
                    if !self.fits_in_window(board.bins[day].kind, instances, &members) {
                        continue;
                    }
                    board.place(day, index);
                    pool.retain(|&p| p != index);
                    filled += 1;
                }

                if !self.under_filled(board, day) {
                    break;
                }
                radius *= 2.0;
            }
        }

        if filled > 0 {
            info!(filled, "back-filled under-filled days");
        }
        unplaced.extend(pool.into_iter().filter(|&i| i < required));
    }
}

fn sort_by_distance(instances: &[VisitInstance], members: &mut [usize], anchor: Coordinates) {
    members.sort_by(|&a, &b| {
        haversine_km(anchor, instances[a].location)
            .total_cmp(&haversine_km(anchor, instances[b].location))
            .then(a.cmp(&b))
    });
}

fn farthest_from(instances: &[VisitInstance], members: &[usize], center: Coordinates) -> Option<Coordinates> {
    members
        .iter()
        .map(|&m| instances[m].location)
        .max_by(|a, b| haversine_km(center, *a).total_cmp(&haversine_km(center, *b)))
}
