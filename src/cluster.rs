//! Geographic clustering of visit instances.
//!
//! Two strategies share the [`Clusterer`] seam: a fixed lat/lng grid for
//! coarse area grouping and k-means with deterministic farthest-point
//! seeding for day-sized groups. Whatever the strategy returns is checked
//! by [`verify_partition`] so every instance lands in exactly one cluster.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{ClusteringStrategy, PlannerConfig};
use crate::geo::{Coordinates, centroid, haversine_km};

/// Kilometers per degree of latitude.
const KM_PER_DEGREE: f64 = 111.32;

/// Upper bound on radius-driven bisections per cluster.
const MAX_BISECTION_DEPTH: usize = 8;

/// A transient group of instance indices with its centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub members: Vec<usize>,
    pub centroid: Coordinates,
}

impl Cluster {
    fn from_members(members: Vec<usize>, points: &[Coordinates]) -> Option<Self> {
        let centroid = centroid(members.iter().map(|&i| points[i]))?;
        Some(Self { members, centroid })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A clustering strategy. Returns groups of indices into `points`.
///
/// Implementations may return overlapping or incomplete groups; callers
/// repair them with [`verify_partition`].
pub trait Clusterer {
    fn group(&self, points: &[Coordinates]) -> Vec<Vec<usize>>;
}

/// Buckets points into square-ish cells of `cell_km`.
#[derive(Debug, Clone, Copy)]
pub struct GridClusterer {
    pub cell_km: f64,
}

impl GridClusterer {
    fn cell_of(&self, point: Coordinates, reference_lat: f64) -> (i64, i64) {
        let lat_step = self.cell_km / KM_PER_DEGREE;
        let lng_step = self.cell_km / (KM_PER_DEGREE * reference_lat.to_radians().cos().max(0.01));
        (
            (point.lat / lat_step).floor() as i64,
            (point.lng / lng_step).floor() as i64,
        )
    }
}

impl Clusterer for GridClusterer {
    fn group(&self, points: &[Coordinates]) -> Vec<Vec<usize>> {
        let Some(reference) = centroid(points.iter().copied()) else {
            return Vec::new();
        };

        let mut cells: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
        for (i, point) in points.iter().enumerate() {
            cells.entry(self.cell_of(*point, reference.lat)).or_default().push(i);
        }
        cells.into_values().collect()
    }
}

/// Lloyd's k-means under haversine distance with a fixed iteration cap.
#[derive(Debug, Clone, Copy)]
pub struct KMeansClusterer {
    pub k: usize,
    pub max_iterations: usize,
}

impl KMeansClusterer {
    /// Farthest-point seeding: first the point farthest from the mean, then
    /// repeatedly the point with the largest distance to its nearest center.
    fn seed(&self, points: &[Coordinates], k: usize) -> Vec<Coordinates> {
        let mut centers = Vec::with_capacity(k);
        let Some(mean) = centroid(points.iter().copied()) else {
            return centers;
        };

        let first = argmax(points.iter().map(|p| haversine_km(*p, mean)));
        centers.push(points[first]);

        let mut nearest: Vec<f64> = points.iter().map(|p| haversine_km(*p, points[first])).collect();
        while centers.len() < k {
            let next = argmax(nearest.iter().copied());
            if nearest[next] <= 0.0 {
                break;
            }
            let center = points[next];
            centers.push(center);
            for (i, p) in points.iter().enumerate() {
                nearest[i] = nearest[i].min(haversine_km(*p, center));
            }
        }
        centers
    }
}

impl Clusterer for KMeansClusterer {
    fn group(&self, points: &[Coordinates]) -> Vec<Vec<usize>> {
        if points.is_empty() || self.k == 0 {
            return Vec::new();
        }

        let mut centers = self.seed(points, self.k.min(points.len()));
        let mut assignments = vec![usize::MAX; points.len()];

        for _ in 0..self.max_iterations.max(1) {
            let mut changed = false;
            for (i, p) in points.iter().enumerate() {
                let best = nearest_center(*p, &centers);
                if assignments[i] != best {
                    assignments[i] = best;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            for (c, center) in centers.iter_mut().enumerate() {
                let members = points
                    .iter()
                    .zip(&assignments)
                    .filter(|(_, a)| **a == c)
                    .map(|(p, _)| *p);
                // empty clusters keep their previous center
                if let Some(updated) = centroid(members) {
                    *center = updated;
                }
            }
        }

        let mut groups = vec![Vec::new(); centers.len()];
        for (i, a) in assignments.into_iter().enumerate() {
            groups[a].push(i);
        }
        groups.retain(|g| !g.is_empty());
        groups
    }
}

fn nearest_center(point: Coordinates, centers: &[Coordinates]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (j, center) in centers.iter().enumerate() {
        let dist = haversine_km(point, *center);
        if dist < best_dist {
            best_dist = dist;
            best = j;
        }
    }
    best
}

/// Index of the first maximum.
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best_value = v;
            best = i;
        }
    }
    best
}

/// Number of k-means clusters for `instances` visits over `days` days.
pub fn choose_k(instances: usize, target_per_day: usize, days: usize) -> usize {
    if instances == 0 {
        return 0;
    }
    let wanted = instances.div_ceil(target_per_day.max(1));
    wanted.clamp(1, days.max(1)).min(instances)
}

/// Rebuild clusters from a deduplicated member set.
///
/// Members listed more than once stay only in the first cluster that lists
/// them; indices missing from every cluster join the cluster with the nearest
/// centroid. Empty clusters are dropped and centroids recomputed.
pub fn verify_partition(groups: Vec<Vec<usize>>, points: &[Coordinates]) -> Vec<Cluster> {
    let mut seen = vec![false; points.len()];
    let mut deduped: Vec<Vec<usize>> = Vec::with_capacity(groups.len());
    let mut duplicates = 0usize;

    for group in groups {
        let mut members = Vec::with_capacity(group.len());
        for i in group {
            if i >= points.len() {
                continue;
            }
            if seen[i] {
                duplicates += 1;
                continue;
            }
            seen[i] = true;
            members.push(i);
        }
        if !members.is_empty() {
            deduped.push(members);
        }
    }

    let missing: Vec<usize> = (0..points.len()).filter(|&i| !seen[i]).collect();
    if duplicates > 0 || !missing.is_empty() {
        debug!(duplicates, missing = missing.len(), "repairing cluster partition");
    }

    for i in missing {
        let centroids: Vec<Coordinates> = deduped
            .iter()
            .filter_map(|g| centroid(g.iter().map(|&m| points[m])))
            .collect();
        if centroids.is_empty() {
            deduped.push(vec![i]);
        } else {
            let target = nearest_center(points[i], &centroids);
            deduped[target].push(i);
        }
    }

    deduped
        .into_iter()
        .filter_map(|members| Cluster::from_members(members, points))
        .collect()
}

/// Bisect clusters whose members stray beyond `radius_km` from the centroid.
fn enforce_radius(cluster: Cluster, points: &[Coordinates], radius_km: f64, depth: usize) -> Vec<Cluster> {
    let within = cluster
        .members
        .iter()
        .all(|&i| haversine_km(points[i], cluster.centroid) <= radius_km);
    if within || cluster.len() < 2 || depth >= MAX_BISECTION_DEPTH {
        return vec![cluster];
    }

    let local: Vec<Coordinates> = cluster.members.iter().map(|&i| points[i]).collect();
    let halves = KMeansClusterer { k: 2, max_iterations: 20 }.group(&local);
    if halves.len() < 2 {
        return vec![cluster];
    }

    halves
        .into_iter()
        .map(|half| half.into_iter().map(|l| cluster.members[l]).collect::<Vec<_>>())
        .filter_map(|members| Cluster::from_members(members, points))
        .flat_map(|c| enforce_radius(c, points, radius_km, depth + 1))
        .collect()
}

/// Configured clustering entry point.
pub struct GeographicClusterer<'a> {
    config: &'a PlannerConfig,
    days: usize,
}

impl<'a> GeographicClusterer<'a> {
    pub fn new(config: &'a PlannerConfig, days: usize) -> Self {
        Self { config, days }
    }

    pub fn cluster(&self, points: &[Coordinates]) -> Vec<Cluster> {
        if points.is_empty() {
            return Vec::new();
        }

        let groups = match self.config.clustering_strategy {
            ClusteringStrategy::Grid => GridClusterer {
                cell_km: self.config.grid_cell_km,
            }
            .group(points),
            ClusteringStrategy::Kmeans => KMeansClusterer {
                k: choose_k(points.len(), self.config.max_stores_per_day, self.days),
                max_iterations: self.config.kmeans_max_iterations,
            }
            .group(points),
        };

        let clusters: Vec<Cluster> = verify_partition(groups, points)
            .into_iter()
            .flat_map(|c| enforce_radius(c, points, self.config.max_cluster_radius_km, 0))
            .collect();

        debug!(
            strategy = ?self.config.clustering_strategy,
            points = points.len(),
            clusters = clusters.len(),
            "clustered visit instances"
        );
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Coordinates> {
        let mut points = Vec::new();
        for i in 0..10 {
            points.push(Coordinates::new(3.10 + i as f64 * 0.001, 101.60));
            points.push(Coordinates::new(3.40 + i as f64 * 0.001, 101.90));
        }
        points
    }

    fn assert_partition(clusters: &[Cluster], n: usize) {
        let mut all: Vec<usize> = clusters.iter().flat_map(|c| c.members.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let points = two_blobs();
        let groups = KMeansClusterer { k: 2, max_iterations: 50 }.group(&points);
        assert_eq!(groups.len(), 2);
        for group in &groups {
            let first_lat = points[group[0]].lat;
            assert!(group.iter().all(|&i| (points[i].lat - first_lat).abs() < 0.05));
        }
    }

    #[test]
    fn test_seeding_takes_farthest_points() {
        let points = vec![
            Coordinates::new(0.0, 0.0),
            Coordinates::new(0.0, 0.01),
            Coordinates::new(0.0, 0.02),
            Coordinates::new(0.0, 1.0),
        ];
        let clusterer = KMeansClusterer { k: 2, max_iterations: 50 };
        let centers = clusterer.seed(&points, 2);
        assert_eq!(centers, vec![points[3], points[0]]);
        assert_eq!(clusterer.seed(&points, 2), centers);
    }

    #[test]
    fn test_kmeans_identical_points_single_group() {
        let points = vec![Coordinates::new(1.0, 1.0); 5];
        let groups = KMeansClusterer { k: 3, max_iterations: 50 }.group(&points);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 5);
    }

    #[test]
    fn test_grid_buckets_by_cell() {
        let points = two_blobs();
        let groups = GridClusterer { cell_km: 5.0 }.group(&points);
        assert!(groups.len() >= 2);
        let clusters = verify_partition(groups, &points);
        assert_partition(&clusters, points.len());
    }

    #[test]
    fn test_verify_partition_repairs_duplicates_and_gaps() {
        let points = two_blobs();
        // 0 listed twice, 19 missing
        let groups = vec![vec![0, 1, 2], (0..19).collect()];
        let clusters = verify_partition(groups, &points);
        assert_partition(&clusters, points.len());
    }

    #[test]
    fn test_choose_k_bounds() {
        assert_eq!(choose_k(0, 10, 20), 0);
        assert_eq!(choose_k(45, 15, 20), 3);
        assert_eq!(choose_k(500, 15, 20), 20);
        assert_eq!(choose_k(3, 15, 0), 1);
    }

    #[test]
    fn test_clusterer_respects_radius() {
        let config = PlannerConfig {
            max_cluster_radius_km: 2.0,
            ..PlannerConfig::default()
        };
        let points = two_blobs();
        let clusters = GeographicClusterer::new(&config, 1).cluster(&points);
        assert_partition(&clusters, points.len());
        assert!(clusters.len() >= 2);
    }
}
