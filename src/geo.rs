//! Great-circle geometry and the travel-time model.
//!
//! Travel time is a fixed linear function of haversine distance. Very short
//! hops between co-located stores (same mall or building) use a slower
//! walking rate instead of the driving rate.

use serde::{Deserialize, Serialize};

use crate::traits::DistanceMatrixProvider;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Calculate haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Arithmetic mean of a set of points. Good enough at city scale.
pub fn centroid<I>(points: I) -> Option<Coordinates>
where
    I: IntoIterator<Item = Coordinates>,
{
    let mut count = 0usize;
    let mut lat = 0.0;
    let mut lng = 0.0;
    for point in points {
        lat += point.lat;
        lng += point.lng;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(Coordinates::new(lat / count as f64, lng / count as f64))
}

/// Linear travel-time model.
#[derive(Debug, Clone, Copy)]
pub struct TravelModel {
    pub driving_minutes_per_km: f64,
    pub walking_minutes_per_km: f64,
    /// Hops shorter than this are walked.
    pub co_located_threshold_km: f64,
}

impl TravelModel {
    /// Travel minutes for a hop of `km`, rounded to the nearest minute.
    pub fn minutes_for(&self, km: f64) -> u32 {
        let rate = if km < self.co_located_threshold_km {
            self.walking_minutes_per_km
        } else {
            self.driving_minutes_per_km
        };
        (km * rate).round().max(0.0) as u32
    }
}

/// Haversine-based distance matrix provider.
///
/// Entries are great-circle kilometers; the diagonal is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineMatrix;

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[Coordinates]) -> Vec<Vec<f64>> {
        let n = locations.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate().skip(i + 1) {
                let km = haversine_km(*from, *to);
                matrix[i][j] = km;
                matrix[j][i] = km;
            }
        }

        matrix
    }
}
