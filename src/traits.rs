//! Boundary traits for the planner's collaborators.
//!
//! The core never performs I/O. Apps implement these for their own data
//! stores and calendars.

use crate::geo::Coordinates;
use crate::model::{Store, WorkingDay};

/// Supplies the month's stores. Queried once per run, before optimization.
pub trait StoreDataSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn load_stores(&self) -> Result<Vec<Store>, Self::Error>;

    /// Lower-priority stores usable to back-fill under-filled days.
    fn load_filler_candidates(&self) -> Result<Vec<Store>, Self::Error> {
        Ok(Vec::new())
    }
}

/// Builds the working-day slots of a month.
pub trait CalendarBuilder {
    fn working_days(&self, year: i32, month: u32) -> Vec<WorkingDay>;
}

/// Provides a distance matrix (kilometers) for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Coordinates]) -> Vec<Vec<f64>>;
}
