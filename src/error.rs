//! Planner errors.
//!
//! Only structurally invalid input is an error. Capacity, gap and time-window
//! problems degrade the plan and are reported through `Statistics`.

use thiserror::Error;

use crate::model::StoreId;

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("store {store_id} has malformed coordinates ({lat}, {lng})")]
    MalformedCoordinates { store_id: StoreId, lat: f64, lng: f64 },

    #[error("store {store_id} has invalid frequency {frequency}")]
    InvalidFrequency { store_id: StoreId, frequency: f64 },

    #[error("duplicate store id {0}")]
    DuplicateStore(StoreId),

    #[error("no store reaches the minimum visit frequency {threshold}")]
    NoSchedulableFrequency { threshold: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from the collaborator-driven entry point.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("store data source failed: {0}")]
    DataSource(#[source] Box<dyn std::error::Error + Send + Sync>),
}
