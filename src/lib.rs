//! visit-planner
//!
//! Monthly field-visit scheduling: expands stores into visit occurrences,
//! clusters them geographically, packs them onto working days, sequences
//! each day's route and reconciles the result into a [`Plan`].

pub mod calendar;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod error;
pub mod expander;
pub mod gap;
pub mod geo;
pub mod invariants;
pub mod model;
pub mod pipeline;
pub mod scheduler;
pub mod sequencer;
pub mod stats;
pub mod traits;

pub use config::{ClusteringStrategy, PackingStrategy, PlannerConfig};
pub use error::{InputError, PlanError};
pub use model::{BreakKind, Plan, ScheduledVisit, Store, StoreId, VisitInstance, WorkingDay};
pub use pipeline::{optimize, optimize_with_fillers, plan_month};
