//! OntoAgg Core - Aggregation engine for smart-home observations in an RDF store
//!
//! Raw state observations are condensed into statistical summaries per
//! day, and those summaries are re-aggregated per week, month and year:
//!
//! - **Discrete** states (ON, OFF, OPEN, ...): occurrences and active time per value
//! - **Continuous** states (temperature, brightness, ...): mean, variance, deviation
//!
//! Every summary is weighted by the share of the window its unit was connected.
//!
//! # Architecture
//!
//! - **Store**: SPARQL query/update endpoint behind the [`store::TripleStore`] trait
//! - **Provider**: reads observations and connection phases into a [`model::UnitIndex`]
//! - **Aggregation**: carry-over filter, service dispatch and statistics engines
//! - **Scheduler**: daily tick, window bounds, parallel group computation, write and cleanup

pub mod aggregation;
pub mod config;
pub mod model;
pub mod ontology;
pub mod provider;
pub mod scheduler;
pub mod store;

mod error;
mod types;

pub use error::{partition_results, AggregationError, ErrorCollection, Result};
pub use types::*;

/// OntoAgg version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
