//! # Flight Analytics
//!
//! Delay-gain modeling over the airline on-time performance tables.
//! DuckDB is the compute engine: datasets are built as lazy query plans and
//! only aggregates, samples and the exported rollup are materialized.
//!
//! ## Pipeline
//!
//! - Cache the `flights` table in engine memory
//! - Build training and scoring datasets (filters, carrier corrections, airline join, gain)
//! - Split the training data into seeded `train`/`valid` subsets
//! - Fit `gain ~ distance + depdelay + uniquecarrier` by least squares
//! - Summarize predictions by decile and by airline
//! - Persist a route rollup and export the dashboard bundle

#![forbid(unsafe_code)]
#![warn(clippy::all, missing_docs)]

pub mod config;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod ingest;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod plan;
pub mod reports;
pub mod rows;
pub mod session;

pub use config::PipelineConfig;
pub use error::{AnalyticsError, Result, StageContext};
pub use evaluate::Evaluator;
pub use features::FeaturePipeline;
pub use model::{FittedModel, LinearRegression, ModelFormula};
pub use partition::{Partitioner, Partitions};
pub use pipeline::{FlightPipeline, PipelineOutcome};
pub use plan::{Expr, QueryPlan};
pub use reports::DashboardBundle;
pub use session::{Session, SessionConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
