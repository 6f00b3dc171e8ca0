//! Experiment assignment and statistical-analysis engine
//!
//! Given a user and an experiment context, the engine deterministically
//! buckets the user into a variant, records exposure and conversion
//! events, and computes whether a variant shows a statistically and
//! practically significant effect versus control — driving automated
//! stop/ship decisions.

pub mod assignment;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod hashing;
pub mod manager;
pub mod metric_store;
pub mod statistical;
pub mod targeting;

pub use assignment::{bucket_variant, AssignmentKey, AssignmentStore};
pub use decision::DecisionEngine;
pub use engine::ExperimentEngine;
pub use errors::{EngineError, Result};
pub use hashing::{bucket_hash, traffic_hash, unit_hash};
pub use manager::ExperimentManager;
pub use metric_store::{CounterMetricStore, MetricSnapshot, MetricStore};
pub use statistical::{
    MeanDifferenceTest, SampleSizeCalculator, Significance, TwoProportionTest,
};
pub use targeting::is_eligible;
