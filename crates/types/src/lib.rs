//! Core types and data models for the experiment engine
//!
//! This crate provides the fundamental data structures used throughout
//! the experiment engine: experiments, variants, targeting rules,
//! metric definitions, assignments, and computed results.

pub mod assignments;
pub mod experiments;
pub mod metrics;
pub mod results;
pub mod targeting;

pub use assignments::{Assignment, AssignmentEvent, AssignmentEventKind, ConversionRecord};
pub use experiments::{Experiment, ExperimentStatus, Schedule, Variant, VariantCounters};
pub use metrics::{
    AggregationMethod, GoalDirection, MetricDefinition, MetricKind, MetricSet, SignificanceMethod,
};
pub use results::{ExperimentResult, StopDecision, StopRecommendation};
pub use targeting::{RuleOperator, Targeting, TargetingRule, UserContext};
