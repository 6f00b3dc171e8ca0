//! Experiment and variant types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::metrics::MetricSet;
use crate::targeting::Targeting;

/// Lifecycle status of an experiment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Archived,
}

impl ExperimentStatus {
    /// Whether a transition to `next` is allowed by the lifecycle state machine
    pub fn can_transition_to(self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, next),
            (Draft, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Archived)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Archived)
                | (Completed, Archived)
        )
    }
}

/// Running performance counters for a variant
///
/// These counters are the source of truth for result calculation;
/// computed statistics are always derived from them on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantCounters {
    /// Users assigned to this variant
    pub assignments: u64,
    /// First-exposure events recorded
    pub exposures: u64,
    /// Conversion events recorded (every call, multi-conversion model)
    pub conversions: u64,
    /// Accumulated revenue from revenue-metric conversions
    pub revenue: f64,
}

/// A single variant in an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant identifier
    pub id: Uuid,
    /// Variant name (e.g., "control", "variant_a")
    pub name: String,
    /// Whether this is the control variant
    pub is_control: bool,
    /// Traffic allocation fraction (0.0-1.0)
    pub allocation: f64,
    /// Opaque payload returned to the caller on assignment
    /// (feature flags, content overrides, pricing parameters)
    pub config: serde_json::Value,
    /// Running performance counters
    pub counters: VariantCounters,
}

impl Variant {
    /// Create a new treatment variant
    pub fn new(name: impl Into<String>, config: serde_json::Value, allocation: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_control: false,
            allocation: allocation.clamp(0.0, 1.0),
            config,
            counters: VariantCounters::default(),
        }
    }

    /// Create a new control variant
    pub fn control(name: impl Into<String>, config: serde_json::Value, allocation: f64) -> Self {
        Self {
            is_control: true,
            ..Self::new(name, config, allocation)
        }
    }

    /// Conversion rate from the running counters
    pub fn conversion_rate(&self) -> f64 {
        if self.counters.assignments > 0 {
            self.counters.conversions as f64 / self.counters.assignments as f64
        } else {
            0.0
        }
    }
}

/// Scheduling bounds for an experiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Earliest start
    pub start_date: Option<DateTime<Utc>>,
    /// Hard end date; the decision engine forces a stop past this point
    pub end_date: Option<DateTime<Utc>>,
    /// Explicit per-variant minimum sample size; computed from the
    /// statistical defaults when absent
    pub min_sample_size: Option<u64>,
    /// Maximum duration in seconds once started
    pub max_duration_secs: Option<u64>,
}

/// An experiment: variants, targeting, metrics, and schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique experiment identifier
    pub id: Uuid,
    /// Experiment name
    pub name: String,
    /// Current lifecycle status
    pub status: ExperimentStatus,
    /// Variants in declaration order; bucketing walks cumulative allocations
    pub variants: Vec<Variant>,
    /// Inclusion/exclusion rules and traffic allocation
    pub targeting: Targeting,
    /// Primary, secondary, and guardrail metrics
    pub metrics: MetricSet,
    /// Scheduling bounds
    pub schedule: Schedule,
    /// Minimum per-variant sample size, computed at creation
    pub min_sample_size: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the experiment entered `Running`
    pub started_at: Option<DateTime<Utc>>,
    /// When the experiment was completed or archived
    pub ended_at: Option<DateTime<Utc>>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl Experiment {
    /// Create a new draft experiment
    pub fn new(
        name: impl Into<String>,
        variants: Vec<Variant>,
        targeting: Targeting,
        metrics: MetricSet,
        schedule: Schedule,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: ExperimentStatus::Draft,
            variants,
            targeting,
            metrics,
            schedule,
            min_sample_size: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Sum of variant allocations
    pub fn total_allocation(&self) -> f64 {
        self.variants.iter().map(|v| v.allocation).sum()
    }

    /// The control variant, if exactly one is marked
    pub fn control_variant(&self) -> Option<&Variant> {
        let mut controls = self.variants.iter().filter(|v| v.is_control);
        match (controls.next(), controls.next()) {
            (Some(control), None) => Some(control),
            _ => None,
        }
    }

    /// Look up a variant by id
    pub fn variant(&self, variant_id: &Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == *variant_id)
    }

    /// Total assignments across all variants
    pub fn total_assignments(&self) -> u64 {
        self.variants.iter().map(|v| v.counters.assignments).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricDefinition;

    fn two_variants() -> Vec<Variant> {
        vec![
            Variant::control("control", serde_json::json!({}), 0.5),
            Variant::new("variant_a", serde_json::json!({"cta": "Buy now"}), 0.5),
        ]
    }

    #[test]
    fn test_experiment_creation() {
        let experiment = Experiment::new(
            "Checkout CTA",
            two_variants(),
            Targeting::default(),
            MetricSet::new(MetricDefinition::conversion("purchase", "Purchase")),
            Schedule::default(),
        );

        assert_eq!(experiment.status, ExperimentStatus::Draft);
        assert_eq!(experiment.variants.len(), 2);
        assert!(experiment.control_variant().is_some());
        assert_eq!(experiment.total_allocation(), 1.0);
    }

    #[test]
    fn test_status_transitions() {
        use ExperimentStatus::*;

        assert!(Draft.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Archived));

        assert!(!Draft.can_transition_to(Paused));
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Archived.can_transition_to(Running));
    }

    #[test]
    fn test_control_variant_requires_exactly_one() {
        let mut variants = two_variants();
        variants[1].is_control = true;

        let experiment = Experiment::new(
            "Two controls",
            variants,
            Targeting::default(),
            MetricSet::new(MetricDefinition::conversion("purchase", "Purchase")),
            Schedule::default(),
        );

        assert!(experiment.control_variant().is_none());
    }

    #[test]
    fn test_variant_conversion_rate() {
        let mut variant = Variant::new("test", serde_json::json!({}), 0.5);
        variant.counters.assignments = 1000;
        variant.counters.conversions = 250;

        assert_eq!(variant.conversion_rate(), 0.25);

        let empty = Variant::new("empty", serde_json::json!({}), 0.5);
        assert_eq!(empty.conversion_rate(), 0.0);
    }
}
