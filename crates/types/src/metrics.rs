//! Metric definitions for experiments

use serde::{Deserialize, Serialize};

/// Kind of metric being measured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Conversion,
    Revenue,
    Count,
    Duration,
    Ratio,
}

/// How raw conversion values aggregate into a per-user statistic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Sum,
    Average,
    Count,
}

/// Which direction the metric should move for a treatment to win
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalDirection {
    Increase,
    Decrease,
    Maintain,
}

/// Statistical test applied when comparing a treatment to control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceMethod {
    /// Two-proportion z-test on conversion rates
    TwoProportionZ,
    /// Unpooled z-test on means, using per-variant variances
    MeanZ,
}

/// Definition of a metric tracked by an experiment
///
/// Immutable once referenced by a running experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Stable metric identifier used in tracking calls
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Metric kind
    pub kind: MetricKind,
    /// Aggregation method
    pub aggregation: AggregationMethod,
    /// Goal direction
    pub goal: GoalDirection,
    /// Statistical test to apply
    pub method: SignificanceMethod,
}

impl MetricDefinition {
    /// A binary conversion metric (did the user convert at least once)
    pub fn conversion(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: MetricKind::Conversion,
            aggregation: AggregationMethod::Count,
            goal: GoalDirection::Increase,
            method: SignificanceMethod::TwoProportionZ,
        }
    }

    /// A revenue metric (per-user revenue totals)
    pub fn revenue(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: MetricKind::Revenue,
            aggregation: AggregationMethod::Sum,
            goal: GoalDirection::Increase,
            method: SignificanceMethod::MeanZ,
        }
    }

    /// A duration metric where lower is better
    pub fn duration(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: MetricKind::Duration,
            aggregation: AggregationMethod::Average,
            goal: GoalDirection::Decrease,
            method: SignificanceMethod::MeanZ,
        }
    }

    pub fn with_goal(mut self, goal: GoalDirection) -> Self {
        self.goal = goal;
        self
    }
}

/// The metrics tracked by one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSet {
    /// The metric the stop decision is based on
    pub primary: MetricDefinition,
    /// Additional metrics reported but not decisive
    pub secondary: Vec<MetricDefinition>,
    /// Metrics that must not regress
    pub guardrail: Vec<MetricDefinition>,
}

impl MetricSet {
    pub fn new(primary: MetricDefinition) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
            guardrail: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, metric: MetricDefinition) -> Self {
        self.secondary.push(metric);
        self
    }

    pub fn with_guardrail(mut self, metric: MetricDefinition) -> Self {
        self.guardrail.push(metric);
        self
    }

    /// All metrics in reporting order: primary, secondary, guardrail
    pub fn all(&self) -> impl Iterator<Item = &MetricDefinition> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .chain(self.guardrail.iter())
    }

    /// Look up a metric by id
    pub fn get(&self, metric_id: &str) -> Option<&MetricDefinition> {
        self.all().find(|m| m.id == metric_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_constructors() {
        let purchase = MetricDefinition::conversion("purchase", "Purchase");
        assert_eq!(purchase.kind, MetricKind::Conversion);
        assert_eq!(purchase.method, SignificanceMethod::TwoProportionZ);
        assert_eq!(purchase.goal, GoalDirection::Increase);

        let revenue = MetricDefinition::revenue("arpu", "Revenue per user");
        assert_eq!(revenue.kind, MetricKind::Revenue);
        assert_eq!(revenue.method, SignificanceMethod::MeanZ);

        let latency = MetricDefinition::duration("ttfp", "Time to first purchase");
        assert_eq!(latency.goal, GoalDirection::Decrease);
    }

    #[test]
    fn test_metric_set_lookup() {
        let set = MetricSet::new(MetricDefinition::conversion("purchase", "Purchase"))
            .with_secondary(MetricDefinition::revenue("arpu", "Revenue"))
            .with_guardrail(
                MetricDefinition::conversion("churn", "Churn").with_goal(GoalDirection::Maintain),
            );

        assert_eq!(set.all().count(), 3);
        assert!(set.get("arpu").is_some());
        assert!(set.get("unknown").is_none());
        assert_eq!(set.get("churn").unwrap().goal, GoalDirection::Maintain);
    }
}
