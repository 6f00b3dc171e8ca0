//! Metric store: the collaborator supplying aggregated metric data
//!
//! Result calculation reads (sample size, mean, variance) per
//! (experiment, variant, metric) through the `MetricStore` trait. The
//! default implementation aggregates the engine's own counters and
//! conversion values; hosts with an analytics backend inject their own.

use dashmap::DashMap;
use experiment_types::{Experiment, MetricKind};
use std::sync::Arc;
use uuid::Uuid;

/// Aggregated data for one (experiment, variant, metric) triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSnapshot {
    /// Per-variant sample size
    pub sample_size: u64,
    /// Sample mean (conversion rate for proportion metrics)
    pub mean: f64,
    /// Sample variance
    pub variance: f64,
}

/// Read interface into aggregated metric data
pub trait MetricStore: Send + Sync {
    /// None when the triple is unknown or has no data yet
    fn snapshot(
        &self,
        experiment_id: &Uuid,
        variant_id: &Uuid,
        metric_id: &str,
    ) -> Option<MetricSnapshot>;
}

/// Running aggregate of conversion values for one triple
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricAccumulator {
    /// Conversion events recorded
    pub count: u64,
    /// Users with at least one conversion
    pub unique_converters: u64,
    /// Sum of conversion values
    pub sum: f64,
    /// Sum of squared conversion values
    pub sum_sq: f64,
}

impl MetricAccumulator {
    pub fn record(&mut self, value: f64, first_for_user: bool) {
        self.count += 1;
        if first_for_user {
            self.unique_converters += 1;
        }
        self.sum += value;
        self.sum_sq += value * value;
    }
}

pub(crate) type AccumulatorKey = (Uuid, Uuid, String);
pub(crate) type AccumulatorMap = DashMap<AccumulatorKey, MetricAccumulator>;

/// Metric store backed by the engine's own counters and accumulators
///
/// Conversion metrics are Bernoulli over assigned users: successes are
/// unique converting users, so the multi-conversion model cannot push a
/// rate above 1.0. Value metrics report per-user totals over the
/// assigned population, with non-converters contributing zero.
pub struct CounterMetricStore {
    experiments: Arc<DashMap<Uuid, Experiment>>,
    accumulators: Arc<AccumulatorMap>,
}

impl CounterMetricStore {
    pub(crate) fn new(
        experiments: Arc<DashMap<Uuid, Experiment>>,
        accumulators: Arc<AccumulatorMap>,
    ) -> Self {
        Self {
            experiments,
            accumulators,
        }
    }
}

impl MetricStore for CounterMetricStore {
    fn snapshot(
        &self,
        experiment_id: &Uuid,
        variant_id: &Uuid,
        metric_id: &str,
    ) -> Option<MetricSnapshot> {
        let experiment = self.experiments.get(experiment_id)?;
        let variant = experiment.variant(variant_id)?;
        let metric = experiment.metrics.get(metric_id)?;

        let sample_size = variant.counters.assignments;
        if sample_size == 0 {
            return Some(MetricSnapshot {
                sample_size: 0,
                mean: 0.0,
                variance: 0.0,
            });
        }

        let key = (*experiment_id, *variant_id, metric_id.to_string());
        let acc = self
            .accumulators
            .get(&key)
            .map(|a| *a)
            .unwrap_or_default();

        let n = sample_size as f64;
        let snapshot = match metric.kind {
            MetricKind::Conversion => {
                let rate = acc.unique_converters as f64 / n;
                MetricSnapshot {
                    sample_size,
                    mean: rate,
                    variance: rate * (1.0 - rate),
                }
            }
            MetricKind::Revenue
            | MetricKind::Count
            | MetricKind::Duration
            | MetricKind::Ratio => {
                // Per-user totals; users without conversions count as zero
                let mean = acc.sum / n;
                let variance = (acc.sum_sq / n - mean * mean).max(0.0);
                MetricSnapshot {
                    sample_size,
                    mean,
                    variance,
                }
            }
        };

        Some(snapshot)
    }
}
