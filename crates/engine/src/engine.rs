//! The experiment engine facade
//!
//! One engine instance per process, constructed from `EngineConfig` and
//! passed by handle to callers. Holds the experiment map, the assignment
//! store, and the metric accumulators; all operations are synchronous
//! and safe under concurrent invocation.

use chrono::Utc;
use dashmap::DashMap;
use experiment_config::EngineConfig;
use experiment_types::{
    Assignment, AssignmentEvent, AssignmentEventKind, ConversionRecord, Experiment,
    ExperimentResult, ExperimentStatus, MetricKind, StopRecommendation, UserContext,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assignment::{bucket_variant, AssignmentKey, AssignmentStore, InsertOutcome};
use crate::decision::{run_test, DecisionEngine};
use crate::errors::{EngineError, Result};
use crate::metric_store::{
    AccumulatorMap, CounterMetricStore, MetricAccumulator, MetricStore,
};
use crate::statistical::SampleSizeCalculator;
use crate::targeting;

/// Experiment assignment and statistical-analysis engine
pub struct ExperimentEngine {
    manager: crate::manager::ExperimentManager,
    assignments: AssignmentStore,
    accumulators: Arc<AccumulatorMap>,
    metric_store: Arc<dyn MetricStore>,
    decision: DecisionEngine,

    baseline_conversion_rate: f64,
    confidence: f64,
    power: f64,
    min_detectable_effect: f64,
    min_sample_size_floor: u64,
    max_duration_secs: u64,
}

impl ExperimentEngine {
    /// Create an engine whose results are computed from its own counters.
    pub fn new(config: &EngineConfig) -> Self {
        let manager = crate::manager::ExperimentManager::new();
        let accumulators: Arc<AccumulatorMap> = Arc::new(DashMap::new());
        let metric_store = Arc::new(CounterMetricStore::new(
            manager.experiments(),
            Arc::clone(&accumulators),
        ));

        Self::build(config, manager, accumulators, metric_store)
    }

    /// Create an engine reading metric data from an injected store
    /// (e.g., the host's analytics backend).
    pub fn with_metric_store(config: &EngineConfig, metric_store: Arc<dyn MetricStore>) -> Self {
        Self::build(
            config,
            crate::manager::ExperimentManager::new(),
            Arc::new(DashMap::new()),
            metric_store,
        )
    }

    fn build(
        config: &EngineConfig,
        manager: crate::manager::ExperimentManager,
        accumulators: Arc<AccumulatorMap>,
        metric_store: Arc<dyn MetricStore>,
    ) -> Self {
        let stats = &config.statistics;

        Self {
            manager,
            assignments: AssignmentStore::new(),
            accumulators,
            metric_store,
            decision: DecisionEngine::new(stats.confidence),
            baseline_conversion_rate: stats.baseline_conversion_rate,
            confidence: stats.confidence,
            power: stats.power,
            min_detectable_effect: stats.min_detectable_effect,
            min_sample_size_floor: stats.min_sample_size,
            max_duration_secs: stats.max_duration_secs,
        }
    }

    /// Validate, compute the minimum sample size, and store an experiment.
    ///
    /// The sample size is computed before anything is stored, so a
    /// failure here never leaves a partial experiment in the map.
    pub fn create_experiment(&self, mut experiment: Experiment) -> Result<Uuid> {
        experiment.min_sample_size = match experiment.schedule.min_sample_size {
            Some(n) => n,
            None => {
                let computed = SampleSizeCalculator::new(
                    self.baseline_conversion_rate,
                    self.min_detectable_effect,
                    self.power,
                    self.confidence,
                )?
                .calculate()?;
                computed.max(self.min_sample_size_floor)
            }
        };

        if experiment.schedule.max_duration_secs.is_none() {
            experiment.schedule.max_duration_secs = Some(self.max_duration_secs);
        }

        let min_sample_size = experiment.min_sample_size;
        let experiment_id = self.manager.create_experiment(experiment)?;

        info!(%experiment_id, min_sample_size, "experiment created");
        Ok(experiment_id)
    }

    pub fn start(&self, experiment_id: &Uuid) -> Result<()> {
        self.manager.start(experiment_id)
    }

    pub fn pause(&self, experiment_id: &Uuid) -> Result<()> {
        self.manager.pause(experiment_id)
    }

    pub fn resume(&self, experiment_id: &Uuid) -> Result<()> {
        self.manager.resume(experiment_id)
    }

    pub fn complete(&self, experiment_id: &Uuid) -> Result<()> {
        self.manager.complete(experiment_id)
    }

    pub fn archive(&self, experiment_id: &Uuid) -> Result<()> {
        self.manager.archive(experiment_id)
    }

    pub fn get_experiment(&self, experiment_id: &Uuid) -> Option<Experiment> {
        self.manager.get(experiment_id)
    }

    pub fn list_experiments(&self) -> Vec<Experiment> {
        self.manager.list()
    }

    pub fn list_active_experiments(&self) -> Vec<Experiment> {
        self.manager.list_active()
    }

    /// Assign a user to a variant.
    ///
    /// Returns the variant id and its opaque config payload, or `None`
    /// when the user is ineligible (a normal outcome, not an error).
    /// Repeated calls return the existing assignment unconditionally.
    pub fn assign_user(
        &self,
        user_id: &str,
        experiment_id: &Uuid,
        context: &UserContext,
    ) -> Result<Option<(Uuid, serde_json::Value)>> {
        let experiment = self.manager.require(experiment_id)?;
        let key = AssignmentKey::new(user_id, *experiment_id);

        // Idempotent read path: an existing assignment wins over any
        // status or targeting change
        if let Some(variant_id) = self.assignments.variant_for(&key) {
            return Ok(self.variant_payload(&experiment, variant_id));
        }

        if experiment.status != ExperimentStatus::Running {
            debug!(%experiment_id, status = ?experiment.status, "assignment refused, not running");
            return Ok(None);
        }

        if !targeting::is_eligible(&experiment.targeting, user_id, context) {
            debug!(user_id, %experiment_id, "user not eligible");
            return Ok(None);
        }

        let variant_id = bucket_variant(&experiment, user_id);
        let assignment = Assignment::new(user_id, *experiment_id, variant_id, context.clone());

        match self.assignments.insert_if_absent(key, assignment) {
            InsertOutcome::Inserted(variant_id) => {
                self.manager.record_assignment(experiment_id, &variant_id)?;
                debug!(user_id, %experiment_id, %variant_id, "user assigned");
                Ok(self.variant_payload(&experiment, variant_id))
            }
            // Lost a race with a concurrent call; the winner's counters
            // were already incremented
            InsertOutcome::Existing(variant_id) => {
                Ok(self.variant_payload(&experiment, variant_id))
            }
        }
    }

    fn variant_payload(
        &self,
        experiment: &Experiment,
        variant_id: Uuid,
    ) -> Option<(Uuid, serde_json::Value)> {
        experiment
            .variant(&variant_id)
            .map(|v| (variant_id, v.config.clone()))
    }

    /// Record an exposure. No-op when the user has no assignment; later
    /// calls after the first are no-ops too. Unknown experiments error.
    pub fn track_exposure(&self, user_id: &str, experiment_id: &Uuid) -> Result<()> {
        self.manager.require(experiment_id)?;
        let key = AssignmentKey::new(user_id, *experiment_id);

        let mut first_exposure = None;
        let found = self.assignments.update(&key, |assignment| {
            if assignment.exposed_at.is_none() {
                let now = Utc::now();
                assignment.exposed_at = Some(now);
                assignment
                    .events
                    .push(AssignmentEvent::new(AssignmentEventKind::Exposure));
                first_exposure = Some(assignment.variant_id);
            }
        });

        if !found {
            debug!(user_id, %experiment_id, "exposure for unassigned user ignored");
            return Ok(());
        }

        if let Some(variant_id) = first_exposure {
            self.manager.record_exposure(experiment_id, &variant_id)?;
        }

        Ok(())
    }

    /// Record a conversion against a metric.
    ///
    /// No-op when the user has no assignment. Every call appends a
    /// conversion record and increments the variant's conversion
    /// counter; revenue metrics additionally accumulate `value`.
    pub fn track_conversion(
        &self,
        user_id: &str,
        experiment_id: &Uuid,
        metric_id: &str,
        value: f64,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let experiment = self.manager.require(experiment_id)?;

        let metric = experiment
            .metrics
            .get(metric_id)
            .ok_or_else(|| EngineError::MetricNotFound(metric_id.to_string()))?;
        let is_revenue = metric.kind == MetricKind::Revenue;

        let key = AssignmentKey::new(user_id, *experiment_id);

        let mut recorded = None;
        let found = self.assignments.update(&key, |assignment| {
            let now = Utc::now();
            let first_for_user = !assignment.has_converted(metric_id);

            if assignment.conversion_time.is_none() {
                assignment.conversion_time = Some(now);
            }

            assignment.conversions.push(ConversionRecord {
                metric_id: metric_id.to_string(),
                value,
                timestamp: now,
                metadata: metadata.clone(),
            });
            assignment.events.push(
                AssignmentEvent::new(AssignmentEventKind::Conversion).with_metadata(metadata.clone()),
            );

            recorded = Some((assignment.variant_id, first_for_user));
        });

        if !found {
            debug!(user_id, %experiment_id, "conversion for unassigned user ignored");
            return Ok(());
        }

        let Some((variant_id, first_for_user)) = recorded else {
            return Ok(());
        };

        self.manager.record_conversion(
            experiment_id,
            &variant_id,
            is_revenue.then_some(value),
        )?;

        self.accumulators
            .entry((*experiment_id, variant_id, metric_id.to_string()))
            .or_insert_with(MetricAccumulator::default)
            .record(value, first_for_user);

        Ok(())
    }

    /// Compute per-variant, per-metric results from the metric store.
    pub fn get_results(&self, experiment_id: &Uuid) -> Result<Vec<ExperimentResult>> {
        let experiment = self.manager.require(experiment_id)?;
        let store = self.metric_store.as_ref();

        let control = experiment.control_variant().ok_or_else(|| {
            EngineError::InvalidConfig("Experiment has no control variant".to_string())
        })?;

        let normal = statrs::distribution::Normal::new(0.0, 1.0)
            .map_err(|e| EngineError::Statistical(e.to_string()))?;
        let alpha = 1.0 - self.confidence;
        let z_crit = statrs::distribution::ContinuousCDF::inverse_cdf(&normal, 1.0 - alpha / 2.0);

        let mut results = Vec::new();
        for metric in experiment.metrics.all() {
            let control_snapshot = store.snapshot(experiment_id, &control.id, &metric.id);

            for variant in &experiment.variants {
                let Some(snapshot) = store.snapshot(experiment_id, &variant.id, &metric.id)
                else {
                    continue;
                };

                // CI around this variant's own mean
                let margin = if snapshot.sample_size > 0 {
                    z_crit * (snapshot.variance / snapshot.sample_size as f64).sqrt()
                } else {
                    0.0
                };

                let mut result = ExperimentResult {
                    experiment_id: *experiment_id,
                    variant_id: variant.id,
                    metric_id: metric.id.clone(),
                    sample_size: snapshot.sample_size,
                    mean: snapshot.mean,
                    variance: snapshot.variance,
                    confidence_interval: (snapshot.mean - margin, snapshot.mean + margin),
                    p_value: None,
                    is_significant: false,
                    is_practical: false,
                    absolute_effect: None,
                    relative_effect: None,
                };

                if !variant.is_control {
                    if let Some(control_snapshot) = control_snapshot {
                        let significance = run_test(
                            metric,
                            control_snapshot.mean,
                            control_snapshot.variance,
                            control_snapshot.sample_size,
                            snapshot.mean,
                            snapshot.variance,
                            snapshot.sample_size,
                            self.confidence,
                        )?;

                        let practical_threshold =
                            self.min_detectable_effect * control_snapshot.mean.abs();
                        result.p_value = Some(significance.p_value);
                        result.is_significant = significance.is_significant;
                        result.is_practical = practical_threshold > 0.0
                            && significance.absolute_effect.abs() >= practical_threshold;
                        result.absolute_effect = Some(significance.absolute_effect);
                        result.relative_effect = significance.relative_effect;
                    }
                }

                results.push(result);
            }
        }

        Ok(results)
    }

    /// Evaluate the stop/continue/ship recommendation.
    pub fn should_stop(&self, experiment_id: &Uuid) -> Result<StopRecommendation> {
        let experiment = self.manager.require(experiment_id)?;

        if experiment.status != ExperimentStatus::Running {
            warn!(%experiment_id, status = ?experiment.status, "stop evaluation on non-running experiment");
        }

        self.decision
            .evaluate(&experiment, self.metric_store.as_ref(), Utc::now())
    }

    /// Number of assignments recorded across all experiments
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }
}
