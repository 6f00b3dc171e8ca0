//! Experiment lifecycle management
//!
//! Owns the experiment map: creation with invariant validation, status
//! transitions, and per-variant counter updates.

use chrono::Utc;
use dashmap::DashMap;
use experiment_types::{Experiment, ExperimentStatus};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::errors::{EngineError, Result};

/// Tolerance on the variant allocation sum
pub const ALLOCATION_TOLERANCE: f64 = 0.001;

/// Experiment lifecycle manager
pub struct ExperimentManager {
    experiments: Arc<DashMap<Uuid, Experiment>>,
}

impl ExperimentManager {
    pub fn new() -> Self {
        Self {
            experiments: Arc::new(DashMap::new()),
        }
    }

    /// Shared handle to the experiment map, for the counter-backed
    /// metric store
    pub fn experiments(&self) -> Arc<DashMap<Uuid, Experiment>> {
        Arc::clone(&self.experiments)
    }

    /// Validate invariants and store a new experiment.
    ///
    /// The experiment is never stored when validation fails.
    pub fn create_experiment(&self, experiment: Experiment) -> Result<Uuid> {
        Self::validate(&experiment)?;

        let experiment_id = experiment.id;
        if self.experiments.contains_key(&experiment_id) {
            return Err(EngineError::InvalidConfig(format!(
                "Experiment {} already exists",
                experiment_id
            )));
        }

        info!(%experiment_id, name = %experiment.name, "created experiment");
        self.experiments.insert(experiment_id, experiment);

        Ok(experiment_id)
    }

    fn validate(experiment: &Experiment) -> Result<()> {
        if experiment.id.is_nil() {
            return Err(EngineError::InvalidConfig(
                "Experiment id must not be nil".to_string(),
            ));
        }

        if experiment.name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "Experiment name must not be empty".to_string(),
            ));
        }

        if experiment.variants.len() < 2 {
            return Err(EngineError::InvalidConfig(
                "Experiment must have at least 2 variants".to_string(),
            ));
        }

        let controls = experiment.variants.iter().filter(|v| v.is_control).count();
        if controls != 1 {
            return Err(EngineError::InvalidConfig(format!(
                "Experiment must have exactly one control variant, found {}",
                controls
            )));
        }

        let total = experiment.total_allocation();
        if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
            return Err(EngineError::InvalidConfig(format!(
                "Variant allocations must sum to 1.0, got {}",
                total
            )));
        }

        let allocation = &experiment.targeting.traffic_allocation;
        if !(0.0..=1.0).contains(allocation) {
            return Err(EngineError::InvalidConfig(format!(
                "Traffic allocation must be within [0, 1], got {}",
                allocation
            )));
        }

        Ok(())
    }

    fn transition(&self, experiment_id: &Uuid, next: ExperimentStatus) -> Result<()> {
        let mut experiment = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;

        if !experiment.status.can_transition_to(next) {
            return Err(EngineError::InvalidState(format!(
                "Cannot transition experiment from {:?} to {:?}",
                experiment.status, next
            )));
        }

        info!(%experiment_id, from = ?experiment.status, to = ?next, "experiment status change");

        match next {
            ExperimentStatus::Running if experiment.started_at.is_none() => {
                experiment.started_at = Some(Utc::now());
            }
            ExperimentStatus::Completed | ExperimentStatus::Archived => {
                experiment.ended_at = Some(Utc::now());
            }
            _ => {}
        }

        experiment.status = next;
        Ok(())
    }

    pub fn start(&self, experiment_id: &Uuid) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Running)
    }

    pub fn pause(&self, experiment_id: &Uuid) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Paused)
    }

    pub fn resume(&self, experiment_id: &Uuid) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Running)
    }

    pub fn complete(&self, experiment_id: &Uuid) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Completed)
    }

    pub fn archive(&self, experiment_id: &Uuid) -> Result<()> {
        self.transition(experiment_id, ExperimentStatus::Archived)
    }

    pub fn get(&self, experiment_id: &Uuid) -> Option<Experiment> {
        self.experiments.get(experiment_id).map(|e| e.clone())
    }

    pub fn require(&self, experiment_id: &Uuid) -> Result<Experiment> {
        self.get(experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))
    }

    pub fn list(&self) -> Vec<Experiment> {
        self.experiments.iter().map(|e| e.value().clone()).collect()
    }

    pub fn list_active(&self) -> Vec<Experiment> {
        self.experiments
            .iter()
            .filter(|e| e.status == ExperimentStatus::Running)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Increment the variant's assignment counter exactly once
    pub fn record_assignment(&self, experiment_id: &Uuid, variant_id: &Uuid) -> Result<()> {
        self.with_variant_counters(experiment_id, variant_id, |counters| {
            counters.assignments += 1;
        })
    }

    pub fn record_exposure(&self, experiment_id: &Uuid, variant_id: &Uuid) -> Result<()> {
        self.with_variant_counters(experiment_id, variant_id, |counters| {
            counters.exposures += 1;
        })
    }

    /// Increment the conversion counter; revenue-metric conversions also
    /// accumulate their value
    pub fn record_conversion(
        &self,
        experiment_id: &Uuid,
        variant_id: &Uuid,
        revenue: Option<f64>,
    ) -> Result<()> {
        self.with_variant_counters(experiment_id, variant_id, |counters| {
            counters.conversions += 1;
            if let Some(value) = revenue {
                counters.revenue += value;
            }
        })
    }

    fn with_variant_counters<F>(
        &self,
        experiment_id: &Uuid,
        variant_id: &Uuid,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut experiment_types::VariantCounters),
    {
        let mut experiment = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;

        let variant = experiment
            .variants
            .iter_mut()
            .find(|v| v.id == *variant_id)
            .ok_or_else(|| EngineError::VariantNotFound(variant_id.to_string()))?;

        f(&mut variant.counters);
        Ok(())
    }
}

impl Default for ExperimentManager {
    fn default() -> Self {
        Self::new()
    }
}
