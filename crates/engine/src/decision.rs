//! Stop/continue/ship decision logic
//!
//! Evaluated on demand for a running experiment: expiry forces a stop,
//! insufficient data defers, and otherwise the primary metric's
//! per-treatment significance against control drives the recommendation.

use chrono::{DateTime, Duration, Utc};
use experiment_types::{
    Experiment, GoalDirection, MetricDefinition, SignificanceMethod, StopDecision,
    StopRecommendation,
};
use tracing::debug;
use uuid::Uuid;

use crate::errors::Result;
use crate::metric_store::MetricStore;
use crate::statistical::{MeanDifferenceTest, Significance, TwoProportionTest};

/// A treatment's significance against control on the primary metric
struct TreatmentComparison {
    variant_id: Uuid,
    significance: Significance,
}

pub struct DecisionEngine {
    confidence_threshold: f64,
}

impl DecisionEngine {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Produce a stop recommendation for the experiment as of `now`.
    pub fn evaluate(
        &self,
        experiment: &Experiment,
        store: &dyn MetricStore,
        now: DateTime<Utc>,
    ) -> Result<StopRecommendation> {
        let expired = self.is_expired(experiment, now);

        let total_assignments = experiment.total_assignments();
        if total_assignments < experiment.min_sample_size && !expired {
            debug!(
                experiment_id = %experiment.id,
                total_assignments,
                min_sample_size = experiment.min_sample_size,
                "below minimum sample size"
            );
            return Ok(StopRecommendation::new(
                experiment.id,
                StopDecision::NeedMoreData,
                format!(
                    "{} of {} required assignments collected",
                    total_assignments, experiment.min_sample_size
                ),
            ));
        }

        let comparisons = self.compare_treatments(experiment, store)?;

        // Significant treatments ranked by |absolute effect| descending,
        // ties broken by lowest variant id
        let mut significant: Vec<&TreatmentComparison> = comparisons
            .iter()
            .filter(|c| c.significance.is_significant)
            .collect();
        significant.sort_by(|a, b| {
            b.significance
                .absolute_effect
                .abs()
                .partial_cmp(&a.significance.absolute_effect.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.variant_id.cmp(&b.variant_id))
        });

        let goal = experiment.metrics.primary.goal;
        let best_favorable = significant
            .iter()
            .find(|c| is_favorable(goal, c.significance.absolute_effect));

        if let Some(winner) = best_favorable {
            let mut rec = StopRecommendation::new(
                experiment.id,
                StopDecision::StopWinner,
                format!(
                    "Variant shows a significant favorable effect on {}",
                    experiment.metrics.primary.id
                ),
            );
            rec.winner_variant_id = Some(winner.variant_id);
            rec.p_value = Some(winner.significance.p_value);
            rec.confidence = Some(winner.significance.confidence);
            rec.effect = Some(winner.significance.absolute_effect);
            return Ok(rec);
        }

        if let Some(unfavorable) = significant.first() {
            // Significant movement in the wrong direction: stop, keep control
            let mut rec = StopRecommendation::new(
                experiment.id,
                StopDecision::StopNoEffect,
                format!(
                    "Significant but unfavorable effect on {}; deploy control",
                    experiment.metrics.primary.id
                ),
            );
            rec.p_value = Some(unfavorable.significance.p_value);
            rec.confidence = Some(unfavorable.significance.confidence);
            rec.effect = Some(unfavorable.significance.absolute_effect);
            return Ok(rec);
        }

        if expired {
            return Ok(StopRecommendation::new(
                experiment.id,
                StopDecision::StopNoEffect,
                "Experiment expired without a significant effect; deploy control",
            ));
        }

        Ok(StopRecommendation::new(
            experiment.id,
            StopDecision::Continue,
            "No significant effect yet",
        ))
    }

    fn is_expired(&self, experiment: &Experiment, now: DateTime<Utc>) -> bool {
        if let Some(end_date) = experiment.schedule.end_date {
            if now > end_date {
                return true;
            }
        }

        if let (Some(started_at), Some(max_secs)) =
            (experiment.started_at, experiment.schedule.max_duration_secs)
        {
            if now - started_at > Duration::seconds(max_secs as i64) {
                return true;
            }
        }

        false
    }

    fn compare_treatments(
        &self,
        experiment: &Experiment,
        store: &dyn MetricStore,
    ) -> Result<Vec<TreatmentComparison>> {
        let metric = &experiment.metrics.primary;

        let Some(control) = experiment.control_variant() else {
            return Ok(Vec::new());
        };
        let Some(control_snapshot) = store.snapshot(&experiment.id, &control.id, &metric.id)
        else {
            return Ok(Vec::new());
        };

        let mut comparisons = Vec::new();
        for variant in experiment.variants.iter().filter(|v| !v.is_control) {
            let Some(snapshot) = store.snapshot(&experiment.id, &variant.id, &metric.id) else {
                continue;
            };

            let significance = run_test(
                metric,
                control_snapshot.mean,
                control_snapshot.variance,
                control_snapshot.sample_size,
                snapshot.mean,
                snapshot.variance,
                snapshot.sample_size,
                self.confidence_threshold,
            )?;

            comparisons.push(TreatmentComparison {
                variant_id: variant.id,
                significance,
            });
        }

        Ok(comparisons)
    }
}

fn is_favorable(goal: GoalDirection, effect: f64) -> bool {
    match goal {
        GoalDirection::Increase => effect > 0.0,
        GoalDirection::Decrease => effect < 0.0,
        // A maintain goal has no winners; any significant move is unfavorable
        GoalDirection::Maintain => false,
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn run_test(
    metric: &MetricDefinition,
    control_mean: f64,
    control_variance: f64,
    control_n: u64,
    treatment_mean: f64,
    treatment_variance: f64,
    treatment_n: u64,
    confidence_threshold: f64,
) -> Result<Significance> {
    match metric.method {
        SignificanceMethod::TwoProportionZ => {
            TwoProportionTest::new(control_mean, control_n, treatment_mean, treatment_n)
                .evaluate(confidence_threshold)
        }
        SignificanceMethod::MeanZ => MeanDifferenceTest {
            control_mean,
            control_variance,
            control_n,
            treatment_mean,
            treatment_variance,
            treatment_n,
        }
        .evaluate(confidence_threshold),
    }
}
