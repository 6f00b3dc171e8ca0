//! Computed experiment results and stop recommendations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Computed statistics for one (experiment, variant, metric) triple
///
/// Recomputed on demand from aggregated counters; never the source of
/// truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub metric_id: String,
    /// Per-variant sample size
    pub sample_size: u64,
    /// Sample mean (conversion rate for proportion metrics)
    pub mean: f64,
    /// Sample variance
    pub variance: f64,
    /// Confidence interval around the mean
    pub confidence_interval: (f64, f64),
    /// Two-tailed p-value versus control; None on the control row
    pub p_value: Option<f64>,
    /// Statistically significant versus control
    pub is_significant: bool,
    /// Practically significant: |absolute effect| meets the minimum
    /// detectable effect relative to the control mean
    pub is_practical: bool,
    /// treatment mean - control mean; None on the control row
    pub absolute_effect: Option<f64>,
    /// (treatment - control) / control; None on the control row or when
    /// the control mean is zero
    pub relative_effect: Option<f64>,
}

/// Stop/continue recommendation for a running experiment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopDecision {
    /// Keep running; no significant effect yet
    Continue,
    /// Below the minimum sample size
    NeedMoreData,
    /// Stop and ship the winning treatment
    StopWinner,
    /// Stop and keep control; no favorable effect found
    StopNoEffect,
}

/// The decision engine's full recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRecommendation {
    pub experiment_id: Uuid,
    pub decision: StopDecision,
    /// Winning variant, present only for `StopWinner`
    pub winner_variant_id: Option<Uuid>,
    /// P-value of the decisive comparison, when one was made
    pub p_value: Option<f64>,
    /// 1 - p_value of the decisive comparison
    pub confidence: Option<f64>,
    /// Absolute effect of the decisive comparison
    pub effect: Option<f64>,
    /// Human-readable rationale
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
}

impl StopRecommendation {
    pub fn new(experiment_id: Uuid, decision: StopDecision, reason: impl Into<String>) -> Self {
        Self {
            experiment_id,
            decision,
            winner_variant_id: None,
            p_value: None,
            confidence: None,
            effect: None,
            reason: reason.into(),
            evaluated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_decision_serde() {
        let json = serde_json::to_string(&StopDecision::StopWinner).unwrap();
        assert_eq!(json, "\"stop_winner\"");

        let parsed: StopDecision = serde_json::from_str("\"need_more_data\"").unwrap();
        assert_eq!(parsed, StopDecision::NeedMoreData);
    }

    #[test]
    fn test_recommendation_defaults() {
        let rec = StopRecommendation::new(Uuid::new_v4(), StopDecision::Continue, "no effect yet");
        assert!(rec.winner_variant_id.is_none());
        assert!(rec.p_value.is_none());
        assert_eq!(rec.decision, StopDecision::Continue);
    }
}
