//! Statistical significance testing and sample-size estimation
//!
//! All critical values and p-values go through the statrs normal
//! distribution (accurate rational-approximation inverse CDF), so
//! arbitrary confidence and power levels are supported without lookup
//! tables.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{EngineError, Result};

fn std_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| EngineError::Statistical(e.to_string()))
}

/// Outcome of a treatment-versus-control significance test
#[derive(Debug, Clone)]
pub struct Significance {
    /// Z-statistic of the comparison
    pub z_score: f64,
    /// Two-tailed p-value
    pub p_value: f64,
    /// 1 - p_value
    pub confidence: f64,
    /// Whether confidence met the threshold
    pub is_significant: bool,
    /// treatment mean - control mean
    pub absolute_effect: f64,
    /// (treatment - control) / control, when the control mean is nonzero
    pub relative_effect: Option<f64>,
    /// Confidence interval for the difference at the threshold level
    pub confidence_interval: (f64, f64),
}

impl Significance {
    /// The degenerate outcome: zero samples or zero standard error.
    ///
    /// Identical rates and empty groups land here instead of dividing by
    /// zero; the comparison simply reports no evidence of an effect.
    fn inconclusive(absolute_effect: f64, relative_effect: Option<f64>) -> Self {
        Self {
            z_score: 0.0,
            p_value: 1.0,
            confidence: 0.0,
            is_significant: false,
            absolute_effect,
            relative_effect,
            confidence_interval: (absolute_effect, absolute_effect),
        }
    }
}

fn relative_effect(control_mean: f64, diff: f64) -> Option<f64> {
    if control_mean != 0.0 {
        Some(diff / control_mean)
    } else {
        None
    }
}

/// Two-proportion z-test comparing a treatment conversion rate to control
///
/// Operates on rates and sample sizes rather than raw success counts so
/// it can consume aggregated snapshots from any metric store.
#[derive(Debug, Clone)]
pub struct TwoProportionTest {
    pub control_rate: f64,
    pub control_n: u64,
    pub treatment_rate: f64,
    pub treatment_n: u64,
}

impl TwoProportionTest {
    pub fn new(control_rate: f64, control_n: u64, treatment_rate: f64, treatment_n: u64) -> Self {
        Self {
            control_rate,
            control_n,
            treatment_rate,
            treatment_n,
        }
    }

    /// Pooled rate weighted by sample size
    pub fn pooled_rate(&self) -> f64 {
        let total = self.control_n + self.treatment_n;
        if total == 0 {
            return 0.0;
        }
        (self.control_rate * self.control_n as f64 + self.treatment_rate * self.treatment_n as f64)
            / total as f64
    }

    /// Run the test against a confidence threshold (e.g., 0.95).
    pub fn evaluate(&self, confidence_threshold: f64) -> Result<Significance> {
        let diff = self.treatment_rate - self.control_rate;
        let rel = relative_effect(self.control_rate, diff);

        if self.control_n == 0 || self.treatment_n == 0 {
            return Ok(Significance::inconclusive(diff, rel));
        }

        let n_c = self.control_n as f64;
        let n_t = self.treatment_n as f64;

        let pooled = self.pooled_rate();
        let se = (pooled * (1.0 - pooled) * (1.0 / n_c + 1.0 / n_t)).sqrt();

        if se == 0.0 {
            return Ok(Significance::inconclusive(diff, rel));
        }

        let z = diff / se;

        let normal = std_normal()?;
        let p_value = 2.0 * (1.0 - normal.cdf(z.abs()));
        let confidence = 1.0 - p_value;

        // CI for the difference uses the unpooled standard error
        let se_diff = (self.control_rate * (1.0 - self.control_rate) / n_c
            + self.treatment_rate * (1.0 - self.treatment_rate) / n_t)
            .sqrt();
        let alpha = 1.0 - confidence_threshold;
        let z_crit = normal.inverse_cdf(1.0 - alpha / 2.0);
        let margin = z_crit * se_diff;

        Ok(Significance {
            z_score: z,
            p_value,
            confidence,
            is_significant: confidence >= confidence_threshold,
            absolute_effect: diff,
            relative_effect: rel,
            confidence_interval: (diff - margin, diff + margin),
        })
    }
}

/// Unpooled z-test on means for value metrics (revenue, counts, durations)
#[derive(Debug, Clone)]
pub struct MeanDifferenceTest {
    pub control_mean: f64,
    pub control_variance: f64,
    pub control_n: u64,
    pub treatment_mean: f64,
    pub treatment_variance: f64,
    pub treatment_n: u64,
}

impl MeanDifferenceTest {
    pub fn evaluate(&self, confidence_threshold: f64) -> Result<Significance> {
        let diff = self.treatment_mean - self.control_mean;
        let rel = relative_effect(self.control_mean, diff);

        if self.control_n == 0 || self.treatment_n == 0 {
            return Ok(Significance::inconclusive(diff, rel));
        }

        let se = (self.control_variance / self.control_n as f64
            + self.treatment_variance / self.treatment_n as f64)
            .sqrt();

        if se == 0.0 {
            return Ok(Significance::inconclusive(diff, rel));
        }

        let z = diff / se;

        let normal = std_normal()?;
        let p_value = 2.0 * (1.0 - normal.cdf(z.abs()));
        let confidence = 1.0 - p_value;

        let alpha = 1.0 - confidence_threshold;
        let margin = normal.inverse_cdf(1.0 - alpha / 2.0) * se;

        Ok(Significance {
            z_score: z,
            p_value,
            confidence,
            is_significant: confidence >= confidence_threshold,
            absolute_effect: diff,
            relative_effect: rel,
            confidence_interval: (diff - margin, diff + margin),
        })
    }
}

/// Sample size calculator for two-proportion experiments
pub struct SampleSizeCalculator {
    /// Baseline conversion rate
    pub baseline_rate: f64,
    /// Minimum detectable effect (relative improvement)
    pub min_detectable_effect: f64,
    /// Statistical power (1 - beta)
    pub power: f64,
    /// Confidence level (e.g., 0.95)
    pub confidence: f64,
}

impl SampleSizeCalculator {
    pub fn new(
        baseline_rate: f64,
        min_detectable_effect: f64,
        power: f64,
        confidence: f64,
    ) -> Result<Self> {
        if baseline_rate <= 0.0 || baseline_rate >= 1.0 {
            return Err(EngineError::InvalidConfig(
                "Baseline rate must be between 0 and 1".to_string(),
            ));
        }

        if power <= 0.0 || power >= 1.0 {
            return Err(EngineError::InvalidConfig(
                "Power must be between 0 and 1".to_string(),
            ));
        }

        if confidence <= 0.0 || confidence >= 1.0 {
            return Err(EngineError::InvalidConfig(
                "Confidence must be between 0 and 1".to_string(),
            ));
        }

        if min_detectable_effect <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "Minimum detectable effect must be positive".to_string(),
            ));
        }

        Ok(Self {
            baseline_rate,
            min_detectable_effect,
            power,
            confidence,
        })
    }

    /// Required sample size per variant.
    ///
    /// Standard two-proportion formula with z_alpha two-tailed for the
    /// confidence level and z_beta one-tailed for the power.
    pub fn calculate(&self) -> Result<u64> {
        let p1 = self.baseline_rate;
        let p2 = self.baseline_rate * (1.0 + self.min_detectable_effect);

        if p2 >= 1.0 {
            return Err(EngineError::InvalidConfig(
                "Effect size too large, treatment rate exceeds 1.0".to_string(),
            ));
        }

        let normal = std_normal()?;

        let alpha = 1.0 - self.confidence;
        let z_alpha = normal.inverse_cdf(1.0 - alpha / 2.0);
        let z_beta = normal.inverse_cdf(self.power);

        let pooled = (p1 + p2) / 2.0;
        let delta = p2 - p1;

        let n = ((z_alpha + z_beta).powi(2) * 2.0 * pooled * (1.0 - pooled)) / delta.powi(2);

        Ok(n.ceil() as u64)
    }
}
