//! Targeting rules and user context

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Comparison operator for a custom targeting rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    In,
    NotIn,
}

/// A custom property rule: property/operator/value triple
///
/// `In` and `NotIn` expect an array-valued `value`; numeric comparisons
/// go through f64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetingRule {
    /// Context property name
    pub property: String,
    /// Comparison operator
    pub operator: RuleOperator,
    /// Value to compare against
    pub value: serde_json::Value,
}

impl TargetingRule {
    pub fn new(
        property: impl Into<String>,
        operator: RuleOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            property: property.into(),
            operator,
            value,
        }
    }
}

/// Inclusion/exclusion targeting for an experiment
///
/// Empty dimension lists match everyone; non-empty lists require the
/// user's corresponding context value to be listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Targeting {
    /// Fraction of traffic admitted before variant bucketing (0.0-1.0)
    pub traffic_allocation: f64,
    /// User segments to include
    pub segments: Vec<String>,
    /// Subscription tiers to include
    pub tiers: Vec<String>,
    /// Regions to include
    pub regions: Vec<String>,
    /// Device types to include
    pub devices: Vec<String>,
    /// Custom rules that must all match
    pub include_rules: Vec<TargetingRule>,
    /// Custom rules where any match rejects the user
    pub exclude_rules: Vec<TargetingRule>,
}

impl Default for Targeting {
    fn default() -> Self {
        Self {
            traffic_allocation: 1.0,
            segments: Vec::new(),
            tiers: Vec::new(),
            regions: Vec::new(),
            devices: Vec::new(),
            include_rules: Vec::new(),
            exclude_rules: Vec::new(),
        }
    }
}

impl Targeting {
    /// Targeting that admits the given fraction of all users
    pub fn with_traffic_allocation(traffic_allocation: f64) -> Self {
        Self {
            traffic_allocation: traffic_allocation.clamp(0.0, 1.0),
            ..Self::default()
        }
    }
}

/// Snapshot of user attributes at assignment time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// User segment (e.g., "new_users")
    pub segment: Option<String>,
    /// Subscription tier (e.g., "free", "premium")
    pub tier: Option<String>,
    /// Region code
    pub region: Option<String>,
    /// Device type
    pub device: Option<String>,
    /// Arbitrary custom properties
    pub properties: HashMap<String, serde_json::Value>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targeting_admits_everyone() {
        let targeting = Targeting::default();
        assert_eq!(targeting.traffic_allocation, 1.0);
        assert!(targeting.segments.is_empty());
        assert!(targeting.include_rules.is_empty());
    }

    #[test]
    fn test_traffic_allocation_clamped() {
        let targeting = Targeting::with_traffic_allocation(1.5);
        assert_eq!(targeting.traffic_allocation, 1.0);
    }

    #[test]
    fn test_rule_operator_serde() {
        let rule = TargetingRule::new("plan", RuleOperator::In, serde_json::json!(["pro", "max"]));
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"in\""));

        let parsed: TargetingRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.operator, RuleOperator::In);

        // Unknown operators are a deserialization error, not a silent false
        let bad = r#"{"property":"plan","operator":"matches","value":1}"#;
        assert!(serde_json::from_str::<TargetingRule>(bad).is_err());
    }

    #[test]
    fn test_user_context_builder() {
        let ctx = UserContext::new()
            .with_segment("new_users")
            .with_tier("premium")
            .with_property("sessions", serde_json::json!(12));

        assert_eq!(ctx.segment.as_deref(), Some("new_users"));
        assert_eq!(ctx.properties.get("sessions"), Some(&serde_json::json!(12)));
    }
}
