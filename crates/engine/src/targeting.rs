//! Targeting evaluation: who is eligible for an experiment

use experiment_types::targeting::{RuleOperator, Targeting, TargetingRule, UserContext};
use serde_json::Value;
use tracing::trace;

use crate::hashing::traffic_hash;

/// Decide whether a user matches an experiment's targeting.
///
/// Order of checks (short-circuiting on first failure):
/// 1. traffic gate: `traffic_hash(user_id)` must fall below the
///    experiment's traffic allocation;
/// 2. dimension lists (segments, tiers, regions, devices): every
///    non-empty list must contain the user's corresponding value;
/// 3. include rules must all match; any matching exclude rule rejects.
///
/// Side-effect free.
pub fn is_eligible(targeting: &Targeting, user_id: &str, context: &UserContext) -> bool {
    if traffic_hash(user_id) >= targeting.traffic_allocation {
        trace!(user_id, "user outside traffic allocation");
        return false;
    }

    if !dimension_matches(&targeting.segments, context.segment.as_deref())
        || !dimension_matches(&targeting.tiers, context.tier.as_deref())
        || !dimension_matches(&targeting.regions, context.region.as_deref())
        || !dimension_matches(&targeting.devices, context.device.as_deref())
    {
        return false;
    }

    for rule in &targeting.include_rules {
        if !rule_matches(rule, context) {
            return false;
        }
    }

    for rule in &targeting.exclude_rules {
        if rule_matches(rule, context) {
            return false;
        }
    }

    true
}

/// An empty list matches everyone; otherwise the user's value must be listed.
fn dimension_matches(allowed: &[String], actual: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match actual {
        Some(value) => allowed.iter().any(|a| a == value),
        None => false,
    }
}

/// Evaluate one custom rule against the context's property bag.
///
/// A missing property never matches, so it fails include rules and is
/// ignored by exclude rules.
fn rule_matches(rule: &TargetingRule, context: &UserContext) -> bool {
    let Some(actual) = context.properties.get(&rule.property) else {
        return false;
    };

    match rule.operator {
        RuleOperator::Equals => values_equal(actual, &rule.value),
        RuleOperator::NotEquals => !values_equal(actual, &rule.value),
        RuleOperator::Contains => contains(actual, &rule.value),
        RuleOperator::NotContains => !contains(actual, &rule.value),
        RuleOperator::GreaterThan => compare_numbers(actual, &rule.value, |a, b| a > b),
        RuleOperator::LessThan => compare_numbers(actual, &rule.value, |a, b| a < b),
        RuleOperator::In => value_in(actual, &rule.value),
        RuleOperator::NotIn => !value_in(actual, &rule.value),
    }
}

/// Equality with numeric coercion so 5 and 5.0 compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Substring match for strings, membership for arrays.
fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

fn compare_numbers(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

/// The rule value must be an array listing the accepted values.
fn value_in(actual: &Value, list: &Value) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|item| values_equal(item, actual)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> UserContext {
        UserContext::new()
            .with_segment("new_users")
            .with_tier("premium")
            .with_region("us")
            .with_device("mobile")
            .with_property("sessions", json!(12))
            .with_property("plan", json!("pro_annual"))
    }

    #[test]
    fn test_default_targeting_accepts_everyone() {
        assert!(is_eligible(&Targeting::default(), "user-1", &ctx()));
        assert!(is_eligible(&Targeting::default(), "", &UserContext::default()));
    }

    #[test]
    fn test_traffic_gate_rejects_regardless_of_rules() {
        // alice hashes to ~0.171, so a 10% allocation excludes her even
        // though every other rule matches
        let targeting = Targeting::with_traffic_allocation(0.10);
        assert!(!is_eligible(&targeting, "alice", &ctx()));

        let targeting = Targeting::with_traffic_allocation(0.20);
        assert!(is_eligible(&targeting, "alice", &ctx()));
    }

    #[test]
    fn test_zero_allocation_rejects_all() {
        let targeting = Targeting::with_traffic_allocation(0.0);
        for user in ["user-1", "user-2", "alice", ""] {
            assert!(!is_eligible(&targeting, user, &ctx()));
        }
    }

    #[test]
    fn test_dimension_lists() {
        let mut targeting = Targeting::default();
        targeting.segments = vec!["new_users".to_string()];
        targeting.regions = vec!["us".to_string(), "ca".to_string()];
        assert!(is_eligible(&targeting, "user-1", &ctx()));

        targeting.regions = vec!["eu".to_string()];
        assert!(!is_eligible(&targeting, "user-1", &ctx()));

        // Missing context value fails a non-empty dimension
        targeting.regions = vec!["us".to_string()];
        let mut no_region = ctx();
        no_region.region = None;
        assert!(!is_eligible(&targeting, "user-1", &no_region));
    }

    #[test]
    fn test_include_rules_all_must_match() {
        let mut targeting = Targeting::default();
        targeting.include_rules = vec![
            TargetingRule::new("sessions", RuleOperator::GreaterThan, json!(10)),
            TargetingRule::new("plan", RuleOperator::Contains, json!("annual")),
        ];
        assert!(is_eligible(&targeting, "user-1", &ctx()));

        targeting
            .include_rules
            .push(TargetingRule::new("sessions", RuleOperator::LessThan, json!(5)));
        assert!(!is_eligible(&targeting, "user-1", &ctx()));
    }

    #[test]
    fn test_exclude_rule_rejects() {
        let mut targeting = Targeting::default();
        targeting.exclude_rules = vec![TargetingRule::new(
            "plan",
            RuleOperator::In,
            json!(["pro_annual", "enterprise"]),
        )];
        assert!(!is_eligible(&targeting, "user-1", &ctx()));

        // Exclude rule on a missing property does not reject
        targeting.exclude_rules =
            vec![TargetingRule::new("beta_opt_out", RuleOperator::Equals, json!(true))];
        assert!(is_eligible(&targeting, "user-1", &ctx()));
    }

    #[test]
    fn test_missing_property_fails_include_rule() {
        let mut targeting = Targeting::default();
        targeting.include_rules =
            vec![TargetingRule::new("unknown", RuleOperator::Equals, json!(1))];
        assert!(!is_eligible(&targeting, "user-1", &ctx()));
    }

    #[test]
    fn test_numeric_coercion() {
        let mut targeting = Targeting::default();
        targeting.include_rules =
            vec![TargetingRule::new("sessions", RuleOperator::Equals, json!(12.0))];
        assert!(is_eligible(&targeting, "user-1", &ctx()));
    }

    #[test]
    fn test_operator_matrix() {
        let context = ctx();
        let cases = [
            ("plan", RuleOperator::Equals, json!("pro_annual"), true),
            ("plan", RuleOperator::NotEquals, json!("free"), true),
            ("plan", RuleOperator::Contains, json!("pro"), true),
            ("plan", RuleOperator::NotContains, json!("trial"), true),
            ("sessions", RuleOperator::GreaterThan, json!(11), true),
            ("sessions", RuleOperator::GreaterThan, json!(12), false),
            ("sessions", RuleOperator::LessThan, json!(13), true),
            ("plan", RuleOperator::In, json!(["free", "pro_annual"]), true),
            ("plan", RuleOperator::NotIn, json!(["free"]), true),
            ("plan", RuleOperator::In, json!("pro_annual"), false), // not an array
        ];

        for (property, operator, value, expected) in cases {
            let rule = TargetingRule::new(property, operator, value.clone());
            assert_eq!(
                rule_matches(&rule, &context),
                expected,
                "{} {:?} {}",
                property,
                operator,
                value
            );
        }
    }
}
