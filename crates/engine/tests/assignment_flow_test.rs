//! Integration tests for the assignment and tracking flow
//!
//! Exercises the full path from experiment creation through targeting,
//! deterministic bucketing, and exposure/conversion tracking.

use std::collections::HashMap;

use experiment_config::EngineConfig;
use experiment_engine::ExperimentEngine;
use experiment_types::{
    metrics::MetricDefinition, Experiment, MetricSet, RuleOperator, Schedule, Targeting,
    TargetingRule, UserContext, Variant,
};

fn checkout_experiment(targeting: Targeting) -> Experiment {
    Experiment::new(
        "Checkout CTA",
        vec![
            Variant::control("control", serde_json::json!({"cta": "Buy"}), 0.5),
            Variant::new("variant_a", serde_json::json!({"cta": "Buy now"}), 0.5),
        ],
        targeting,
        MetricSet::new(MetricDefinition::conversion("purchase", "Purchase"))
            .with_secondary(MetricDefinition::revenue("revenue", "Revenue")),
        Schedule::default(),
    )
}

#[test]
fn test_assignment_is_stable_across_engine_restarts() {
    // Two engines sharing the same experiment id must bucket every user
    // identically: bucketing depends only on (user_id, experiment_id)
    let config = EngineConfig::default();
    let engine_a = ExperimentEngine::new(&config);
    let engine_b = ExperimentEngine::new(&config);

    let experiment = checkout_experiment(Targeting::default());
    let clone = experiment.clone();

    let id = engine_a.create_experiment(experiment).unwrap();
    engine_a.start(&id).unwrap();
    let id_b = engine_b.create_experiment(clone).unwrap();
    engine_b.start(&id_b).unwrap();
    assert_eq!(id, id_b);

    for i in 0..200 {
        let user = format!("user-{}", i);
        let a = engine_a
            .assign_user(&user, &id, &UserContext::default())
            .unwrap()
            .map(|(v, _)| v);
        let b = engine_b
            .assign_user(&user, &id, &UserContext::default())
            .unwrap()
            .map(|(v, _)| v);
        assert_eq!(a, b, "user {} bucketed differently", user);
    }
}

#[test]
fn test_targeting_gates_assignment_end_to_end() {
    let engine = ExperimentEngine::new(&EngineConfig::default());

    let mut targeting = Targeting::default();
    targeting.tiers = vec!["premium".to_string()];
    targeting.exclude_rules = vec![TargetingRule::new(
        "beta_opt_out",
        RuleOperator::Equals,
        serde_json::json!(true),
    )];

    let id = engine.create_experiment(checkout_experiment(targeting)).unwrap();
    engine.start(&id).unwrap();

    // Premium user is in
    let premium = UserContext::new().with_tier("premium");
    assert!(engine.assign_user("user-1", &id, &premium).unwrap().is_some());

    // Free-tier user is out
    let free = UserContext::new().with_tier("free");
    assert!(engine.assign_user("user-2", &id, &free).unwrap().is_none());

    // Opted-out premium user is out
    let opted_out = UserContext::new()
        .with_tier("premium")
        .with_property("beta_opt_out", serde_json::json!(true));
    assert!(engine.assign_user("user-3", &id, &opted_out).unwrap().is_none());
}

#[test]
fn test_full_tracking_flow() {
    let engine = ExperimentEngine::new(&EngineConfig::default());
    let id = engine
        .create_experiment(checkout_experiment(Targeting::default()))
        .unwrap();
    engine.start(&id).unwrap();

    let ctx = UserContext::new().with_tier("premium");
    let (variant_id, _) = engine.assign_user("user-1", &id, &ctx).unwrap().unwrap();

    engine.track_exposure("user-1", &id).unwrap();
    engine.track_exposure("user-1", &id).unwrap(); // idempotent

    engine
        .track_conversion("user-1", &id, "purchase", 1.0, HashMap::new())
        .unwrap();
    engine
        .track_conversion(
            "user-1",
            &id,
            "revenue",
            19.99,
            HashMap::from([("order".to_string(), "ord-1".to_string())]),
        )
        .unwrap();

    let experiment = engine.get_experiment(&id).unwrap();
    let counters = &experiment.variant(&variant_id).unwrap().counters;
    assert_eq!(counters.assignments, 1);
    assert_eq!(counters.exposures, 1);
    assert_eq!(counters.conversions, 2);
    assert!((counters.revenue - 19.99).abs() < 1e-9);
}

#[test]
fn test_allocation_proportions_at_scale() {
    let engine = ExperimentEngine::new(&EngineConfig::default());

    let experiment = Experiment::new(
        "30/70 split",
        vec![
            Variant::control("control", serde_json::json!({}), 0.3),
            Variant::new("variant_a", serde_json::json!({}), 0.7),
        ],
        Targeting::default(),
        MetricSet::new(MetricDefinition::conversion("purchase", "Purchase")),
        Schedule::default(),
    );

    let id = engine.create_experiment(experiment).unwrap();
    engine.start(&id).unwrap();

    let n = 20_000;
    for i in 0..n {
        engine
            .assign_user(&format!("user-{}", i), &id, &UserContext::default())
            .unwrap();
    }

    let experiment = engine.get_experiment(&id).unwrap();
    let control = experiment.control_variant().unwrap();
    let share = control.counters.assignments as f64 / n as f64;
    assert!(
        (share - 0.3).abs() < 0.03,
        "control share {} too far from 0.3",
        share
    );
    assert_eq!(experiment.total_assignments(), n);
}
