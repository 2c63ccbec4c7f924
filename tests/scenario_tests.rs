//! End-to-end scenarios with known outcomes.

mod fixtures;

use std::collections::BTreeSet;

use visit_planner::invariants;
use visit_planner::optimize;
use visit_planner::{PlannerConfig, StoreId};

use fixtures::{HOME, StoreBuilder, config, first_days, init_tracing, march_2026, offset, stores_on_disc};

fn days_of(plan: &visit_planner::Plan, id: &str) -> Vec<usize> {
    plan.scheduled_visits()
        .filter(|(_, v)| v.instance.store_id.as_str() == id)
        .map(|(d, _)| d)
        .collect()
}

#[test]
fn test_single_store_twice_respects_gap() {
    init_tracing();
    let config = PlannerConfig {
        min_visit_gap_days: 5,
        ..config()
    };
    let store = StoreBuilder::new("solo").at(offset(HOME, 2.0, 1.0)).frequency(2.0).build();

    let plan = optimize(&[store], &first_days(20), &config).unwrap();

    let days = days_of(&plan, "solo");
    assert_eq!(days.len(), 2, "both occurrences scheduled");
    assert!(days[1] - days[0] >= 5, "gap was {:?}", days);
    assert!(plan.unassigned.is_empty());
    assert!(plan.statistics.gap_warnings.is_empty());
    assert!(invariants::check(&plan, &config).is_empty());
}

#[test]
fn test_dense_area_spreads_over_days() {
    init_tracing();
    let config = PlannerConfig {
        max_stores_per_day: 15,
        ..config()
    };
    let stores = stores_on_disc("dense", offset(HOME, 1.0, 1.0), 5.0, 50, 1.0);

    let plan = optimize(&stores, &march_2026(), &config).unwrap();

    let used: BTreeSet<usize> = plan.scheduled_visits().map(|(d, _)| d).collect();
    assert!(used.len() >= 4, "only {} days used", used.len());
    assert!(plan.working_days.iter().all(|d| d.visits.len() <= 15));
    assert_eq!(plan.statistics.total_planned + plan.unassigned.len(), 50);
    assert!(invariants::check(&plan, &config).is_empty());
}

#[test]
fn test_empty_store_list() {
    let config = config();
    let plan = optimize(&[], &march_2026(), &config).unwrap();

    assert_eq!(plan.statistics.total_planned, 0);
    assert_eq!(plan.statistics.total_required, 0);
    assert!(plan.unassigned.is_empty());
    assert!(plan.working_days.iter().all(|d| d.visits.is_empty()));
    assert_eq!(plan.working_days.len(), 22);
}

#[test]
fn test_far_store_excluded_before_expansion() {
    let config = PlannerConfig {
        max_distance_from_home_km: 50.0,
        ..config()
    };
    let far = StoreBuilder::new("far").at(offset(HOME, 120.0, 0.0)).frequency(2.0).build();

    let plan = optimize(&[far], &march_2026(), &config).unwrap();

    assert_eq!(plan.out_of_range, vec![StoreId::new("far")]);
    assert!(plan.unassigned.is_empty());
    assert_eq!(plan.scheduled_visits().count(), 0);
    assert_eq!(plan.statistics.out_of_range_stores, 1);
    assert_eq!(plan.statistics.total_required, 0);
}

#[test]
fn test_far_store_excluded_among_others() {
    let config = PlannerConfig {
        max_distance_from_home_km: 50.0,
        ..config()
    };
    let stores = vec![
        StoreBuilder::new("near").at(offset(HOME, 3.0, 0.0)).build(),
        StoreBuilder::new("far").at(offset(HOME, 0.0, 80.0)).build(),
    ];

    let plan = optimize(&stores, &march_2026(), &config).unwrap();

    assert_eq!(days_of(&plan, "near").len(), 1);
    assert!(days_of(&plan, "far").is_empty());
    assert!(plan.unassigned.iter().all(|i| i.store_id.as_str() != "far"));
    assert_eq!(plan.out_of_range, vec![StoreId::new("far")]);
}
