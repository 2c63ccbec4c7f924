//! Properties that must hold on every returned plan.

mod fixtures;

use std::collections::BTreeSet;

use visit_planner::expander::VisitExpander;
use visit_planner::invariants;
use visit_planner::optimize;
use visit_planner::{ClusteringStrategy, PackingStrategy, Plan, PlannerConfig, Store};

use fixtures::{HOME, StoreBuilder, config, first_days, init_tracing, march_2026, offset, portfolio, stores_on_disc};

fn assert_valid(plan: &Plan, config: &PlannerConfig) {
    let violations = invariants::check(plan, config);
    assert!(violations.is_empty(), "violations: {:?}", violations);
}

fn strategies() -> Vec<(ClusteringStrategy, PackingStrategy)> {
    vec![
        (ClusteringStrategy::Kmeans, PackingStrategy::BestFit),
        (ClusteringStrategy::Grid, PackingStrategy::BestFit),
        (ClusteringStrategy::Kmeans, PackingStrategy::GridCapacity),
        (ClusteringStrategy::Grid, PackingStrategy::GridCapacity),
    ]
}

#[test]
fn test_invariants_hold_for_every_strategy() {
    init_tracing();
    let stores = portfolio();
    for (clustering, packing) in strategies() {
        let config = PlannerConfig {
            clustering_strategy: clustering,
            packing_strategy: packing,
            ..config()
        };
        let plan = optimize(&stores, &march_2026(), &config).unwrap();
        assert_valid(&plan, &config);
        assert!(plan.statistics.total_planned > 0, "{:?}/{:?} planned nothing", clustering, packing);
    }
}

#[test]
fn test_plans_are_byte_identical() {
    let stores = portfolio();
    let config = config();
    let first = optimize(&stores, &march_2026(), &config).unwrap();
    let second = optimize(&stores, &march_2026(), &config).unwrap();

    let a = serde_json::to_string(&first).unwrap();
    let b = serde_json::to_string(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_no_instance_scheduled_twice() {
    let stores = portfolio();
    let config = config();
    let plan = optimize(&stores, &march_2026(), &config).unwrap();

    let mut seen = BTreeSet::new();
    for (_, visit) in plan.scheduled_visits() {
        assert!(seen.insert(visit.instance.key()), "{:?} scheduled twice", visit.instance.key());
    }
}

#[test]
fn test_days_never_run_past_work_end_or_capacity() {
    let stores: Vec<Store> = stores_on_disc("long", offset(HOME, 4.0, -2.0), 12.0, 80, 2.0)
        .into_iter()
        .map(|mut s| {
            s.visit_duration_minutes = Some(55);
            s
        })
        .collect();
    let config = PlannerConfig {
        max_stores_per_day: 10,
        ..config()
    };
    let plan = optimize(&stores, &march_2026(), &config).unwrap();

    let work_end = config.work_end_minute();
    for day in &plan.working_days {
        assert!(day.visits.len() <= 10);
        if let Some(last) = day.visits.last() {
            assert!(last.departure_minute <= work_end);
        }
    }
    assert_valid(&plan, &config);
}

#[test]
fn test_break_windows_are_never_entered() {
    let config = config();
    let plan = optimize(&portfolio(), &march_2026(), &config).unwrap();

    for day in &plan.working_days {
        let (start, end) = config.break_window(day.break_kind);
        for visit in &day.visits {
            assert!(
                visit.arrival_minute < start || visit.arrival_minute >= end,
                "arrival {} inside break {}-{}",
                visit.arrival_minute,
                start,
                end
            );
        }
    }
}

#[test]
fn test_capacity_exhaustion_reports_unassigned() {
    let stores = stores_on_disc("busy", HOME, 8.0, 120, 3.0);
    let config = config();
    let plan = optimize(&stores, &first_days(5), &config).unwrap();

    assert!(!plan.unassigned.is_empty());
    assert_eq!(plan.statistics.total_required, 360);
    assert_eq!(plan.scheduled_required() + plan.unassigned.len(), 360);
    assert!(plan.statistics.coverage_percent < 100.0);
    assert_valid(&plan, &config);
}

#[test]
fn test_unsatisfiable_gap_is_reported_not_dropped() {
    let config = PlannerConfig {
        min_visit_gap_days: 30,
        ..config()
    };
    let store = StoreBuilder::new("twice").at(offset(HOME, 1.0, 0.0)).frequency(2.0).build();
    let plan = optimize(&[store], &march_2026(), &config).unwrap();

    assert_eq!(plan.statistics.total_planned, 2);
    assert_eq!(plan.statistics.gap_warnings.len(), 1);
    assert!(plan.statistics.gap_compliance_percent < 100.0);
    assert_valid(&plan, &config);
}

#[test]
fn test_repeat_visits_are_spread() {
    let stores = stores_on_disc("rep", offset(HOME, -3.0, 2.0), 6.0, 30, 3.0);
    let config = PlannerConfig {
        min_visit_gap_days: 5,
        ..config()
    };
    let plan = optimize(&stores, &march_2026(), &config).unwrap();

    assert_valid(&plan, &config);
    assert!(plan.statistics.gap_compliance_percent >= 80.0);
}

fn fraction_visited(frequency: f64, epochs: std::ops::Range<i64>) -> f64 {
    let config = PlannerConfig::default();
    let stores: Vec<Store> = (0..1000)
        .map(|i| StoreBuilder::new(&format!("frac-{:04}", i)).frequency(frequency).build())
        .collect();
    let mut visited = 0u32;
    let mut draws = 0u32;
    for epoch in epochs {
        let expander = VisitExpander::new(&config, epoch);
        for store in &stores {
            visited += expander.occurrences_for(store);
            draws += 1;
        }
    }
    f64::from(visited) / f64::from(draws)
}

#[test]
fn test_fractional_sampling_tracks_frequency() {
    let month = 2026 * 12 + 2;
    let low = fraction_visited(0.1, month..month + 1);
    assert!((low - 0.1).abs() <= 0.03, "f=0.1 sampled {}", low);

    let high = fraction_visited(0.9, month..month + 1);
    assert!((high - 0.9).abs() <= 0.03, "f=0.9 sampled {}", high);

    let half = fraction_visited(0.5, month..month + 12);
    assert!((half - 0.5).abs() <= 0.03, "f=0.5 sampled {}", half);
}

#[test]
fn test_month_epoch_changes_sampled_stores() {
    let stores = stores_on_disc("preview", HOME, 10.0, 60, 0.5);
    let this_month = config();
    let next_month = PlannerConfig {
        month_epoch: Some(2026 * 12 + 3),
        ..config()
    };

    let sampled = |config: &PlannerConfig| -> BTreeSet<String> {
        let plan = optimize(&stores, &march_2026(), config).unwrap();
        plan.scheduled_visits()
            .map(|(_, v)| v.instance.store_id.to_string())
            .chain(plan.unassigned.iter().map(|i| i.store_id.to_string()))
            .collect()
    };

    assert_eq!(sampled(&this_month), sampled(&this_month));
    assert_ne!(sampled(&this_month), sampled(&next_month));
}
