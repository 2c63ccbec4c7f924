//! Plan invariants as pure checks over a snapshot.

use std::collections::BTreeSet;

use crate::config::PlannerConfig;
use crate::gap::gap_violations;
use crate::model::{InstanceKey, Plan, StoreId};

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    DuplicateInstance(InstanceKey),
    OverCapacity { day: usize, count: usize },
    PastWorkEnd { day: usize, departure: u32 },
    UnreportedGap { store_id: StoreId, earlier_day: usize, later_day: usize },
    Accounting { scheduled: usize, unassigned: usize, generated: usize },
}

/// Every invariant violation in `plan`. Empty for a valid plan.
pub fn check(plan: &Plan, config: &PlannerConfig) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut seen = BTreeSet::new();
    for (_, visit) in plan.scheduled_visits() {
        let key = visit.instance.key();
        if !seen.insert(key.clone()) {
            violations.push(Violation::DuplicateInstance(key));
        }
    }

    let work_end = config.work_end_minute();
    for (day, working_day) in plan.working_days.iter().enumerate() {
        let count = working_day.visits.len();
        if count > config.max_stores_per_day {
            violations.push(Violation::OverCapacity { day, count });
        }
        if let Some(departure) = working_day.finish_minute() {
            if departure > work_end {
                violations.push(Violation::PastWorkEnd { day, departure });
            }
        }
    }

    for gap in gap_violations(&plan.working_days, config.min_visit_gap_days) {
        if !plan.statistics.gap_warnings.contains(&gap) {
            violations.push(Violation::UnreportedGap {
                store_id: gap.store_id,
                earlier_day: gap.earlier_day,
                later_day: gap.later_day,
            });
        }
    }

    let scheduled = plan.scheduled_required();
    let unassigned = plan.unassigned.len();
    if scheduled + unassigned != plan.statistics.total_required {
        violations.push(Violation::Accounting {
            scheduled,
            unassigned,
            generated: plan.statistics.total_required,
        });
    }

    violations
}
