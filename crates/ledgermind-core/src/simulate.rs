//! What-if scenario simulation
//!
//! Applies a hypothetical mutation sequence to a snapshot's ledger, rebuilds
//! a derived snapshot, and diffs aggregates and forecasts against the
//! baseline. The base snapshot is never touched; mutations are applied in
//! caller order because later mutations may depend on records introduced by
//! earlier ones.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::aggregate::summarize;
use crate::detect::DetectionConfig;
use crate::error::{Error, Result};
use crate::forecast::{forecast, ForecastConfig};
use crate::models::{scale_minor_units, CategoryId, Mutation, Period, RawLedger, WhatIfDelta};
use crate::snapshot::LedgerSnapshot;
use crate::trends::TrendConfig;

/// Per-date projected balance difference, derived minus base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceDelta {
    pub date: NaiveDate,
    pub delta: i64,
}

/// Structural diff between the baseline and the what-if branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationDiff {
    pub base_fingerprint: String,
    pub derived_fingerprint: String,
    /// Per-category total difference over the comparison period, derived
    /// minus base; categories with no difference are omitted
    pub aggregate_diff: BTreeMap<CategoryId, i64>,
    /// Per-date projected balance difference over the forecast horizon
    pub forecast_diff: Vec<BalanceDelta>,
}

/// A completed simulation
///
/// The derived snapshot is local to the call; callers extract what they
/// need from the diff and drop it.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub diff: SimulationDiff,
    pub derived: LedgerSnapshot,
}

/// Run a what-if delta against a base snapshot
///
/// Re-runs the aggregator over `period` and the forecaster over
/// `horizon_days` on both the base and the derived snapshot, over the same
/// window, and returns the diff.
pub fn simulate(
    base: &LedgerSnapshot,
    delta: &WhatIfDelta,
    period: Period,
    horizon_days: i64,
    detection: &DetectionConfig,
    trend: &TrendConfig,
    forecast_config: &ForecastConfig,
) -> Result<Simulation> {
    let mut raw = base.to_raw();
    for (index, mutation) in delta.mutations.iter().enumerate() {
        apply_mutation(&mut raw, mutation).map_err(|e| match e {
            Error::Validation(detail) => {
                Error::Validation(format!("mutation {}: {}", index, detail))
            }
            other => other,
        })?;
    }

    let derived =
        LedgerSnapshot::build_derived(raw, base.as_of(), base.fingerprint().to_string())?;
    debug!(
        base = %base.fingerprint(),
        derived = %derived.fingerprint(),
        mutations = delta.mutations.len(),
        "Derived snapshot built"
    );

    let base_summary = summarize(base, period)?;
    let derived_summary = summarize(&derived, period)?;
    let mut aggregate_diff = BTreeMap::new();
    let category_ids = base_summary
        .by_category
        .keys()
        .chain(derived_summary.by_category.keys());
    for &category_id in category_ids {
        let before = base_summary
            .by_category
            .get(&category_id)
            .map(|s| s.total)
            .unwrap_or(0);
        let after = derived_summary
            .by_category
            .get(&category_id)
            .map(|s| s.total)
            .unwrap_or(0);
        if before != after {
            aggregate_diff.insert(category_id, after - before);
        }
    }

    let base_forecast = forecast(base, horizon_days, detection, trend, forecast_config)?;
    let derived_forecast = forecast(&derived, horizon_days, detection, trend, forecast_config)?;
    let forecast_diff = base_forecast
        .points
        .iter()
        .zip(derived_forecast.points.iter())
        .map(|(b, d)| BalanceDelta {
            date: b.date,
            delta: d.projected_balance - b.projected_balance,
        })
        .collect();

    Ok(Simulation {
        diff: SimulationDiff {
            base_fingerprint: base.fingerprint().to_string(),
            derived_fingerprint: derived.fingerprint().to_string(),
            aggregate_diff,
            forecast_diff,
        },
        derived,
    })
}

fn apply_mutation(raw: &mut RawLedger, mutation: &Mutation) -> Result<()> {
    match mutation {
        Mutation::AddTransaction { transaction } => {
            raw.transactions.push(transaction.clone());
        }
        Mutation::RemoveTransaction { id } => {
            let index = raw
                .transactions
                .iter()
                .position(|t| t.id == *id)
                .ok_or_else(|| {
                    Error::Validation(format!("cannot remove unknown transaction {}", id))
                })?;
            raw.transactions.remove(index);
        }
        Mutation::ScaleTransaction { id, factor_bp } => {
            check_factor(*factor_bp)?;
            let tx = raw
                .transactions
                .iter_mut()
                .find(|t| t.id == *id)
                .ok_or_else(|| {
                    Error::Validation(format!("cannot scale unknown transaction {}", id))
                })?;
            tx.amount = scale_minor_units(tx.amount, *factor_bp);
        }
        Mutation::AddRecurringBill { bill } => {
            raw.recurring_bills.push(bill.clone());
        }
        Mutation::RemoveRecurringBill { id } => {
            let index = raw
                .recurring_bills
                .iter()
                .position(|b| b.id == *id)
                .ok_or_else(|| {
                    Error::Validation(format!("cannot remove unknown recurring bill {}", id))
                })?;
            raw.recurring_bills.remove(index);
        }
        Mutation::ScaleRecurringBill { id, factor_bp } => {
            check_factor(*factor_bp)?;
            let bill = raw
                .recurring_bills
                .iter_mut()
                .find(|b| b.id == *id)
                .ok_or_else(|| {
                    Error::Validation(format!("cannot scale unknown recurring bill {}", id))
                })?;
            bill.amount.low = scale_minor_units(bill.amount.low, *factor_bp);
            bill.amount.high = scale_minor_units(bill.amount.high, *factor_bp);
        }
        Mutation::ScaleCategoryBills {
            category_id,
            factor_bp,
        } => {
            check_factor(*factor_bp)?;
            // Includes bills added by earlier mutations in this delta
            for bill in raw
                .recurring_bills
                .iter_mut()
                .filter(|b| b.category_id == *category_id)
            {
                bill.amount.low = scale_minor_units(bill.amount.low, *factor_bp);
                bill.amount.high = scale_minor_units(bill.amount.high, *factor_bp);
            }
        }
    }
    Ok(())
}

fn check_factor(factor_bp: i64) -> Result<()> {
    if factor_bp <= 0 {
        return Err(Error::Validation(format!(
            "scale factor must be positive basis points, got {}",
            factor_bp
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountRange, BillSource, Periodicity, RecurringBillDefinition, Transaction};
    use crate::test_utils::sample_ledger;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn run(base: &LedgerSnapshot, delta: &WhatIfDelta) -> Result<Simulation> {
        simulate(
            base,
            delta,
            Period::new(d(2026, 1, 1), d(2026, 7, 1)).unwrap(),
            30,
            &DetectionConfig::default(),
            &TrendConfig::default(),
            &ForecastConfig::default(),
        )
    }

    fn rent_bill(id: i64, category_id: i64, amount: i64) -> RecurringBillDefinition {
        RecurringBillDefinition {
            id,
            name: format!("Bill {}", id),
            category_id,
            amount: AmountRange::point(amount),
            periodicity: Periodicity::MonthlyOnDay { day: 5 },
            source: BillSource::UserConfirmed,
            next_due: Some(d(2026, 7, 5)),
        }
    }

    #[test]
    fn test_base_snapshot_is_untouched() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));
        let raw_before = base.to_raw();
        let fingerprint_before = base.fingerprint().to_string();

        let delta = WhatIfDelta {
            mutations: vec![
                Mutation::RemoveTransaction { id: 100 },
                Mutation::ScaleTransaction {
                    id: 200,
                    factor_bp: 20_000,
                },
            ],
        };
        let simulation = run(&base, &delta).unwrap();

        assert_eq!(base.fingerprint(), fingerprint_before);
        assert_eq!(base.to_raw(), raw_before);
        assert_ne!(simulation.derived.fingerprint(), base.fingerprint());
        assert_eq!(
            simulation.derived.base_fingerprint(),
            Some(base.fingerprint())
        );
    }

    #[test]
    fn test_aggregate_diff_reflects_removed_subscription() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));
        // Remove one streaming charge (category 21, rolled into 20)
        let delta = WhatIfDelta {
            mutations: vec![Mutation::RemoveTransaction { id: 100 }],
        };
        let simulation = run(&base, &delta).unwrap();

        assert_eq!(simulation.diff.aggregate_diff[&21], 1_599);
        assert_eq!(simulation.diff.aggregate_diff[&20], 1_599);
        assert!(!simulation.diff.aggregate_diff.contains_key(&11));
    }

    #[test]
    fn test_forecast_diff_shows_added_bill() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));
        let delta = WhatIfDelta {
            mutations: vec![Mutation::AddRecurringBill {
                bill: rent_bill(50, 10, -150_000),
            }],
        };
        let simulation = run(&base, &delta).unwrap();

        let before_due: Vec<_> = simulation
            .diff
            .forecast_diff
            .iter()
            .filter(|p| p.date < d(2026, 7, 5))
            .collect();
        assert!(before_due.iter().all(|p| p.delta == 0));

        let at_due = simulation
            .diff
            .forecast_diff
            .iter()
            .find(|p| p.date == d(2026, 7, 5))
            .unwrap();
        assert_eq!(at_due.delta, -150_000);
    }

    #[test]
    fn test_mutation_order_is_significant() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));

        // Add a bill, then scale its whole category: the new bill is scaled
        let add_then_scale = WhatIfDelta {
            mutations: vec![
                Mutation::AddRecurringBill {
                    bill: rent_bill(50, 10, -100_000),
                },
                Mutation::ScaleCategoryBills {
                    category_id: 10,
                    factor_bp: 11_000,
                },
            ],
        };
        // Scale first, then add: the new bill keeps its original amount
        let scale_then_add = WhatIfDelta {
            mutations: vec![
                Mutation::ScaleCategoryBills {
                    category_id: 10,
                    factor_bp: 11_000,
                },
                Mutation::AddRecurringBill {
                    bill: rent_bill(50, 10, -100_000),
                },
            ],
        };

        let first = run(&base, &add_then_scale).unwrap();
        let second = run(&base, &scale_then_add).unwrap();

        let due_delta = |s: &Simulation| {
            s.diff
                .forecast_diff
                .iter()
                .find(|p| p.date == d(2026, 7, 5))
                .unwrap()
                .delta
        };
        assert_eq!(due_delta(&first), -110_000);
        assert_eq!(due_delta(&second), -100_000);
        assert_ne!(
            first.diff.derived_fingerprint,
            second.diff.derived_fingerprint
        );
    }

    #[test]
    fn test_unknown_ids_are_rejected_with_position() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));
        let delta = WhatIfDelta {
            mutations: vec![
                Mutation::RemoveTransaction { id: 100 },
                Mutation::RemoveTransaction { id: 424_242 },
            ],
        };
        let err = run(&base, &delta).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mutation 1"));
        assert!(message.contains("424242"));
    }

    #[test]
    fn test_duplicate_added_transaction_fails_validation() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));
        let delta = WhatIfDelta {
            mutations: vec![Mutation::AddTransaction {
                transaction: Transaction {
                    id: 100, // collides with an existing id
                    account_id: 1,
                    posted_on: d(2026, 6, 20),
                    amount: -500,
                    description: "DUP".into(),
                    category_id: None,
                    pending: false,
                },
            }],
        };
        assert!(matches!(run(&base, &delta), Err(Error::Validation(_))));
    }

    #[test]
    fn test_nonpositive_scale_factor_rejected() {
        let base = sample_ledger().build_snapshot(d(2026, 7, 1));
        let delta = WhatIfDelta {
            mutations: vec![Mutation::ScaleTransaction {
                id: 100,
                factor_bp: 0,
            }],
        };
        assert!(run(&base, &delta).is_err());
    }
}
