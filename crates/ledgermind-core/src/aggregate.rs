//! Category aggregation
//!
//! Per-category totals over a half-open period, with child totals rolled up
//! into every ancestor. All arithmetic is integer minor units; summation
//! order cannot affect the result.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{CategoryId, Period, TransactionId};
use crate::snapshot::LedgerSnapshot;

/// Aggregate figures for one category over a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    /// Sum of signed amounts in minor units
    pub total: i64,
    /// Number of contributing transactions (each counted once per tree level)
    pub count: u64,
    /// Integer average, `total / count`, truncated toward zero
    pub average: i64,
}

/// Result of a summarize call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodSummary {
    /// Keyed by category id; deterministic iteration order
    pub by_category: BTreeMap<CategoryId, CategorySummary>,
    /// Ids of every transaction that contributed, ascending
    pub cited_transaction_ids: Vec<TransactionId>,
}

/// Summarize categorized spend for a period
///
/// A transaction contributes once to its own category and once to each
/// ancestor of that category; it is never double-counted at any single tree
/// level. Uncategorized transactions are skipped (they have no node to
/// attribute to). An empty period yields an empty map, not an error.
pub fn summarize(snapshot: &LedgerSnapshot, period: Period) -> Result<PeriodSummary> {
    let mut totals: BTreeMap<CategoryId, (i64, u64)> = BTreeMap::new();
    let mut cited = Vec::new();

    for tx in snapshot.transactions() {
        if !period.contains(tx.posted_on) {
            continue;
        }
        let Some(category_id) = tx.category_id else {
            continue;
        };

        add_contribution(&mut totals, category_id, tx.amount, snapshot)?;
        for &ancestor in snapshot.category_ancestors(category_id) {
            add_contribution(&mut totals, ancestor, tx.amount, snapshot)?;
        }
        cited.push(tx.id);
    }

    let by_category = totals
        .into_iter()
        .map(|(id, (total, count))| {
            let average = if count == 0 { 0 } else { total / count as i64 };
            (
                id,
                CategorySummary {
                    total,
                    count,
                    average,
                },
            )
        })
        .collect();

    Ok(PeriodSummary {
        by_category,
        cited_transaction_ids: cited,
    })
}

fn add_contribution(
    totals: &mut BTreeMap<CategoryId, (i64, u64)>,
    category_id: CategoryId,
    amount: i64,
    snapshot: &LedgerSnapshot,
) -> Result<()> {
    let entry = totals.entry(category_id).or_insert((0, 0));
    entry.0 = entry.0.checked_add(amount).ok_or_else(|| Error::Internal {
        fingerprint: snapshot.fingerprint().to_string(),
        detail: format!("category {} total overflowed i64", category_id),
    })?;
    entry.1 += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_ledger, LedgerBuilder};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_empty_period_returns_empty_map() {
        let snapshot = sample_ledger().build_snapshot(d(2026, 7, 1));
        let summary = summarize(
            &snapshot,
            Period::new(d(2020, 1, 1), d(2020, 2, 1)).unwrap(),
        )
        .unwrap();
        assert!(summary.by_category.is_empty());
        assert!(summary.cited_transaction_ids.is_empty());
    }

    #[test]
    fn test_rollup_counts_each_transaction_once_per_level() {
        let snapshot = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Living", None)
            .category(2, "Food", Some(1))
            .category(3, "Dining", Some(2))
            .tx(1, 1, d(2026, 1, 5), -1_000, "THAI PALACE", Some(3))
            .tx(2, 1, d(2026, 1, 8), -2_000, "SAFEWAY", Some(2))
            .build_snapshot(d(2026, 2, 1));

        let period = Period::new(d(2026, 1, 1), d(2026, 2, 1)).unwrap();
        let summary = summarize(&snapshot, period).unwrap();

        let dining = summary.by_category[&3];
        assert_eq!((dining.total, dining.count), (-1_000, 1));

        let food = summary.by_category[&2];
        assert_eq!((food.total, food.count), (-3_000, 2));

        let living = summary.by_category[&1];
        assert_eq!((living.total, living.count), (-3_000, 2));
        assert_eq!(living.average, -1_500);

        assert_eq!(summary.cited_transaction_ids, vec![1, 2]);
    }

    #[test]
    fn test_leaf_sums_equal_total_spend() {
        // No double counting: leaf-category totals must sum to the raw
        // transaction total for the period, exactly.
        let snapshot = sample_ledger().build_snapshot(d(2026, 7, 1));
        let period = Period::new(d(2026, 1, 1), d(2026, 7, 1)).unwrap();
        let summary = summarize(&snapshot, period).unwrap();

        let leaf_ids = [11i64, 12, 21]; // Groceries, Dining, Streaming
        let leaf_sum: i64 = leaf_ids.iter().map(|id| summary.by_category[id].total).sum();

        let raw_sum: i64 = snapshot
            .transactions()
            .iter()
            .filter(|t| period.contains(t.posted_on))
            .map(|t| t.amount)
            .sum();
        assert_eq!(leaf_sum, raw_sum);
    }

    #[test]
    fn test_uncategorized_transactions_are_skipped() {
        let snapshot = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Misc", None)
            .tx(1, 1, d(2026, 1, 5), -1_000, "ATM WITHDRAWAL", None)
            .tx(2, 1, d(2026, 1, 6), -500, "VENDING", Some(1))
            .build_snapshot(d(2026, 2, 1));

        let period = Period::new(d(2026, 1, 1), d(2026, 2, 1)).unwrap();
        let summary = summarize(&snapshot, period).unwrap();
        assert_eq!(summary.by_category.len(), 1);
        assert_eq!(summary.cited_transaction_ids, vec![2]);
    }

    #[test]
    fn test_half_open_boundary() {
        let snapshot = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Misc", None)
            .tx(1, 1, d(2026, 1, 31), -100, "A", Some(1))
            .tx(2, 1, d(2026, 2, 1), -200, "B", Some(1))
            .build_snapshot(d(2026, 3, 1));

        let period = Period::new(d(2026, 1, 1), d(2026, 2, 1)).unwrap();
        let summary = summarize(&snapshot, period).unwrap();
        assert_eq!(summary.by_category[&1].total, -100);
    }
}
