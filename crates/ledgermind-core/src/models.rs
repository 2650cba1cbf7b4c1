//! Domain models for the LedgerMind tool engine
//!
//! All monetary values are signed integers in minor units (cents for USD).
//! The sign convention is fixed: outflows are negative, inflows positive.
//! Floating-point currency amounts are never accepted or produced.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub type AccountId = i64;
pub type TransactionId = i64;
pub type CategoryId = i64;
pub type RecurringBillId = i64;
pub type GoalId = i64;

/// Whether an account adds to or subtracts from net worth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
}

/// A financial account as of a specific snapshot date
///
/// The balance is always tied to `balance_as_of`; there is no implicit
/// "current" balance anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub kind: AccountKind,
    /// ISO 4217 currency code (e.g. "USD")
    pub currency: String,
    /// Balance in minor units as of `balance_as_of`
    pub balance: i64,
    pub balance_as_of: NaiveDate,
}

/// A single posted or pending transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub posted_on: NaiveDate,
    /// Signed amount in minor units; outflow negative. The sign is never
    /// re-derived from the description.
    pub amount: i64,
    pub description: String,
    /// None until the transaction has been categorized
    pub category_id: Option<CategoryId>,
    /// True while the transaction has not cleared
    #[serde(default)]
    pub pending: bool,
}

/// A node in the category tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Parent category, if any. Cycles are rejected at snapshot build time.
    pub parent_id: Option<CategoryId>,
}

/// Closed amount range in minor units, `low <= high`
///
/// A point amount is a range with `low == high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AmountRange {
    pub low: i64,
    pub high: i64,
}

impl AmountRange {
    pub fn point(amount: i64) -> Self {
        Self {
            low: amount,
            high: amount,
        }
    }

    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    /// Midpoint, rounded toward the low end
    pub fn midpoint(&self) -> i64 {
        self.low + (self.high - self.low) / 2
    }

    pub fn contains(&self, amount: i64) -> bool {
        amount >= self.low && amount <= self.high
    }
}

/// Expected cadence of a recurring bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    /// Due on a fixed day of each month (clamped to month length, so day 31
    /// falls on Feb 28/29)
    MonthlyOnDay { day: u32 },
    /// Due every fixed number of days
    EveryDays { interval: i64 },
}

impl Periodicity {
    /// First occurrence strictly after `after`
    ///
    /// `known_next` is a caller-supplied due date (e.g. from the bill
    /// definition); it wins when it is still in the future.
    pub fn next_after(&self, after: NaiveDate, known_next: Option<NaiveDate>) -> NaiveDate {
        if let Some(due) = known_next {
            if due > after {
                return due;
            }
        }
        match self {
            Periodicity::EveryDays { interval } => {
                let step = (*interval).max(1);
                let mut date = known_next.unwrap_or(after);
                while date <= after {
                    date += Duration::days(step);
                }
                date
            }
            Periodicity::MonthlyOnDay { day } => {
                let mut date = clamped_day(after.year(), after.month(), *day);
                while date <= after {
                    date = next_month_on(date, *day);
                }
                date
            }
        }
    }

    /// The occurrence following `from`
    pub fn advance(&self, from: NaiveDate) -> NaiveDate {
        match self {
            Periodicity::EveryDays { interval } => from + Duration::days((*interval).max(1)),
            Periodicity::MonthlyOnDay { day } => next_month_on(from, *day),
        }
    }
}

/// Date in the given month with the day clamped to the month's length
pub(crate) fn clamped_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let last = days_in_month(year, month);
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start"))
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_next = NaiveDate::from_ymd_opt(ny, nm, 1).expect("valid month start");
    first_next.pred_opt().expect("previous day exists").day()
}

fn next_month_on(from: NaiveDate, day: u32) -> NaiveDate {
    let (ny, nm) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };
    clamped_day(ny, nm, day)
}

/// Where a recurring bill definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BillSource {
    /// The user confirmed this bill exists
    UserConfirmed,
    /// The recurrence detector proposed it
    Detected,
}

/// A known recurring bill or subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RecurringBillDefinition {
    pub id: RecurringBillId,
    pub name: String,
    pub category_id: CategoryId,
    /// Expected amount per occurrence, signed minor units (outflow negative).
    /// A range captures variable-amount bills like utilities.
    pub amount: AmountRange,
    pub periodicity: Periodicity,
    pub source: BillSource,
    /// Next known due date, if the schedule has been anchored
    pub next_due: Option<NaiveDate>,
}

/// A savings or payoff goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Goal {
    pub id: GoalId,
    pub name: String,
    /// Target amount in minor units
    pub target_amount: i64,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub account_ids: Vec<AccountId>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

/// The raw ledger payload an ingestion adapter hands to the engine
///
/// This is the documented JSON-compatible input shape. Record order is
/// irrelevant: the snapshot fingerprint is computed over records sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLedger {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub recurring_bills: Vec<RecurringBillDefinition>,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

/// Half-open date interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> crate::Result<Self> {
        if start > end {
            return Err(crate::Error::Validation(format!(
                "period start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The calendar month containing `date`
    pub fn month_of(date: NaiveDate) -> Self {
        let start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("month start");
        let end = next_month_on(start, 1);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// A single hypothetical mutation inside a what-if delta
///
/// Scale factors are expressed in basis points (10_000 = 1.0x) so the
/// mutation itself stays integer-valued; scaled amounts round half away
/// from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddTransaction { transaction: Transaction },
    RemoveTransaction { id: TransactionId },
    ScaleTransaction { id: TransactionId, factor_bp: i64 },
    AddRecurringBill { bill: RecurringBillDefinition },
    RemoveRecurringBill { id: RecurringBillId },
    ScaleRecurringBill { id: RecurringBillId, factor_bp: i64 },
    /// Scale every recurring bill currently in the category, including bills
    /// introduced by earlier mutations in the same delta
    ScaleCategoryBills { category_id: CategoryId, factor_bp: i64 },
}

/// An ordered sequence of hypothetical mutations
///
/// Application order is significant and is never reordered by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WhatIfDelta {
    pub mutations: Vec<Mutation>,
}

/// Scale a minor-unit amount by a basis-point factor, rounding half away
/// from zero
pub(crate) fn scale_minor_units(amount: i64, factor_bp: i64) -> i64 {
    let scaled = i128::from(amount) * i128::from(factor_bp);
    let half = 5_000i128 * if scaled >= 0 { 1 } else { -1 };
    ((scaled + half) / 10_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_period_contains_half_open() {
        let p = Period::new(d(2026, 1, 1), d(2026, 2, 1)).unwrap();
        assert!(p.contains(d(2026, 1, 1)));
        assert!(p.contains(d(2026, 1, 31)));
        assert!(!p.contains(d(2026, 2, 1)));
        assert_eq!(p.num_days(), 31);
    }

    #[test]
    fn test_period_rejects_inverted() {
        assert!(Period::new(d(2026, 2, 1), d(2026, 1, 1)).is_err());
    }

    #[test]
    fn test_monthly_on_day_clamps_to_month_length() {
        let p = Periodicity::MonthlyOnDay { day: 31 };
        let next = p.next_after(d(2026, 1, 31), None);
        assert_eq!(next, d(2026, 2, 28));
        assert_eq!(p.advance(next), d(2026, 3, 31));
    }

    #[test]
    fn test_every_days_honors_known_next() {
        let p = Periodicity::EveryDays { interval: 14 };
        // Future due date wins
        assert_eq!(
            p.next_after(d(2026, 3, 1), Some(d(2026, 3, 10))),
            d(2026, 3, 10)
        );
        // Stale due date is stepped forward past `after`
        assert_eq!(
            p.next_after(d(2026, 3, 1), Some(d(2026, 2, 20))),
            d(2026, 3, 6)
        );
    }

    #[test]
    fn test_amount_range_midpoint() {
        assert_eq!(AmountRange::point(-999).midpoint(), -999);
        assert_eq!(AmountRange::new(-1100, -900).midpoint(), -1000);
        assert!(AmountRange::new(-1100, -900).contains(-1000));
        assert!(!AmountRange::new(-1100, -900).contains(-800));
    }

    #[test]
    fn test_scale_minor_units_rounds_half_away_from_zero() {
        assert_eq!(scale_minor_units(-999, 11_000), -1099); // -1098.9 rounds away
        assert_eq!(scale_minor_units(1000, 10_000), 1000);
        assert_eq!(scale_minor_units(-5, 15_000), -8); // -7.5 rounds to -8
        assert_eq!(scale_minor_units(5, 15_000), 8);
    }

    #[test]
    fn test_raw_ledger_json_shape() {
        let json = r#"{
            "accounts": [{"id": 1, "name": "Checking", "kind": "asset",
                          "currency": "USD", "balance": 250000,
                          "balance_as_of": "2026-06-01"}],
            "transactions": [{"id": 10, "account_id": 1,
                              "posted_on": "2026-05-14", "amount": -999,
                              "description": "NETFLIX.COM", "category_id": null}]
        }"#;
        let raw: RawLedger = serde_json::from_str(json).unwrap();
        assert_eq!(raw.accounts.len(), 1);
        assert_eq!(raw.transactions[0].amount, -999);
        assert!(!raw.transactions[0].pending);
        assert!(raw.categories.is_empty());
    }
}
