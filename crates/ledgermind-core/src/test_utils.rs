//! Ledger fixture builders for tests
//!
//! Programmatic construction of raw ledgers and snapshots so tests don't
//! hand-write record collections. Enabled for this crate's own tests and,
//! via the `test-utils` feature, for downstream integration tests.

use chrono::NaiveDate;

use crate::models::{
    Account, AccountId, AccountKind, AmountRange, BillSource, Category, CategoryId, Periodicity,
    RawLedger, RecurringBillDefinition, RecurringBillId, Transaction, TransactionId,
};
use crate::snapshot::LedgerSnapshot;

/// Fluent builder for raw ledger fixtures
#[derive(Debug, Default)]
pub struct LedgerBuilder {
    raw: RawLedger,
}

impl LedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset account with a balance as of 2026-01-01
    pub fn account(mut self, id: AccountId, name: &str, balance: i64) -> Self {
        self.raw.accounts.push(Account {
            id,
            name: name.to_string(),
            kind: AccountKind::Asset,
            currency: "USD".to_string(),
            balance,
            balance_as_of: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        });
        self
    }

    pub fn category(mut self, id: CategoryId, name: &str, parent_id: Option<CategoryId>) -> Self {
        self.raw.categories.push(Category {
            id,
            name: name.to_string(),
            parent_id,
        });
        self
    }

    pub fn tx(
        mut self,
        id: TransactionId,
        account_id: AccountId,
        posted_on: NaiveDate,
        amount: i64,
        description: &str,
        category_id: Option<CategoryId>,
    ) -> Self {
        self.raw.transactions.push(Transaction {
            id,
            account_id,
            posted_on,
            amount,
            description: description.to_string(),
            category_id,
            pending: false,
        });
        self
    }

    /// Add a monthly charge of `amount` on the given day for `months`
    /// consecutive months starting at `first`, with ids from `first_id`
    pub fn monthly_charges(
        mut self,
        first_id: TransactionId,
        account_id: AccountId,
        first: NaiveDate,
        months: u32,
        amount: i64,
        description: &str,
        category_id: Option<CategoryId>,
    ) -> Self {
        let cadence = Periodicity::MonthlyOnDay {
            day: chrono::Datelike::day(&first),
        };
        let mut date = first;
        for offset in 0..months {
            self = self.tx(
                first_id + i64::from(offset),
                account_id,
                date,
                amount,
                description,
                category_id,
            );
            date = cadence.advance(date);
        }
        self
    }

    pub fn monthly_bill(
        mut self,
        id: RecurringBillId,
        name: &str,
        category_id: CategoryId,
        amount: i64,
        day: u32,
        next_due: Option<NaiveDate>,
    ) -> Self {
        self.raw.recurring_bills.push(RecurringBillDefinition {
            id,
            name: name.to_string(),
            category_id,
            amount: AmountRange::point(amount),
            periodicity: Periodicity::MonthlyOnDay { day },
            source: BillSource::UserConfirmed,
            next_due,
        });
        self
    }

    pub fn build_raw(self) -> RawLedger {
        self.raw
    }

    pub fn build_snapshot(self, as_of: NaiveDate) -> LedgerSnapshot {
        LedgerSnapshot::build(self.raw, as_of).expect("fixture ledger is valid")
    }
}

/// A small but realistic fixture: checking account, category tree, six
/// months of groceries/dining spend plus a monthly streaming subscription
pub fn sample_ledger() -> LedgerBuilder {
    let d = |m: u32, day: u32| NaiveDate::from_ymd_opt(2026, m, day).unwrap();
    let mut builder = LedgerBuilder::new()
        .account(1, "Checking", 250_000)
        .category(10, "Living", None)
        .category(11, "Groceries", Some(10))
        .category(12, "Dining", Some(10))
        .category(20, "Subscriptions", None)
        .category(21, "Streaming", Some(20))
        .monthly_charges(100, 1, d(1, 15), 6, -1_599, "NETFLIX.COM 1234", Some(21));

    let mut id = 200;
    for month in 1..=6u32 {
        builder = builder
            .tx(id, 1, d(month, 3), -8_500, "SAFEWAY STORE 77", Some(11))
            .tx(id + 1, 1, d(month, 18), -6_200, "SAFEWAY STORE 77", Some(11))
            .tx(id + 2, 1, d(month, 21), -3_400, "THAI PALACE", Some(12));
        id += 3;
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_ledger_builds() {
        let snapshot = sample_ledger().build_snapshot(NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        assert_eq!(snapshot.accounts().count(), 1);
        assert_eq!(snapshot.categories().count(), 5);
        // 6 subscription charges + 18 living charges
        assert_eq!(snapshot.transactions().len(), 24);
    }

    #[test]
    fn test_monthly_charges_land_on_same_day() {
        let raw = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .monthly_charges(
                1,
                1,
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
                3,
                -999,
                "GYM",
                None,
            )
            .build_raw();
        let dates: Vec<_> = raw.transactions.iter().map(|t| t.posted_on).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            ]
        );
    }
}
