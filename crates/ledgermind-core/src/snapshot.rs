//! Ledger snapshots
//!
//! A snapshot is an immutable, validated view of a raw ledger as of a fixed
//! date, identified by a deterministic content fingerprint. All engines
//! operate on snapshots; nothing in the engine holds process-wide ledger
//! state. Building a snapshot validates referential integrity up front and
//! fails with `Error::Validation` rather than coercing or partially
//! accepting input.

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    Account, AccountId, Category, CategoryId, Goal, GoalId, RawLedger, RecurringBillDefinition,
    RecurringBillId, Transaction, TransactionId,
};

/// Maximum depth of the category tree (root counts as depth 1)
pub const MAX_CATEGORY_DEPTH: usize = 16;

/// Immutable, fingerprinted view of a ledger as of a fixed date
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    as_of: NaiveDate,
    fingerprint: String,
    /// Fingerprint of the snapshot this one was derived from by a what-if
    /// delta. Audit-only; the base snapshot itself is not retained.
    base_fingerprint: Option<String>,
    accounts: BTreeMap<AccountId, Account>,
    categories: BTreeMap<CategoryId, Category>,
    bills: BTreeMap<RecurringBillId, RecurringBillDefinition>,
    goals: BTreeMap<GoalId, Goal>,
    /// Sorted by id; binary-searchable and deterministic to iterate
    transactions: Vec<Transaction>,
    /// Ancestor chain per category, nearest parent first
    ancestors: BTreeMap<CategoryId, Vec<CategoryId>>,
}

impl LedgerSnapshot {
    /// Build a snapshot from raw ledger data
    ///
    /// Validates referential integrity (no dangling account/category
    /// references, no duplicate ids), rejects cyclic or over-deep category
    /// trees, and computes the content fingerprint. Identical inputs yield
    /// an identical fingerprint regardless of record order.
    pub fn build(raw: RawLedger, as_of: NaiveDate) -> Result<Self> {
        Self::build_inner(raw, as_of, None)
    }

    /// Build a derived snapshot that remembers its base fingerprint
    ///
    /// Used by the scenario simulator; the back-reference is non-owning and
    /// exists only for audit output.
    pub fn build_derived(
        raw: RawLedger,
        as_of: NaiveDate,
        base_fingerprint: String,
    ) -> Result<Self> {
        Self::build_inner(raw, as_of, Some(base_fingerprint))
    }

    fn build_inner(
        raw: RawLedger,
        as_of: NaiveDate,
        base_fingerprint: Option<String>,
    ) -> Result<Self> {
        let fingerprint = fingerprint_ledger(&raw, as_of);

        let accounts = index_by_id(raw.accounts, |a: &Account| a.id, "account")?;
        let categories = index_by_id(raw.categories, |c: &Category| c.id, "category")?;
        let bills = index_by_id(
            raw.recurring_bills,
            |b: &RecurringBillDefinition| b.id,
            "recurring bill",
        )?;
        let goals = index_by_id(raw.goals, |g: &Goal| g.id, "goal")?;

        let ancestors = resolve_ancestors(&categories)?;

        let mut transactions = raw.transactions;
        transactions.sort_by_key(|t| t.id);
        for pair in transactions.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(Error::Validation(format!(
                    "duplicate transaction id {}",
                    pair[0].id
                )));
            }
        }

        for tx in &transactions {
            if !accounts.contains_key(&tx.account_id) {
                return Err(Error::Validation(format!(
                    "transaction {} references unknown account {}",
                    tx.id, tx.account_id
                )));
            }
            if let Some(cat) = tx.category_id {
                if !categories.contains_key(&cat) {
                    return Err(Error::Validation(format!(
                        "transaction {} references unknown category {}",
                        tx.id, cat
                    )));
                }
            }
        }

        for bill in bills.values() {
            if !categories.contains_key(&bill.category_id) {
                return Err(Error::Validation(format!(
                    "recurring bill {} references unknown category {}",
                    bill.id, bill.category_id
                )));
            }
            if bill.amount.low > bill.amount.high {
                return Err(Error::Validation(format!(
                    "recurring bill {} has inverted amount range",
                    bill.id
                )));
            }
        }

        for goal in goals.values() {
            for account_id in &goal.account_ids {
                if !accounts.contains_key(account_id) {
                    return Err(Error::Validation(format!(
                        "goal {} references unknown account {}",
                        goal.id, account_id
                    )));
                }
            }
            for category_id in &goal.category_ids {
                if !categories.contains_key(category_id) {
                    return Err(Error::Validation(format!(
                        "goal {} references unknown category {}",
                        goal.id, category_id
                    )));
                }
            }
        }

        debug!(
            fingerprint = %fingerprint,
            transactions = transactions.len(),
            categories = categories.len(),
            "Snapshot built"
        );

        Ok(Self {
            as_of,
            fingerprint,
            base_fingerprint,
            accounts,
            categories,
            bills,
            goals,
            transactions,
            ancestors,
        })
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn base_fingerprint(&self) -> Option<&str> {
        self.base_fingerprint.as_deref()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn recurring_bills(&self) -> impl Iterator<Item = &RecurringBillDefinition> {
        self.bills.values()
    }

    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.values()
    }

    /// All transactions, sorted by id
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|idx| &self.transactions[idx])
    }

    /// Ancestor chain for a category, nearest parent first
    pub fn category_ancestors(&self, id: CategoryId) -> &[CategoryId] {
        self.ancestors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `id` equals `ancestor` or sits below it in the tree
    pub fn category_is_under(&self, id: CategoryId, ancestor: CategoryId) -> bool {
        id == ancestor || self.category_ancestors(id).contains(&ancestor)
    }

    /// Sum of account balances in minor units; liabilities carry negative
    /// balances
    pub fn net_balance(&self) -> i64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    /// Reconstruct the raw ledger this snapshot was built from
    ///
    /// Record order is normalized (sorted by id), which fingerprints
    /// identically to the original input.
    pub fn to_raw(&self) -> RawLedger {
        RawLedger {
            accounts: self.accounts.values().cloned().collect(),
            transactions: self.transactions.clone(),
            categories: self.categories.values().cloned().collect(),
            recurring_bills: self.bills.values().cloned().collect(),
            goals: self.goals.values().cloned().collect(),
        }
    }
}

/// Index records by id, rejecting duplicates
fn index_by_id<T, F>(records: Vec<T>, id_of: F, what: &str) -> Result<BTreeMap<i64, T>>
where
    F: Fn(&T) -> i64,
{
    let mut map = BTreeMap::new();
    for record in records {
        let id = id_of(&record);
        if map.insert(id, record).is_some() {
            return Err(Error::Validation(format!("duplicate {} id {}", what, id)));
        }
    }
    Ok(map)
}

/// Resolve ancestor chains, rejecting cycles, dangling parents, and trees
/// deeper than `MAX_CATEGORY_DEPTH`
fn resolve_ancestors(
    categories: &BTreeMap<CategoryId, Category>,
) -> Result<BTreeMap<CategoryId, Vec<CategoryId>>> {
    let mut ancestors = BTreeMap::new();

    for (&id, _) in categories {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);

        let mut current = id;
        while let Some(parent) = categories
            .get(&current)
            .and_then(|c| c.parent_id)
        {
            if !categories.contains_key(&parent) {
                return Err(Error::Validation(format!(
                    "category {} references unknown parent {}",
                    current, parent
                )));
            }
            if !visited.insert(parent) {
                return Err(Error::Validation(format!(
                    "category tree cycle detected at category {}",
                    parent
                )));
            }
            chain.push(parent);
            if chain.len() + 1 > MAX_CATEGORY_DEPTH {
                return Err(Error::Validation(format!(
                    "category {} exceeds maximum tree depth {}",
                    id, MAX_CATEGORY_DEPTH
                )));
            }
            current = parent;
        }

        ancestors.insert(id, chain);
    }

    Ok(ancestors)
}

/// Deterministic SHA-256 fingerprint over sorted-by-id records
///
/// Each record is serialized to canonical JSON and fed to the hasher behind
/// a section label, so reordering the input collections cannot change the
/// digest but moving a record between collections must.
fn fingerprint_ledger(raw: &RawLedger, as_of: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"as_of:");
    hasher.update(as_of.to_string().as_bytes());

    hash_section(&mut hasher, b"accounts", &raw.accounts, |a| a.id);
    hash_section(&mut hasher, b"categories", &raw.categories, |c| c.id);
    hash_section(&mut hasher, b"transactions", &raw.transactions, |t| t.id);
    hash_section(&mut hasher, b"recurring_bills", &raw.recurring_bills, |b| {
        b.id
    });
    hash_section(&mut hasher, b"goals", &raw.goals, |g| g.id);

    hex::encode(hasher.finalize())
}

fn hash_section<T, F>(hasher: &mut Sha256, label: &[u8], records: &[T], id_of: F)
where
    T: Serialize,
    F: Fn(&T) -> i64,
{
    hasher.update(b"\x00");
    hasher.update(label);
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by_key(|&i| id_of(&records[i]));
    for i in order {
        // Struct field order is fixed at compile time, so this encoding is
        // stable for identical record values.
        let encoded = serde_json::to_vec(&records[i]).expect("record serialization");
        hasher.update(b"\x1f");
        hasher.update(&encoded);
    }
}
