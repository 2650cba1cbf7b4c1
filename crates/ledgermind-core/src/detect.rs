//! Recurrence detection
//!
//! Finds recurring bill/subscription candidates in transaction history:
//! transactions are grouped by a normalized merchant key, consecutive date
//! deltas are checked against a consistent interval, and amounts are checked
//! against a tolerance band. Candidates carry a graded confidence, never a
//! bare boolean.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::models::{AmountRange, Period, Periodicity, Transaction, TransactionId};
use crate::snapshot::LedgerSnapshot;

/// Detection thresholds
///
/// The source material fixes none of these values, so every band is
/// configuration rather than a constant.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Minimum occurrences before a candidate can exist
    pub min_occurrences: usize,
    /// Allowed deviation of each consecutive gap from the candidate interval
    pub interval_tolerance_days: i64,
    /// Relative amount tolerance around the median
    pub amount_tolerance_pct: f64,
    /// Absolute amount tolerance in minor units; the effective band is the
    /// larger of this and the percentage band
    pub amount_tolerance_minor: i64,
    /// Intervals shorter than this are treated as shopping noise
    pub min_interval_days: i64,
    /// Intervals longer than this are not considered recurring
    pub max_interval_days: i64,
    /// Candidates scoring below this are dropped
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,        // 2 could be coincidence
            interval_tolerance_days: 3,
            amount_tolerance_pct: 0.05, // 5%
            amount_tolerance_minor: 300,
            min_interval_days: 4,
            max_interval_days: 400, // just over a year
            min_confidence: 0.2,
        }
    }
}

/// A detected, probabilistically-scored recurring charge pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringCandidate {
    /// Normalized merchant key the group was built from
    pub merchant_key: String,
    /// Observed interval between occurrences, in days
    pub periodicity_days: i64,
    /// Signed amount range across supporting occurrences (outflow negative)
    pub amount_range: AmountRange,
    /// Graded score in [0, 1]; grows with occurrence count and tightness of
    /// the interval and amount bands
    pub confidence: f64,
    /// Every transaction the pattern rests on, ascending by id
    pub supporting_transaction_ids: Vec<TransactionId>,
    /// Projected next occurrence under the winning interpretation
    pub next_expected_on: NaiveDate,
}

/// Detect recurring charge candidates within a lookback window
///
/// Only outflows participate. Results are sorted by descending confidence,
/// then merchant key, so output order is deterministic.
pub fn detect_recurring(
    snapshot: &LedgerSnapshot,
    lookback: Period,
    config: &DetectionConfig,
) -> Vec<RecurringCandidate> {
    let mut by_merchant: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
    for tx in snapshot.transactions() {
        if tx.amount >= 0 {
            continue; // Skip income/credits
        }
        if !lookback.contains(tx.posted_on) {
            continue;
        }
        by_merchant
            .entry(normalize_merchant(&tx.description))
            .or_default()
            .push(tx);
    }

    let mut candidates = Vec::new();
    for (merchant_key, mut group) in by_merchant {
        if group.len() < config.min_occurrences {
            continue;
        }
        group.sort_by_key(|t| (t.posted_on, t.id));

        if let Some(candidate) = evaluate_group(&merchant_key, &group, config) {
            debug!(
                merchant = %candidate.merchant_key,
                interval = candidate.periodicity_days,
                confidence = candidate.confidence,
                occurrences = candidate.supporting_transaction_ids.len(),
                "Recurring candidate found"
            );
            candidates.push(candidate);
        }
    }

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.merchant_key.cmp(&b.merchant_key))
    });
    candidates
}

fn evaluate_group(
    merchant_key: &str,
    group: &[&Transaction],
    config: &DetectionConfig,
) -> Option<RecurringCandidate> {
    let gaps: Vec<i64> = group
        .windows(2)
        .map(|w| (w[1].posted_on - w[0].posted_on).num_days())
        .collect();
    let interval = median_i64(&gaps);
    if interval < config.min_interval_days || interval > config.max_interval_days {
        return None;
    }

    let magnitudes: Vec<i64> = group.iter().map(|t| t.amount.abs()).collect();
    let median_amount = median_i64(&magnitudes);
    let amount_band = amount_tolerance(median_amount, config);

    // Chain occurrences: each supporter must land within the interval
    // tolerance of the previous supporter and inside the amount band.
    let mut supporting: Vec<&Transaction> = Vec::new();
    for tx in group {
        if (tx.amount.abs() - median_amount).abs() > amount_band {
            continue;
        }
        match supporting.last() {
            None => supporting.push(tx),
            Some(last) => {
                let gap = (tx.posted_on - last.posted_on).num_days();
                if (gap - interval).abs() <= config.interval_tolerance_days {
                    supporting.push(tx);
                }
            }
        }
    }
    if supporting.is_empty() || supporting.len() < config.min_occurrences {
        return None;
    }

    let supporting_gaps: Vec<i64> = supporting
        .windows(2)
        .map(|w| (w[1].posted_on - w[0].posted_on).num_days())
        .collect();

    // Two readings can fit the same history, e.g. "every 30 days" and
    // "monthly on day 15". Prefer the one with the smaller total residual
    // across the observed occurrences.
    let interval_residual: i64 = supporting_gaps.iter().map(|g| (g - interval).abs()).sum();
    let last_seen = supporting.last().expect("non-empty").posted_on;
    let interval_next = last_seen + chrono::Duration::days(interval);

    let next_expected_on = match monthly_interpretation(&supporting) {
        Some((monthly_residual, monthly_next)) if monthly_residual < interval_residual => {
            monthly_next
        }
        _ => interval_next,
    };

    // Confidence grows with occurrence count and tightens with both bands
    let n = supporting.len();
    let count_term = 1.0 - config.min_occurrences as f64 / (n + 1) as f64;
    let mean_gap_residual =
        interval_residual as f64 / supporting_gaps.len().max(1) as f64;
    let interval_tightness =
        (1.0 - mean_gap_residual / (config.interval_tolerance_days + 1) as f64).clamp(0.0, 1.0);
    let mean_amount_dev = supporting
        .iter()
        .map(|t| (t.amount.abs() - median_amount).abs() as f64)
        .sum::<f64>()
        / n as f64;
    let amount_tightness = (1.0 - mean_amount_dev / amount_band.max(1) as f64).clamp(0.0, 1.0);
    let confidence =
        (count_term * (0.5 + 0.25 * interval_tightness + 0.25 * amount_tightness)).clamp(0.0, 1.0);

    if confidence < config.min_confidence {
        return None;
    }

    let low = supporting.iter().map(|t| t.amount).min().expect("non-empty");
    let high = supporting.iter().map(|t| t.amount).max().expect("non-empty");
    let mut ids: Vec<TransactionId> = supporting.iter().map(|t| t.id).collect();
    ids.sort_unstable();

    Some(RecurringCandidate {
        merchant_key: merchant_key.to_string(),
        periodicity_days: interval,
        amount_range: AmountRange::new(low, high),
        confidence,
        supporting_transaction_ids: ids,
        next_expected_on,
    })
}

/// Residual and next date under a "monthly on day N" reading, when the
/// occurrences plausibly sit on a calendar cadence
fn monthly_interpretation(supporting: &[&Transaction]) -> Option<(i64, NaiveDate)> {
    let first = supporting.first()?.posted_on;
    let cadence = Periodicity::MonthlyOnDay { day: first.day() };

    let mut expected = first;
    let mut residual = 0i64;
    for tx in &supporting[1..] {
        expected = cadence.advance(expected);
        residual += (tx.posted_on - expected).num_days().abs();
        // Re-anchor on the actual date so one late payment doesn't cascade
        expected = tx.posted_on;
    }
    let next = cadence.next_after(supporting.last()?.posted_on, None);
    Some((residual, next))
}

fn amount_tolerance(median_amount: i64, config: &DetectionConfig) -> i64 {
    let pct_band = (median_amount as f64 * config.amount_tolerance_pct).round() as i64;
    pct_band.max(config.amount_tolerance_minor)
}

fn median_i64(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    }
}

/// Normalize a transaction description into a merchant key
///
/// Lowercases, strips digits and punctuation, collapses whitespace. Keeps
/// store-number variants of the same merchant together ("SAFEWAY #1234" and
/// "SAFEWAY #5678" both become "safeway").
pub fn normalize_merchant(description: &str) -> String {
    static NON_ALPHA: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let non_alpha = NON_ALPHA.get_or_init(|| Regex::new(r"[^a-z ]+").expect("static regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let lowered = description.to_lowercase();
    let stripped = non_alpha.replace_all(&lowered, " ");
    let collapsed = spaces.replace_all(stripped.trim(), " ").to_string();
    if collapsed.is_empty() {
        "unknown".to_string()
    } else {
        collapsed
    }
}
