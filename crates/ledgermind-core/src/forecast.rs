//! Cashflow forecasting
//!
//! Projects future balances by combining three layers:
//! 1. scheduled recurring bills with known cadences (deterministic),
//! 2. detected recurring candidates weighted by confidence (probabilistic),
//! 3. a trailing baseline spend rate with anomalous months excluded.
//!
//! The output is always an interval. Bounds widen monotonically with the
//! horizon; a longer forecast can never look more certain than a shorter
//! one.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::detect::{detect_recurring, DetectionConfig, RecurringCandidate};
use crate::error::{Error, Result};
use crate::models::{AmountRange, Period, TransactionId};
use crate::snapshot::LedgerSnapshot;
use crate::trends::{month_start, net_trend, TrendConfig};

/// Forecast thresholds
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Minimum days of transaction history required before any forecast is
    /// produced; shorter history fails with `InsufficientHistory`
    pub min_history_days: i64,
    /// Trailing window the baseline spend rate is estimated from
    pub baseline_lookback_days: i64,
    /// Floor for the daily noise term in minor units, so bounds widen even
    /// on eerily regular history
    pub daily_noise_floor_minor: i64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_days: 60,
            baseline_lookback_days: 90,
            daily_noise_floor_minor: 50,
        }
    }
}

/// One projected day
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    /// Expected balance in minor units
    pub projected_balance: i64,
    pub lower_bound: i64,
    pub upper_bound: i64,
}

/// Result of a forecast call, with the inputs it cited
#[derive(Debug, Clone)]
pub struct Forecast {
    pub points: Vec<ForecastPoint>,
    /// Transactions the baseline and detection layers rested on
    pub cited_transaction_ids: Vec<TransactionId>,
}

/// Project balances `horizon_days` past the snapshot date
pub fn forecast(
    snapshot: &LedgerSnapshot,
    horizon_days: i64,
    detection: &DetectionConfig,
    trend: &TrendConfig,
    config: &ForecastConfig,
) -> Result<Forecast> {
    if horizon_days <= 0 {
        return Err(Error::Validation(format!(
            "forecast horizon must be positive, got {}",
            horizon_days
        )));
    }

    let as_of = snapshot.as_of();
    let earliest = snapshot
        .transactions()
        .iter()
        .map(|t| t.posted_on)
        .min()
        .unwrap_or(as_of);
    let available_days = (as_of - earliest).num_days();
    if available_days < config.min_history_days {
        return Err(Error::InsufficientHistory {
            required_days: config.min_history_days,
            available_days,
        });
    }

    let history = Period::new(earliest, as_of)?;
    let lookback_start = (as_of - Duration::days(config.baseline_lookback_days)).max(earliest);
    let lookback = Period::new(lookback_start, as_of)?;

    // Anomalous months, judged against the full history so early lookback
    // months still have trailing context
    let anomalous_months: HashSet<NaiveDate> = net_trend(snapshot, history, trend)
        .filter(|p| p.anomaly)
        .map(|p| p.period_start)
        .collect();

    // Detected recurring patterns are modeled explicitly below, so their
    // history is pulled out of the baseline to avoid counting them twice
    let candidates = deduped_candidates(snapshot, history, detection);
    let recurring_ids: HashSet<TransactionId> = candidates
        .iter()
        .flat_map(|c| c.supporting_transaction_ids.iter().copied())
        .collect();

    let (daily_net, daily_noise, cited_baseline) =
        baseline_rate(snapshot, lookback, &anomalous_months, &recurring_ids);
    let daily_noise = daily_noise.max(config.daily_noise_floor_minor as f64);

    debug!(
        fingerprint = %snapshot.fingerprint(),
        daily_net,
        daily_noise,
        candidates = candidates.len(),
        anomalous_months = anomalous_months.len(),
        "Forecast baseline estimated"
    );

    // Deterministic layer: bills on their schedules
    let mut scheduled: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let end = as_of + Duration::days(horizon_days);
    for bill in snapshot.recurring_bills() {
        let mut due = bill.periodicity.next_after(as_of, bill.next_due);
        while due <= end {
            *scheduled.entry(due).or_insert(0) += bill.amount.midpoint();
            due = bill.periodicity.advance(due);
        }
    }

    // Probabilistic layer: candidates weighted by confidence, with the
    // unconfident remainder feeding the uncertainty band
    let mut weighted: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut unconfident: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for candidate in &candidates {
        let amount = candidate.amount_range.midpoint();
        let expected = (amount as f64 * candidate.confidence).round() as i64;
        let residual = (amount.abs() as f64 * (1.0 - candidate.confidence)).round() as i64;

        let mut due = candidate.next_expected_on;
        while due <= as_of {
            due += Duration::days(candidate.periodicity_days.max(1));
        }
        while due <= end {
            *weighted.entry(due).or_insert(0) += expected;
            *unconfident.entry(due).or_insert(0) += residual;
            due += Duration::days(candidate.periodicity_days.max(1));
        }
    }

    let start_balance = snapshot.net_balance();
    let mut points = Vec::with_capacity(horizon_days as usize);
    let mut event_total = 0i64;
    let mut uncertainty_total = 0i64;
    for day in 1..=horizon_days {
        let date = as_of + Duration::days(day);
        event_total += scheduled.get(&date).copied().unwrap_or(0);
        event_total += weighted.get(&date).copied().unwrap_or(0);
        uncertainty_total += unconfident.get(&date).copied().unwrap_or(0);

        let drift = (daily_net * day as f64).round() as i64;
        let projected_balance = start_balance + drift + event_total;

        // sqrt growth for the noise term plus accumulated pattern
        // uncertainty; both are non-decreasing in the horizon, so the band
        // can only widen
        let half_width =
            (daily_noise * (day as f64).sqrt()).round() as i64 + uncertainty_total;

        points.push(ForecastPoint {
            date,
            projected_balance,
            lower_bound: projected_balance - half_width,
            upper_bound: projected_balance + half_width,
        });
    }

    let mut cited: Vec<TransactionId> = cited_baseline;
    cited.extend(recurring_ids.iter().copied());
    cited.sort_unstable();
    cited.dedup();

    Ok(Forecast {
        points,
        cited_transaction_ids: cited,
    })
}

/// Detected candidates minus those already covered by a defined bill
///
/// A candidate is considered covered when its midpoint falls inside a
/// defined bill's amount range widened by the detection amount tolerance.
fn deduped_candidates(
    snapshot: &LedgerSnapshot,
    history: Period,
    detection: &DetectionConfig,
) -> Vec<RecurringCandidate> {
    detect_recurring(snapshot, history, detection)
        .into_iter()
        .filter(|candidate| {
            let midpoint = candidate.amount_range.midpoint();
            !snapshot.recurring_bills().any(|bill| {
                let widened = AmountRange::new(
                    bill.amount.low - detection.amount_tolerance_minor,
                    bill.amount.high + detection.amount_tolerance_minor,
                );
                widened.contains(midpoint)
            })
        })
        .collect()
}

/// Trailing daily net rate and daily noise, with anomalous months and
/// explicitly-modeled recurring transactions excluded
fn baseline_rate(
    snapshot: &LedgerSnapshot,
    lookback: Period,
    anomalous_months: &HashSet<NaiveDate>,
    recurring_ids: &HashSet<TransactionId>,
) -> (f64, f64, Vec<TransactionId>) {
    let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut day = lookback.start;
    while day < lookback.end {
        if !anomalous_months.contains(&month_start(day)) {
            per_day.insert(day, 0);
        }
        day += Duration::days(1);
    }

    let mut cited = Vec::new();
    for tx in snapshot.transactions() {
        if !lookback.contains(tx.posted_on) || recurring_ids.contains(&tx.id) {
            continue;
        }
        if let Some(total) = per_day.get_mut(&tx.posted_on) {
            *total += tx.amount;
            cited.push(tx.id);
        }
    }

    let days = per_day.len();
    if days == 0 {
        return (0.0, 0.0, cited);
    }
    let sum: i64 = per_day.values().sum();
    let mean = sum as f64 / days as f64;
    let noise = if days > 1 {
        let variance = per_day
            .values()
            .map(|&v| {
                let dev = v as f64 - mean;
                dev * dev
            })
            .sum::<f64>()
            / (days - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };
    (mean, noise, cited)
}
