//! Rolling trend statistics
//!
//! Monthly totals for a category (or the whole ledger), month-over-month
//! deltas, and anomaly flags against a trailing moving average. The series
//! is lazy: statistics for a period are computed when the iterator reaches
//! it, and a series can be restarted and re-consumed.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{CategoryId, Period, TransactionId};
use crate::snapshot::LedgerSnapshot;

/// Anomaly thresholds for trend analysis
///
/// Nothing here is hard-coded at call sites; callers tune the bands.
#[derive(Debug, Clone)]
pub struct TrendConfig {
    /// A period is anomalous when its total deviates from the trailing mean
    /// by more than this multiple of the trailing standard deviation
    pub anomaly_multiplier: f64,
    /// Minimum trailing sample count before any anomaly can be flagged;
    /// avoids false positives on sparse history
    pub min_trailing_periods: usize,
    /// Number of trailing periods the moving statistics look back over
    pub trailing_window: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            anomaly_multiplier: 3.0,   // 3 sigma
            min_trailing_periods: 3,   // need 3 periods of history first
            trailing_window: 6,        // roll over the last 6 months
        }
    }
}

/// One period in a trend series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_start: NaiveDate,
    /// Signed total for the period in minor units
    pub total: i64,
    /// Change versus the previous period; None for the first period
    pub delta_vs_previous: Option<i64>,
    pub anomaly: bool,
}

/// Lazy, finite, restartable sequence of monthly trend points
///
/// Ordered chronologically ascending. Cloning preserves the cursor;
/// [`TrendSeries::restarted`] returns a fresh cursor over the same data.
#[derive(Debug, Clone)]
pub struct TrendSeries {
    totals: Vec<(NaiveDate, i64)>,
    cited: Vec<TransactionId>,
    config: TrendConfig,
    pos: usize,
}

impl TrendSeries {
    /// Ids of the transactions that contributed to any period, ascending
    pub fn cited_transaction_ids(&self) -> &[TransactionId] {
        &self.cited
    }

    /// A fresh iterator over the same series
    pub fn restarted(&self) -> Self {
        Self {
            pos: 0,
            ..self.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    fn stats_before(&self, pos: usize) -> Option<(f64, f64)> {
        let lo = pos.saturating_sub(self.config.trailing_window);
        let trailing = &self.totals[lo..pos];
        if trailing.len() < self.config.min_trailing_periods.max(2) {
            return None;
        }
        let n = trailing.len() as f64;
        let mean = trailing.iter().map(|&(_, t)| t as f64).sum::<f64>() / n;
        // Sample variance: small trailing windows shouldn't understate spread
        let variance = trailing
            .iter()
            .map(|&(_, t)| {
                let dev = t as f64 - mean;
                dev * dev
            })
            .sum::<f64>()
            / (n - 1.0);
        Some((mean, variance.sqrt()))
    }
}

impl Iterator for TrendSeries {
    type Item = TrendPoint;

    fn next(&mut self) -> Option<TrendPoint> {
        if self.pos >= self.totals.len() {
            return None;
        }
        let (period_start, total) = self.totals[self.pos];
        let delta_vs_previous = if self.pos == 0 {
            None
        } else {
            Some(total - self.totals[self.pos - 1].1)
        };

        let anomaly = match self.stats_before(self.pos) {
            Some((mean, std_dev)) => {
                let deviation = (total as f64 - mean).abs();
                if std_dev > 0.0 {
                    deviation > self.config.anomaly_multiplier * std_dev
                } else {
                    // Perfectly flat history: any movement is anomalous
                    deviation > 0.0
                }
            }
            None => false,
        };

        self.pos += 1;
        Some(TrendPoint {
            period_start,
            total,
            delta_vs_previous,
            anomaly,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.totals.len() - self.pos;
        (remaining, Some(remaining))
    }
}

/// Monthly trend series for one category (descendants included)
///
/// Covers every calendar month overlapping `window`, including months with
/// no activity (total 0), so deltas and trailing statistics stay aligned to
/// the calendar.
pub fn trends(
    snapshot: &LedgerSnapshot,
    category_id: CategoryId,
    window: Period,
    config: &TrendConfig,
) -> Result<TrendSeries> {
    if snapshot.category(category_id).is_none() {
        return Err(Error::Validation(format!(
            "unknown category {}",
            category_id
        )));
    }
    Ok(series_for(snapshot, Some(category_id), window, config))
}

/// Monthly net trend across the whole ledger
///
/// Used by the forecaster to find (and then exclude) anomalous baseline
/// months.
pub fn net_trend(snapshot: &LedgerSnapshot, window: Period, config: &TrendConfig) -> TrendSeries {
    series_for(snapshot, None, window, config)
}

fn series_for(
    snapshot: &LedgerSnapshot,
    category_id: Option<CategoryId>,
    window: Period,
    config: &TrendConfig,
) -> TrendSeries {
    let months = months_covering(window);
    let mut totals: Vec<(NaiveDate, i64)> = months.iter().map(|&m| (m, 0)).collect();
    let mut cited = Vec::new();

    for tx in snapshot.transactions() {
        if !window.contains(tx.posted_on) {
            continue;
        }
        if let Some(wanted) = category_id {
            let Some(assigned) = tx.category_id else {
                continue;
            };
            if !snapshot.category_is_under(assigned, wanted) {
                continue;
            }
        }
        let month = month_start(tx.posted_on);
        if let Ok(idx) = totals.binary_search_by_key(&month, |&(m, _)| m) {
            totals[idx].1 += tx.amount;
            cited.push(tx.id);
        }
    }
    cited.sort_unstable();

    TrendSeries {
        totals,
        cited,
        config: config.clone(),
        pos: 0,
    }
}

pub(crate) fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("month start")
}

fn months_covering(window: Period) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = month_start(window.start);
    while current < window.end {
        months.push(current);
        current = Period::month_of(current).end;
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::LedgerBuilder;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Six months of category totals with one obvious spike
    fn spiky_snapshot() -> LedgerSnapshot {
        let totals = [-100i64, -110, -105, -120, -600, -115];
        let mut builder = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Dining", None);
        for (i, &total) in totals.iter().enumerate() {
            let month = i as u32 + 1;
            builder = builder.tx(
                i as i64 + 1,
                1,
                d(2026, month, 10),
                total,
                "THAI PALACE",
                Some(1),
            );
        }
        builder.build_snapshot(d(2026, 7, 1))
    }

    #[test]
    fn test_only_spike_month_is_flagged() {
        let snapshot = spiky_snapshot();
        let window = Period::new(d(2026, 1, 1), d(2026, 7, 1)).unwrap();
        let series = trends(&snapshot, 1, window, &TrendConfig::default()).unwrap();

        let flags: Vec<bool> = series.map(|p| p.anomaly).collect();
        assert_eq!(flags, vec![false, false, false, false, true, false]);
    }

    #[test]
    fn test_deltas_and_ordering() {
        let snapshot = spiky_snapshot();
        let window = Period::new(d(2026, 1, 1), d(2026, 7, 1)).unwrap();
        let points: Vec<TrendPoint> = trends(&snapshot, 1, window, &TrendConfig::default())
            .unwrap()
            .collect();

        assert_eq!(points.len(), 6);
        assert_eq!(points[0].period_start, d(2026, 1, 1));
        assert_eq!(points[0].delta_vs_previous, None);
        assert_eq!(points[1].delta_vs_previous, Some(-10));
        assert_eq!(points[4].delta_vs_previous, Some(-480));
        assert!(points.windows(2).all(|w| w[0].period_start < w[1].period_start));
    }

    #[test]
    fn test_no_flags_on_sparse_history() {
        // Two periods of history can never satisfy min_trailing_periods = 3
        let snapshot = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Dining", None)
            .tx(1, 1, d(2026, 1, 10), -100, "A", Some(1))
            .tx(2, 1, d(2026, 2, 10), -9_000, "B", Some(1))
            .tx(3, 1, d(2026, 3, 10), -100, "C", Some(1))
            .build_snapshot(d(2026, 4, 1));
        let window = Period::new(d(2026, 1, 1), d(2026, 4, 1)).unwrap();
        let series = trends(&snapshot, 1, window, &TrendConfig::default()).unwrap();
        assert!(series.into_iter().all(|p| !p.anomaly));
    }

    #[test]
    fn test_series_is_restartable() {
        let snapshot = spiky_snapshot();
        let window = Period::new(d(2026, 1, 1), d(2026, 7, 1)).unwrap();
        let mut series = trends(&snapshot, 1, window, &TrendConfig::default()).unwrap();

        let first_pass: Vec<TrendPoint> = series.by_ref().collect();
        assert!(series.next().is_none());

        let second_pass: Vec<TrendPoint> = series.restarted().collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn test_rollup_into_parent_category() {
        let snapshot = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Living", None)
            .category(2, "Dining", Some(1))
            .tx(1, 1, d(2026, 1, 10), -500, "THAI PALACE", Some(2))
            .build_snapshot(d(2026, 2, 1));
        let window = Period::new(d(2026, 1, 1), d(2026, 2, 1)).unwrap();

        let parent: Vec<TrendPoint> = trends(&snapshot, 1, window, &TrendConfig::default())
            .unwrap()
            .collect();
        assert_eq!(parent[0].total, -500);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let snapshot = LedgerBuilder::new().account(1, "Checking", 0).build_snapshot(d(2026, 2, 1));
        let window = Period::new(d(2026, 1, 1), d(2026, 2, 1)).unwrap();
        assert!(trends(&snapshot, 42, window, &TrendConfig::default()).is_err());
    }

    #[test]
    fn test_empty_months_appear_as_zero() {
        let snapshot = LedgerBuilder::new()
            .account(1, "Checking", 0)
            .category(1, "Dining", None)
            .tx(1, 1, d(2026, 1, 10), -500, "THAI PALACE", Some(1))
            .tx(2, 1, d(2026, 3, 10), -600, "THAI PALACE", Some(1))
            .build_snapshot(d(2026, 4, 1));
        let window = Period::new(d(2026, 1, 1), d(2026, 4, 1)).unwrap();
        let totals: Vec<i64> = trends(&snapshot, 1, window, &TrendConfig::default())
            .unwrap()
            .map(|p| p.total)
            .collect();
        assert_eq!(totals, vec![-500, 0, -600]);
    }
}
