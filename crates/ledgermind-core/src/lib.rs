//! LedgerMind Core Library
//!
//! Deterministic computation engine behind the LedgerMind assistant:
//! - Immutable, fingerprinted ledger snapshots
//! - Hierarchical category aggregation over date windows
//! - Monthly trend series with anomaly flags
//! - Recurring charge detection with graded confidence
//! - Cashflow forecasting with widening uncertainty bounds
//! - What-if scenario simulation against derived snapshots
//! - Tool dispatch facade for LLM orchestration layers
//!
//! All money is integer minor units; every result is reproducible from the
//! snapshot fingerprint it cites.

pub mod aggregate;
pub mod detect;
pub mod error;
pub mod forecast;
pub mod models;
pub mod simulate;
pub mod snapshot;
pub mod tools;
pub mod trends;

/// Test utilities including ledger fixture builders
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregate::{summarize, CategorySummary, PeriodSummary};
pub use detect::{detect_recurring, normalize_merchant, DetectionConfig, RecurringCandidate};
pub use error::{Error, Result};
pub use forecast::{forecast, Forecast, ForecastConfig, ForecastPoint};
pub use models::{
    Account, AccountId, AccountKind, AmountRange, BillSource, Category, CategoryId, Goal, GoalId,
    Mutation, Period, Periodicity, RawLedger, RecurringBillDefinition, RecurringBillId,
    Transaction, TransactionId, WhatIfDelta,
};
pub use simulate::{simulate, BalanceDelta, Simulation, SimulationDiff};
pub use snapshot::LedgerSnapshot;
pub use tools::{
    EngineConfig, ToolEngine, ToolFailure, ToolKind, ToolPayload, ToolRequest, ToolResult,
    ToolSpec,
};
pub use trends::{net_trend, trends, TrendConfig, TrendPoint, TrendSeries};
