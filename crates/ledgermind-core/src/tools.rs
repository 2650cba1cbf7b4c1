//! Tool dispatch facade
//!
//! The single entry point the language-model orchestration layer calls.
//! Requests name a tool kind from a closed set and carry JSON parameters;
//! the facade validates both, routes to the engines, and always returns a
//! well-formed `ToolResult` — success or structured failure, never a raw
//! fault. Engines are not exposed to external callers directly.
//!
//! Results are citable: every `ToolResult` carries the snapshot fingerprint
//! it was computed from and the source record ids that fed it, so the model
//! can quote exact provenance.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, error, warn};

use crate::aggregate::{summarize, CategorySummary};
use crate::detect::{detect_recurring, DetectionConfig, RecurringCandidate};
use crate::error::{Error, Result};
use crate::forecast::{forecast, ForecastConfig, ForecastPoint};
use crate::models::{CategoryId, Mutation, Period, TransactionId, WhatIfDelta};
use crate::simulate::{simulate, SimulationDiff};
use crate::snapshot::LedgerSnapshot;
use crate::trends::{trends, TrendConfig, TrendPoint};

// =============================================================================
// Request schema
// =============================================================================

/// The closed set of tools the facade dispatches to
///
/// Any new capability extends this enum and its parameter schema; there are
/// no ad hoc parameter shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ToolKind {
    Summarize,
    Trends,
    DetectRecurring,
    Forecast,
    Simulate,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Summarize,
        ToolKind::Trends,
        ToolKind::DetectRecurring,
        ToolKind::Forecast,
        ToolKind::Simulate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Summarize => "summarize",
            ToolKind::Trends => "trends",
            ToolKind::DetectRecurring => "detectRecurring",
            ToolKind::Forecast => "forecast",
            ToolKind::Simulate => "simulate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::Summarize => {
                "Per-category totals, counts and averages over a date window, \
                 with child categories rolled up into ancestors"
            }
            ToolKind::Trends => {
                "Monthly totals, month-over-month deltas and anomaly flags \
                 for one category"
            }
            ToolKind::DetectRecurring => {
                "Recurring bill/subscription candidates detected from \
                 transaction history, with graded confidence"
            }
            ToolKind::Forecast => {
                "Projected balance interval per day over a horizon; bounds \
                 widen with distance"
            }
            ToolKind::Simulate => {
                "Apply a what-if mutation sequence and diff aggregates and \
                 forecast against the baseline"
            }
        }
    }
}

/// Parameters for `summarize`
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SummarizeParams {
    /// Window start (inclusive) in YYYY-MM-DD format
    #[schemars(description = "Start date (inclusive) in YYYY-MM-DD format")]
    pub start_date: String,
    /// Window end (exclusive) in YYYY-MM-DD format
    #[schemars(description = "End date (exclusive) in YYYY-MM-DD format")]
    pub end_date: String,
}

/// Parameters for `trends`
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TrendsParams {
    #[schemars(description = "Category id to analyze; descendants are included")]
    pub category_id: CategoryId,
    #[schemars(description = "Window start (inclusive) in YYYY-MM-DD format")]
    pub start_date: String,
    #[schemars(description = "Window end (exclusive) in YYYY-MM-DD format")]
    pub end_date: String,
}

/// Parameters for `detectRecurring`
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DetectRecurringParams {
    #[schemars(description = "Lookback start (inclusive) in YYYY-MM-DD format")]
    pub start_date: String,
    #[schemars(description = "Lookback end (exclusive) in YYYY-MM-DD format")]
    pub end_date: String,
}

/// Parameters for `forecast`
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ForecastParams {
    #[schemars(description = "Number of days to project past the snapshot date")]
    pub horizon_days: i64,
}

/// Parameters for `simulate`
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SimulateParams {
    #[schemars(description = "Ordered what-if mutations; applied in this exact order")]
    pub mutations: Vec<Mutation>,
    #[schemars(description = "Comparison window start (inclusive) in YYYY-MM-DD format")]
    pub start_date: String,
    #[schemars(description = "Comparison window end (exclusive) in YYYY-MM-DD format")]
    pub end_date: String,
    #[schemars(description = "Forecast horizon in days for the balance diff")]
    pub horizon_days: i64,
}

/// A tool invocation as received from the orchestration layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    /// Tool name; unknown names produce a request-error result
    pub tool_kind: String,
    /// Tool-specific parameters, validated against the schema before dispatch
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolRequest {
    pub fn new(tool_kind: &str, parameters: serde_json::Value) -> Self {
        Self {
            tool_kind: tool_kind.to_string(),
            parameters,
        }
    }
}

/// Name, description and input schema for one tool, for the orchestration
/// layer to advertise to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

// =============================================================================
// Result schema
// =============================================================================

/// Tool-specific structured payload
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Summary {
        by_category: BTreeMap<CategoryId, CategorySummary>,
    },
    Trends {
        points: Vec<TrendPoint>,
    },
    Recurring {
        candidates: Vec<RecurringCandidate>,
    },
    Forecast {
        points: Vec<ForecastPoint>,
    },
    Simulation {
        diff: SimulationDiff,
    },
}

/// Structured failure inside a `ToolResult`
#[derive(Debug, Clone, Serialize)]
pub struct ToolFailure {
    /// Machine-readable error kind: validation, insufficient_history,
    /// request, internal
    pub kind: String,
    /// Minimal actionable detail, never an internal trace
    pub detail: String,
}

/// The facade's answer to a single request, success or failure
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_kind: String,
    /// Fingerprint of the snapshot the result was computed from
    pub snapshot_fingerprint: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
    /// Source transaction ids the result rests on, ascending
    pub cited_ids: Vec<TransactionId>,
    pub generated_at: DateTime<Utc>,
}

/// Request lifecycle states, for transition logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Received,
    Validated,
    Dispatched,
    Completed,
    Failed,
}

impl RequestState {
    fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::Validated => "validated",
            RequestState::Dispatched => "dispatched",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Thresholds for every engine behind the facade
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub trend: TrendConfig,
    pub detection: DetectionConfig,
    pub forecast: ForecastConfig,
}

/// Tool engine bound to one immutable snapshot
///
/// The snapshot never changes after construction, so concurrent dispatches
/// are safe; the only interior state is the result cache. Repeated
/// identical requests return the cached result, including its original
/// timestamp — same fingerprint, same request, same answer.
pub struct ToolEngine {
    snapshot: LedgerSnapshot,
    config: EngineConfig,
    cache: Mutex<HashMap<String, ToolResult>>,
}

impl ToolEngine {
    pub fn new(snapshot: LedgerSnapshot) -> Self {
        Self::with_config(snapshot, EngineConfig::default())
    }

    pub fn with_config(snapshot: LedgerSnapshot, config: EngineConfig) -> Self {
        Self {
            snapshot,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }

    /// Dispatch one request through the Received -> Validated -> Dispatched
    /// -> Completed | Failed lifecycle
    ///
    /// Never panics and never returns a raw error: every outcome is a
    /// `ToolResult`.
    pub fn dispatch(&self, request: &ToolRequest) -> ToolResult {
        self.log_state(&request.tool_kind, RequestState::Received);

        let Some(kind) = ToolKind::parse(&request.tool_kind) else {
            return self.fail(
                &request.tool_kind,
                Error::Request(format!(
                    "unknown tool kind '{}'; expected one of: {}",
                    request.tool_kind,
                    ToolKind::ALL
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            );
        };

        // serde_json maps serialize with sorted keys, so this string is a
        // canonical cache key for the request
        let cache_key = format!("{}\u{1f}{}", kind.as_str(), request.parameters);
        if let Some(cached) = self.cache.lock().unwrap().get(&cache_key) {
            debug!(tool = kind.as_str(), "Tool result served from cache");
            return cached.clone();
        }
        self.log_state(&request.tool_kind, RequestState::Validated);

        self.log_state(&request.tool_kind, RequestState::Dispatched);
        match self.run(kind, &request.parameters) {
            Ok((payload, cited_ids)) => {
                self.log_state(&request.tool_kind, RequestState::Completed);
                let result = ToolResult {
                    tool_kind: kind.as_str().to_string(),
                    snapshot_fingerprint: self.snapshot.fingerprint().to_string(),
                    ok: true,
                    result: Some(payload),
                    error: None,
                    cited_ids,
                    generated_at: Utc::now(),
                };
                self.cache.lock().unwrap().insert(cache_key, result.clone());
                result
            }
            Err(err) => self.fail(kind.as_str(), err),
        }
    }

    /// Specs for every tool in the closed set
    pub fn tool_specs() -> Vec<ToolSpec> {
        ToolKind::ALL
            .iter()
            .map(|kind| {
                let schema = match kind {
                    ToolKind::Summarize => schemars::schema_for!(SummarizeParams),
                    ToolKind::Trends => schemars::schema_for!(TrendsParams),
                    ToolKind::DetectRecurring => schemars::schema_for!(DetectRecurringParams),
                    ToolKind::Forecast => schemars::schema_for!(ForecastParams),
                    ToolKind::Simulate => schemars::schema_for!(SimulateParams),
                };
                ToolSpec {
                    name: kind.as_str().to_string(),
                    description: kind.description().to_string(),
                    input_schema: schema.into(),
                }
            })
            .collect()
    }

    fn run(
        &self,
        kind: ToolKind,
        parameters: &serde_json::Value,
    ) -> Result<(ToolPayload, Vec<TransactionId>)> {
        match kind {
            ToolKind::Summarize => {
                let params: SummarizeParams = parse_params(kind, parameters)?;
                let period = parse_period(&params.start_date, &params.end_date)?;
                let summary = summarize(&self.snapshot, period)?;
                Ok((
                    ToolPayload::Summary {
                        by_category: summary.by_category,
                    },
                    summary.cited_transaction_ids,
                ))
            }
            ToolKind::Trends => {
                let params: TrendsParams = parse_params(kind, parameters)?;
                let window = parse_period(&params.start_date, &params.end_date)?;
                let series = trends(
                    &self.snapshot,
                    params.category_id,
                    window,
                    &self.config.trend,
                )?;
                let cited = series.cited_transaction_ids().to_vec();
                let points: Vec<TrendPoint> = series.collect();
                Ok((ToolPayload::Trends { points }, cited))
            }
            ToolKind::DetectRecurring => {
                let params: DetectRecurringParams = parse_params(kind, parameters)?;
                let lookback = parse_period(&params.start_date, &params.end_date)?;
                let candidates =
                    detect_recurring(&self.snapshot, lookback, &self.config.detection);
                let mut cited: Vec<TransactionId> = candidates
                    .iter()
                    .flat_map(|c| c.supporting_transaction_ids.iter().copied())
                    .collect();
                cited.sort_unstable();
                cited.dedup();
                Ok((ToolPayload::Recurring { candidates }, cited))
            }
            ToolKind::Forecast => {
                let params: ForecastParams = parse_params(kind, parameters)?;
                let projection = forecast(
                    &self.snapshot,
                    params.horizon_days,
                    &self.config.detection,
                    &self.config.trend,
                    &self.config.forecast,
                )?;
                Ok((
                    ToolPayload::Forecast {
                        points: projection.points,
                    },
                    projection.cited_transaction_ids,
                ))
            }
            ToolKind::Simulate => {
                let params: SimulateParams = parse_params(kind, parameters)?;
                let period = parse_period(&params.start_date, &params.end_date)?;
                let delta = WhatIfDelta {
                    mutations: params.mutations,
                };
                let simulation = simulate(
                    &self.snapshot,
                    &delta,
                    period,
                    params.horizon_days,
                    &self.config.detection,
                    &self.config.trend,
                    &self.config.forecast,
                )?;
                // The derived snapshot stays local to the call; only the
                // diff leaves the engine
                let cited = summarize(&self.snapshot, period)?.cited_transaction_ids;
                Ok((
                    ToolPayload::Simulation {
                        diff: simulation.diff,
                    },
                    cited,
                ))
            }
        }
    }

    fn fail(&self, tool_kind: &str, err: Error) -> ToolResult {
        self.log_state(tool_kind, RequestState::Failed);
        match &err {
            Error::Internal { .. } => {
                error!(
                    tool = tool_kind,
                    fingerprint = %self.snapshot.fingerprint(),
                    error = %err,
                    "Internal computation error"
                );
            }
            _ => {
                warn!(
                    tool = tool_kind,
                    fingerprint = %self.snapshot.fingerprint(),
                    error = %err,
                    "Tool request failed"
                );
            }
        }
        ToolResult {
            tool_kind: tool_kind.to_string(),
            snapshot_fingerprint: self.snapshot.fingerprint().to_string(),
            ok: false,
            result: None,
            error: Some(ToolFailure {
                kind: err.kind().to_string(),
                detail: err.to_string(),
            }),
            cited_ids: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    fn log_state(&self, tool_kind: &str, state: RequestState) {
        debug!(
            tool = tool_kind,
            state = state.as_str(),
            fingerprint = %self.snapshot.fingerprint(),
            "Request state"
        );
    }
}

fn parse_params<P: serde::de::DeserializeOwned>(
    kind: ToolKind,
    parameters: &serde_json::Value,
) -> Result<P> {
    serde_json::from_value(parameters.clone()).map_err(|e| {
        Error::Request(format!("invalid parameters for {}: {}", kind.as_str(), e))
    })
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        Error::Request(format!("invalid date '{}'; use YYYY-MM-DD", value))
    })
}

fn parse_period(start: &str, end: &str) -> Result<Period> {
    let period = Period::new(parse_date(start)?, parse_date(end)?);
    // An inverted window is a caller mistake, not a ledger defect
    period.map_err(|e| Error::Request(e.to_string()))
}
