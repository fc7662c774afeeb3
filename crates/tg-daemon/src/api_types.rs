//! Request and response types for the tg-daemon HTTP endpoints.
//!
//! Response bodies use the camelCase keys the web client expects. No
//! business logic lives here.

use serde::{Deserialize, Serialize};
use tg_journal::{AnalysisSummary, IngestSummary};
use tg_schemas::TagView;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// Store backend in use: "postgres" | "memory".
    pub backend: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `{ "data": ... }` envelope used by the read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

// ---------------------------------------------------------------------------
// /api/ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_failed: u64,
    pub run_id: Uuid,
}

impl From<IngestSummary> for IngestResponse {
    fn from(s: IngestSummary) -> Self {
        Self {
            success: true,
            rows_processed: s.counters.rows_processed,
            rows_inserted: s.counters.rows_inserted,
            rows_updated: s.counters.rows_updated,
            rows_failed: s.counters.rows_failed,
            run_id: s.run_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// /api/trades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub symbol: Option<String>,
    pub side: Option<String>,
}

// ---------------------------------------------------------------------------
// /api/analyze, /api/analyze-trade
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub trades_analyzed: u64,
    pub tags_written: u64,
}

impl From<AnalysisSummary> for AnalyzeResponse {
    fn from(s: AnalysisSummary) -> Self {
        Self {
            success: true,
            trades_analyzed: s.trades_analyzed,
            tags_written: s.tags_written,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeTradeQuery {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeTradeResponse {
    pub success: bool,
    pub behaviors: Vec<TagView>,
}

// ---------------------------------------------------------------------------
// /api/metrics/daily
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsQuery {
    pub range: Option<String>,
}
