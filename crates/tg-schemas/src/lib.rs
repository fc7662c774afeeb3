//! Canonical record types shared by every tg-* crate.
//!
//! Leaf crate: no I/O, no business logic beyond parsing of enumerations.

pub mod fixedpoint;

pub use fixedpoint::{DecimalError, Micros};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    Short,
    Cover,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Short => "SHORT",
            Side::Cover => "COVER",
        }
    }

    /// Case-insensitive; surrounding whitespace ignored.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            "SHORT" => Some(Side::Short),
            "COVER" => Some(Side::Cover),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A validated, normalized trade that has not been stored yet.
///
/// `raw_hash` is computed by the ingest layer before the record reaches the
/// store; the store treats it as the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrade {
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Micros,
    pub price: Micros,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub fees: Micros,
    pub pnl: Option<Micros>,
    pub raw_hash: String,
}

/// A stored trade row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Micros,
    pub price: Micros,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub fees: Micros,
    pub pnl: Option<Micros>,
    pub raw_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Materialize a stored row from a `NewTrade` (used by the in-memory store).
    pub fn from_new(id: Uuid, t: &NewTrade, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: t.user_id.clone(),
            symbol: t.symbol.clone(),
            side: t.side,
            qty: t.qty,
            price: t.price,
            opened_at: t.opened_at,
            closed_at: t.closed_at,
            fees: t.fees,
            pnl: t.pnl,
            raw_hash: t.raw_hash.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// UTC calendar date the trade was opened on.
    pub fn trade_date(&self) -> NaiveDate {
        self.opened_at.date_naive()
    }
}

/// Trade joined with its behavior tags, as served by `GET /api/trades`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeWithTags {
    #[serde(flatten)]
    pub trade: Trade,
    pub trade_behavior_tags: Vec<TagView>,
}

// ---------------------------------------------------------------------------
// Ingestion run log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Processing,
    Completed,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Processing => "processing",
            IngestStatus::Completed => "completed",
            IngestStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(IngestStatus::Processing),
            "completed" => Some(IngestStatus::Completed),
            "failed" => Some(IngestStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, IngestStatus::Processing)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounters {
    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: Uuid,
    pub user_id: String,
    pub filename: String,
    #[serde(flatten)]
    pub counters: IngestCounters,
    pub status: IngestStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Terminal state written exactly once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(IngestCounters),
    Failed {
        counters: IngestCounters,
        error_message: String,
    },
}

impl RunOutcome {
    pub fn status(&self) -> IngestStatus {
        match self {
            RunOutcome::Completed(_) => IngestStatus::Completed,
            RunOutcome::Failed { .. } => IngestStatus::Failed,
        }
    }

    pub fn counters(&self) -> &IngestCounters {
        match self {
            RunOutcome::Completed(c) => c,
            RunOutcome::Failed { counters, .. } => counters,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Failed { error_message, .. } => Some(error_message),
        }
    }
}

// ---------------------------------------------------------------------------
// Behavior tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
    Trade,
    Day,
}

impl TagScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagScope::Trade => "trade",
            TagScope::Day => "day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trade" => Some(TagScope::Trade),
            "day" => Some(TagScope::Day),
            _ => None,
        }
    }
}

/// One behavior tag to persist for a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBehaviorTag {
    pub trade_id: Uuid,
    pub behavior_code: String,
    pub confidence: f64,
    pub rationale: String,
    pub scope: TagScope,
}

/// A stored behavior tag row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTagRow {
    pub id: Uuid,
    pub user_id: String,
    pub trade_id: Uuid,
    pub behavior_code: String,
    pub confidence: f64,
    pub rationale: Option<String>,
    pub scope: TagScope,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry describing a behavior code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorInfo {
    pub code: String,
    pub label: String,
    pub description: Option<String>,
    pub category: String,
    pub is_positive: bool,
}

/// Stored tag joined with its catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagView {
    #[serde(flatten)]
    pub tag: BehaviorTagRow,
    pub behaviors: Option<BehaviorInfo>,
}

// ---------------------------------------------------------------------------
// Daily metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub pnl: Micros,
    pub trade_count: u64,
    pub win_rate: f64,
    pub avg_win: Micros,
    pub avg_loss: Micros,
}
