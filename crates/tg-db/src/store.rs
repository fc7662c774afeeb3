//! Persistence boundary.
//!
//! Everything above this crate talks to a `dyn TradeStore`. Two
//! implementations exist: [`crate::PgTradeStore`] (sqlx / Postgres) and
//! [`crate::MemTradeStore`] (process memory, for tests and `--dry-run`).
//! Both enforce uniqueness of `trades.raw_hash` and of
//! `(trade_id, behavior_code)` for tags.

use anyhow::Result;
use tg_schemas::{
    BehaviorTagRow, IngestionRun, NewBehaviorTag, NewTrade, RunOutcome, Side, Trade,
};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 500;

// ---------------------------------------------------------------------------
// Write outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub trade_id: Uuid,
    pub kind: UpsertKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(Trade),
    /// A trade with the same `raw_hash` already exists; nothing was written.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Trade listing query
// ---------------------------------------------------------------------------

/// Page of one user's trades, newest `opened_at` first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeQuery {
    pub user_id: String,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
    /// Case-insensitive substring match.
    pub symbol: Option<String>,
    pub side: Option<Side>,
}

impl TradeQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            symbol: None,
            side: None,
        }
    }

    /// Clamp page to >= 1 and limit to 1..=MAX_PAGE_LIMIT.
    pub fn clamped(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self.symbol = self
            .symbol
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait TradeStore: Send + Sync {
    /// Short backend name for health output and logs.
    fn backend(&self) -> &'static str;

    /// Insert, or on `raw_hash` conflict refresh the mutable columns
    /// (`fees`, `pnl`, `updated_at`) of the existing row.
    async fn upsert_trade(&self, trade: &NewTrade) -> Result<UpsertOutcome>;

    /// Plain insert. Never modifies an existing row.
    async fn insert_trade(&self, trade: &NewTrade) -> Result<InsertOutcome>;

    async fn list_trades(&self, query: &TradeQuery) -> Result<Vec<Trade>>;

    /// `None` when the trade does not exist or belongs to another user.
    async fn fetch_trade(&self, user_id: &str, trade_id: Uuid) -> Result<Option<Trade>>;

    /// Every trade of the user, ascending by `(opened_at, id)`.
    async fn trades_for_user(&self, user_id: &str) -> Result<Vec<Trade>>;

    async fn count_trades(&self, user_id: &str) -> Result<u64>;

    /// New run in `processing` with zero counters.
    async fn create_ingest_run(&self, user_id: &str, filename: &str) -> Result<IngestionRun>;

    /// Move a `processing` run to its terminal state. Returns `false` (and
    /// writes nothing) if the run was already terminal or does not exist.
    async fn finalize_ingest_run(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<bool>;

    async fn fetch_ingest_run(&self, run_id: Uuid) -> Result<Option<IngestionRun>>;

    /// Most recent first.
    async fn list_ingest_runs(&self, user_id: &str, limit: u32) -> Result<Vec<IngestionRun>>;

    /// Atomically drop every tag of `user_id` and write `tags` in their place.
    /// Returns the number of tags written.
    async fn replace_behavior_tags(&self, user_id: &str, tags: &[NewBehaviorTag]) -> Result<u64>;

    async fn tags_for_trades(
        &self,
        user_id: &str,
        trade_ids: &[Uuid],
    ) -> Result<Vec<BehaviorTagRow>>;
}
