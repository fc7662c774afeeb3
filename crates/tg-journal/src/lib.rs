//! Journal operations over a [`tg_db::TradeStore`].
//!
//! This is the layer the daemon and the CLI call into: CSV and ledger
//! ingestion with its run log, single-trade creation, behavior analysis and
//! read models.

pub mod analyze;
pub mod create;
pub mod ingest;
pub mod query;

pub use analyze::{analyze_trade, analyze_user, AnalysisSummary};
pub use create::{create_trade, CreateTradeError};
pub use ingest::{
    ingest_csv, ingest_ledger, IngestError, IngestSummary, LedgerIngestSummary, ABORTED_RUN_MESSAGE,
};
pub use query::{
    daily_metrics, list_ingest_runs, list_trades_with_tags, tag_views, DEFAULT_RUNS_LIMIT,
    MAX_RUNS_LIMIT,
};
