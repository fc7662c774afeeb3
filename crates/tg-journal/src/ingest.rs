//! CSV upload or broker ledger -> trades, with exactly one run-log record
//! per invocation.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use tg_db::{TradeStore, UpsertKind};
use tg_ingest::{
    fifo_round_trips, load_ledger, normalize_row, CashEvent, CsvIngestError, Leniency,
    RecordOutcome, TradeCsvReader,
};
use tg_schemas::{IngestCounters, NewTrade, RunOutcome};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Recorded when a run is abandoned (cancelled request, panic) mid-flight.
pub const ABORTED_RUN_MESSAGE: &str = "ingestion aborted before completion";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub counters: IngestCounters,
}

/// Run-level failure. Row-level problems never surface here.
#[derive(Debug)]
pub enum IngestError {
    /// The payload is not a usable CSV (empty, unreadable header).
    /// `run_id` is the run that was finalized as failed.
    Csv { run_id: Uuid, source: CsvIngestError },
    /// The store failed outside of a single row's upsert.
    Store(anyhow::Error),
}

impl IngestError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, IngestError::Csv { .. })
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Csv { source, .. } => write!(f, "{source}"),
            IngestError::Store(e) => write!(f, "ingest store failure: {e:#}"),
        }
    }
}

impl std::error::Error for IngestError {}

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

/// Owns a `processing` run until it is finalized.
///
/// If dropped while still armed, the run is finalized as failed on a
/// background task of the current runtime.
struct RunGuard {
    store: Arc<dyn TradeStore>,
    run_id: Uuid,
    counters: IngestCounters,
    armed: bool,
}

impl RunGuard {
    fn new(store: Arc<dyn TradeStore>, run_id: Uuid) -> Self {
        Self {
            store,
            run_id,
            counters: IngestCounters::default(),
            armed: true,
        }
    }

    async fn complete(mut self) -> anyhow::Result<IngestCounters> {
        let outcome = RunOutcome::Completed(self.counters.clone());
        self.finalize(&outcome).await?;
        Ok(self.counters.clone())
    }

    async fn fail(mut self, error_message: String) -> anyhow::Result<()> {
        let outcome = RunOutcome::Failed {
            counters: self.counters.clone(),
            error_message,
        };
        self.finalize(&outcome).await
    }

    async fn finalize(&mut self, outcome: &RunOutcome) -> anyhow::Result<()> {
        let moved = self
            .store
            .finalize_ingest_run(self.run_id, outcome)
            .await
            .with_context(|| format!("finalize ingest run {}", self.run_id))?;
        // Disarm only once the terminal state is written.
        self.armed = false;
        if !moved {
            warn!(run_id = %self.run_id, "ingest run was already terminal");
        }
        Ok(())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let outcome = RunOutcome::Failed {
            counters: self.counters.clone(),
            error_message: ABORTED_RUN_MESSAGE.to_string(),
        };
        let run_id = self.run_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    if let Err(e) = store.finalize_ingest_run(run_id, &outcome).await {
                        error!(
                            run_id = %run_id,
                            error = %format!("{e:#}"),
                            "failed to finalize abandoned ingest run"
                        );
                    }
                });
            }
            Err(_) => {
                error!(run_id = %run_id, "no runtime to finalize abandoned ingest run");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ingest one uploaded CSV for `user_id`.
///
/// Rows are read, mapped, normalized and upserted one at a time, in file
/// order. A bad row is logged and counted in `rows_failed`; only an
/// unusable file or a run-log failure fails the call.
pub async fn ingest_csv(
    store: &Arc<dyn TradeStore>,
    bytes: &[u8],
    filename: &str,
    user_id: &str,
) -> Result<IngestSummary, IngestError> {
    let run = store
        .create_ingest_run(user_id, filename)
        .await
        .context("create ingest run")
        .map_err(IngestError::Store)?;
    let run_id = run.id;
    let mut guard = RunGuard::new(Arc::clone(store), run_id);

    info!(run_id = %run_id, user_id, filename, bytes = bytes.len(), "ingest started");

    let reader = match TradeCsvReader::from_bytes(bytes) {
        Ok(r) => r,
        Err(e) => {
            error!(run_id = %run_id, user_id, error = %e, "ingest failed");
            guard.fail(e.to_string()).await.map_err(IngestError::Store)?;
            return Err(IngestError::Csv { run_id, source: e });
        }
    };

    for RecordOutcome { line, row } in reader {
        let trade = match row.and_then(|r| normalize_row(user_id, &r, Leniency::Csv)) {
            Ok(t) => t,
            Err(e) => {
                warn!(run_id = %run_id, user_id, row = line, error = %e, "skipping csv row");
                guard.counters.rows_failed += 1;
                continue;
            }
        };

        upsert_counted(store.as_ref(), &mut guard.counters, &trade, run_id, line).await;
    }

    let counters = guard.complete().await.map_err(IngestError::Store)?;
    info!(
        run_id = %run_id,
        user_id,
        rows_processed = counters.rows_processed,
        rows_inserted = counters.rows_inserted,
        rows_updated = counters.rows_updated,
        rows_failed = counters.rows_failed,
        "ingest completed"
    );
    Ok(IngestSummary { run_id, counters })
}

/// Upsert one trade and count the outcome. A store error fails only this row.
async fn upsert_counted(
    store: &dyn TradeStore,
    counters: &mut IngestCounters,
    trade: &NewTrade,
    run_id: Uuid,
    line: u64,
) {
    match store.upsert_trade(trade).await {
        Ok(outcome) => {
            counters.rows_processed += 1;
            match outcome.kind {
                UpsertKind::Inserted => counters.rows_inserted += 1,
                UpsertKind::Updated => counters.rows_updated += 1,
            }
        }
        Err(e) => {
            warn!(
                run_id = %run_id,
                user_id = %trade.user_id,
                row = line,
                error = %format!("{e:#}"),
                "trade upsert failed"
            );
            counters.rows_failed += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerIngestSummary {
    pub run_id: Uuid,
    /// Counted per round trip written, plus rejected ledger rows as failures.
    pub counters: IngestCounters,
    pub round_trips: u64,
    pub cash_events: Vec<CashEvent>,
    pub rows_ignored: u64,
}

/// Ingest a broker ledger for `user_id`: executions are matched FIFO into
/// closed round trips, which are upserted as trades. Cash events are returned
/// to the caller and not stored.
///
/// Uses the same run log as [`ingest_csv`].
pub async fn ingest_ledger(
    store: &Arc<dyn TradeStore>,
    bytes: &[u8],
    filename: &str,
    user_id: &str,
) -> Result<LedgerIngestSummary, IngestError> {
    let run = store
        .create_ingest_run(user_id, filename)
        .await
        .context("create ingest run")
        .map_err(IngestError::Store)?;
    let run_id = run.id;
    let mut guard = RunGuard::new(Arc::clone(store), run_id);

    info!(run_id = %run_id, user_id, filename, bytes = bytes.len(), "ledger ingest started");

    let ledger = match load_ledger(bytes) {
        Ok(l) => l,
        Err(e) => {
            error!(run_id = %run_id, user_id, error = %e, "ledger ingest failed");
            guard.fail(e.to_string()).await.map_err(IngestError::Store)?;
            return Err(IngestError::Csv { run_id, source: e });
        }
    };

    for rejected in &ledger.rejected {
        warn!(
            run_id = %run_id,
            user_id,
            row = rejected.line,
            error = %rejected.error,
            "skipping ledger row"
        );
        guard.counters.rows_failed += 1;
    }

    let round_trips = fifo_round_trips(&ledger.executions);
    for trip in &round_trips {
        let trade = trip.to_new_trade(user_id);
        upsert_counted(store.as_ref(), &mut guard.counters, &trade, run_id, trip.closing_line)
            .await;
    }

    let counters = guard.complete().await.map_err(IngestError::Store)?;
    info!(
        run_id = %run_id,
        user_id,
        round_trips = round_trips.len(),
        cash_events = ledger.cash_events.len(),
        rows_ignored = ledger.ignored,
        rows_inserted = counters.rows_inserted,
        rows_updated = counters.rows_updated,
        rows_failed = counters.rows_failed,
        "ledger ingest completed"
    );
    Ok(LedgerIngestSummary {
        run_id,
        counters,
        round_trips: round_trips.len() as u64,
        cash_events: ledger.cash_events,
        rows_ignored: ledger.ignored,
    })
}
