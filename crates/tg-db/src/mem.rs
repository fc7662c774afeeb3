//! In-process [`TradeStore`].
//!
//! All state lives behind one async `RwLock`; every write takes the write
//! guard, so uniqueness checks and the write that follows are atomic.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use tg_schemas::{
    BehaviorTagRow, IngestCounters, IngestStatus, IngestionRun, NewBehaviorTag, NewTrade,
    RunOutcome, Trade,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{InsertOutcome, TradeQuery, TradeStore, UpsertKind, UpsertOutcome};

#[derive(Debug, Default)]
struct MemState {
    trades: HashMap<Uuid, Trade>,
    by_hash: HashMap<String, Uuid>,
    /// Insertion order; list queries sort explicitly.
    runs: Vec<IngestionRun>,
    tags: Vec<BehaviorTagRow>,
}

#[derive(Debug, Default)]
pub struct MemTradeStore {
    state: RwLock<MemState>,
}

impl MemTradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn symbol_matches(symbol: &str, needle: &str) -> bool {
    symbol
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

#[async_trait::async_trait]
impl TradeStore for MemTradeStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert_trade(&self, trade: &NewTrade) -> Result<UpsertOutcome> {
        let mut st = self.state.write().await;
        let now = Utc::now();

        if let Some(id) = st.by_hash.get(&trade.raw_hash).copied() {
            if let Some(existing) = st.trades.get_mut(&id) {
                existing.fees = trade.fees;
                existing.pnl = trade.pnl;
                existing.updated_at = now;
                return Ok(UpsertOutcome {
                    trade_id: id,
                    kind: UpsertKind::Updated,
                });
            }
        }

        let id = Uuid::new_v4();
        st.trades.insert(id, Trade::from_new(id, trade, now));
        st.by_hash.insert(trade.raw_hash.clone(), id);
        Ok(UpsertOutcome {
            trade_id: id,
            kind: UpsertKind::Inserted,
        })
    }

    async fn insert_trade(&self, trade: &NewTrade) -> Result<InsertOutcome> {
        let mut st = self.state.write().await;
        if st.by_hash.contains_key(&trade.raw_hash) {
            return Ok(InsertOutcome::Duplicate);
        }
        let id = Uuid::new_v4();
        let row = Trade::from_new(id, trade, Utc::now());
        st.trades.insert(id, row.clone());
        st.by_hash.insert(trade.raw_hash.clone(), id);
        Ok(InsertOutcome::Created(row))
    }

    async fn list_trades(&self, query: &TradeQuery) -> Result<Vec<Trade>> {
        let st = self.state.read().await;
        let mut rows: Vec<Trade> = st
            .trades
            .values()
            .filter(|t| t.user_id == query.user_id)
            .filter(|t| match &query.symbol {
                Some(s) => symbol_matches(&t.symbol, s),
                None => true,
            })
            .filter(|t| query.side.map(|s| s == t.side).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.opened_at.cmp(&a.opened_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect())
    }

    async fn fetch_trade(&self, user_id: &str, trade_id: Uuid) -> Result<Option<Trade>> {
        let st = self.state.read().await;
        Ok(st
            .trades
            .get(&trade_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn trades_for_user(&self, user_id: &str) -> Result<Vec<Trade>> {
        let st = self.state.read().await;
        let mut rows: Vec<Trade> = st
            .trades
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn count_trades(&self, user_id: &str) -> Result<u64> {
        let st = self.state.read().await;
        Ok(st.trades.values().filter(|t| t.user_id == user_id).count() as u64)
    }

    async fn create_ingest_run(&self, user_id: &str, filename: &str) -> Result<IngestionRun> {
        let run = IngestionRun {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            counters: IngestCounters::default(),
            status: IngestStatus::Processing,
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.state.write().await.runs.push(run.clone());
        Ok(run)
    }

    async fn finalize_ingest_run(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<bool> {
        let mut st = self.state.write().await;
        let Some(run) = st.runs.iter_mut().find(|r| r.id == run_id) else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }
        run.status = outcome.status();
        run.counters = outcome.counters().clone();
        run.error_message = outcome.error_message().map(str::to_string);
        run.finished_at = Some(Utc::now());
        Ok(true)
    }

    async fn fetch_ingest_run(&self, run_id: Uuid) -> Result<Option<IngestionRun>> {
        let st = self.state.read().await;
        Ok(st.runs.iter().find(|r| r.id == run_id).cloned())
    }

    async fn list_ingest_runs(&self, user_id: &str, limit: u32) -> Result<Vec<IngestionRun>> {
        let st = self.state.read().await;
        Ok(st
            .runs
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn replace_behavior_tags(&self, user_id: &str, tags: &[NewBehaviorTag]) -> Result<u64> {
        let mut st = self.state.write().await;

        // Validate everything before touching state so a bad tag leaves the
        // previous set intact.
        for t in tags {
            let owned = st
                .trades
                .get(&t.trade_id)
                .map(|tr| tr.user_id == user_id)
                .unwrap_or(false);
            if !owned {
                anyhow::bail!(
                    "replace_behavior_tags: trade {} does not belong to user",
                    t.trade_id
                );
            }
            if !(0.0..=1.0).contains(&t.confidence) {
                anyhow::bail!(
                    "replace_behavior_tags: confidence {} out of range for {}",
                    t.confidence,
                    t.behavior_code
                );
            }
        }

        let now = Utc::now();
        let mut fresh: Vec<BehaviorTagRow> = Vec::with_capacity(tags.len());
        for t in tags {
            if let Some(dup) = fresh
                .iter_mut()
                .find(|r| r.trade_id == t.trade_id && r.behavior_code == t.behavior_code)
            {
                // same semantics as `on conflict do update` in Postgres
                dup.confidence = t.confidence;
                dup.rationale = Some(t.rationale.clone());
                dup.scope = t.scope;
                continue;
            }
            fresh.push(BehaviorTagRow {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                trade_id: t.trade_id,
                behavior_code: t.behavior_code.clone(),
                confidence: t.confidence,
                rationale: Some(t.rationale.clone()),
                scope: t.scope,
                created_at: now,
            });
        }

        st.tags.retain(|r| r.user_id != user_id);
        let written = fresh.len() as u64;
        st.tags.extend(fresh);
        Ok(written)
    }

    async fn tags_for_trades(
        &self,
        user_id: &str,
        trade_ids: &[Uuid],
    ) -> Result<Vec<BehaviorTagRow>> {
        let st = self.state.read().await;
        Ok(st
            .tags
            .iter()
            .filter(|r| r.user_id == user_id && trade_ids.contains(&r.trade_id))
            .cloned()
            .collect())
    }
}
