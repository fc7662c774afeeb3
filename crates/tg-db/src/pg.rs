//! Postgres [`TradeStore`] (sqlx, runtime-checked queries).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tg_schemas::{
    BehaviorTagRow, IngestCounters, IngestStatus, IngestionRun, Micros, NewBehaviorTag, NewTrade,
    RunOutcome, Side, TagScope, Trade,
};
use uuid::Uuid;

use crate::store::{InsertOutcome, TradeQuery, TradeStore, UpsertKind, UpsertOutcome};

const TRADE_COLUMNS: &str = "id, user_id, symbol, side, qty_micros, price_micros, opened_at, \
     closed_at, fees_micros, pnl_micros, raw_hash, created_at, updated_at";

const RUN_COLUMNS: &str = "id, user_id, filename, rows_processed, rows_inserted, rows_updated, \
     rows_failed, status, error_message, created_at, finished_at";

#[derive(Debug, Clone)]
pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn trade_from_row(r: &PgRow) -> Result<Trade> {
    let side_s: String = r.try_get("side").context("trades.side")?;
    let side = Side::parse(&side_s).ok_or_else(|| anyhow!("trades.side invalid: {side_s}"))?;
    Ok(Trade {
        id: r.try_get::<Uuid, _>("id").context("trades.id")?,
        user_id: r.try_get::<String, _>("user_id").context("trades.user_id")?,
        symbol: r.try_get::<String, _>("symbol").context("trades.symbol")?,
        side,
        qty: Micros::new(r.try_get::<i64, _>("qty_micros").context("trades.qty_micros")?),
        price: Micros::new(
            r.try_get::<i64, _>("price_micros")
                .context("trades.price_micros")?,
        ),
        opened_at: r
            .try_get::<DateTime<Utc>, _>("opened_at")
            .context("trades.opened_at")?,
        closed_at: r
            .try_get::<Option<DateTime<Utc>>, _>("closed_at")
            .context("trades.closed_at")?,
        fees: Micros::new(
            r.try_get::<i64, _>("fees_micros")
                .context("trades.fees_micros")?,
        ),
        pnl: r
            .try_get::<Option<i64>, _>("pnl_micros")
            .context("trades.pnl_micros")?
            .map(Micros::new),
        raw_hash: r.try_get::<String, _>("raw_hash").context("trades.raw_hash")?,
        created_at: r
            .try_get::<DateTime<Utc>, _>("created_at")
            .context("trades.created_at")?,
        updated_at: r
            .try_get::<DateTime<Utc>, _>("updated_at")
            .context("trades.updated_at")?,
    })
}

fn run_from_row(r: &PgRow) -> Result<IngestionRun> {
    let status_s: String = r.try_get("status").context("ingest_log.status")?;
    let status = IngestStatus::parse(&status_s)
        .ok_or_else(|| anyhow!("ingest_log.status invalid: {status_s}"))?;
    let count = |col: &str| -> Result<u64> {
        let v: i64 = r
            .try_get(col)
            .with_context(|| format!("ingest_log.{col}"))?;
        Ok(u64::try_from(v).unwrap_or(0))
    };
    Ok(IngestionRun {
        id: r.try_get::<Uuid, _>("id").context("ingest_log.id")?,
        user_id: r.try_get::<String, _>("user_id").context("ingest_log.user_id")?,
        filename: r
            .try_get::<String, _>("filename")
            .context("ingest_log.filename")?,
        counters: IngestCounters {
            rows_processed: count("rows_processed")?,
            rows_inserted: count("rows_inserted")?,
            rows_updated: count("rows_updated")?,
            rows_failed: count("rows_failed")?,
        },
        status,
        error_message: r
            .try_get::<Option<String>, _>("error_message")
            .context("ingest_log.error_message")?,
        created_at: r
            .try_get::<DateTime<Utc>, _>("created_at")
            .context("ingest_log.created_at")?,
        finished_at: r
            .try_get::<Option<DateTime<Utc>>, _>("finished_at")
            .context("ingest_log.finished_at")?,
    })
}

fn tag_from_row(r: &PgRow) -> Result<BehaviorTagRow> {
    let scope_s: String = r.try_get("scope").context("trade_behavior_tags.scope")?;
    let scope = TagScope::parse(&scope_s)
        .ok_or_else(|| anyhow!("trade_behavior_tags.scope invalid: {scope_s}"))?;
    Ok(BehaviorTagRow {
        id: r.try_get("id").context("trade_behavior_tags.id")?,
        user_id: r.try_get("user_id").context("trade_behavior_tags.user_id")?,
        trade_id: r.try_get("trade_id").context("trade_behavior_tags.trade_id")?,
        behavior_code: r
            .try_get("behavior_code")
            .context("trade_behavior_tags.behavior_code")?,
        confidence: r
            .try_get("confidence")
            .context("trade_behavior_tags.confidence")?,
        rationale: r
            .try_get("rationale")
            .context("trade_behavior_tags.rationale")?,
        scope,
        created_at: r
            .try_get("created_at")
            .context("trade_behavior_tags.created_at")?,
    })
}

fn counter_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Escape LIKE metacharacters so a user filter is matched literally.
fn like_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('%');
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

// ---------------------------------------------------------------------------
// TradeStore
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl TradeStore for PgTradeStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_trade(&self, t: &NewTrade) -> Result<UpsertOutcome> {
        // inserted = (xmax = 0) in Postgres (true on insert, false on update).
        let row = sqlx::query(
            r#"
            insert into trades (
              id, user_id, symbol, side, qty_micros, price_micros,
              opened_at, closed_at, fees_micros, pnl_micros, raw_hash
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            on conflict (raw_hash) do update set
              fees_micros = excluded.fees_micros,
              pnl_micros  = excluded.pnl_micros,
              updated_at  = now()
            returning id, (xmax = 0) as inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&t.user_id)
        .bind(&t.symbol)
        .bind(t.side.as_str())
        .bind(t.qty.raw())
        .bind(t.price.raw())
        .bind(t.opened_at)
        .bind(t.closed_at)
        .bind(t.fees.raw())
        .bind(t.pnl.map(Micros::raw))
        .bind(&t.raw_hash)
        .fetch_one(&self.pool)
        .await
        .context("upsert trades failed")?;

        let trade_id: Uuid = row.try_get("id").context("trades.id")?;
        let inserted: bool = row.try_get("inserted").context("trades.inserted")?;
        Ok(UpsertOutcome {
            trade_id,
            kind: if inserted {
                UpsertKind::Inserted
            } else {
                UpsertKind::Updated
            },
        })
    }

    async fn insert_trade(&self, t: &NewTrade) -> Result<InsertOutcome> {
        let sql = format!(
            r#"
            insert into trades (
              id, user_id, symbol, side, qty_micros, price_micros,
              opened_at, closed_at, fees_micros, pnl_micros, raw_hash
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            on conflict (raw_hash) do nothing
            returning {TRADE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&t.user_id)
            .bind(&t.symbol)
            .bind(t.side.as_str())
            .bind(t.qty.raw())
            .bind(t.price.raw())
            .bind(t.opened_at)
            .bind(t.closed_at)
            .bind(t.fees.raw())
            .bind(t.pnl.map(Micros::raw))
            .bind(&t.raw_hash)
            .fetch_optional(&self.pool)
            .await
            .context("insert trades failed")?;

        match row {
            Some(r) => Ok(InsertOutcome::Created(trade_from_row(&r)?)),
            None => Ok(InsertOutcome::Duplicate),
        }
    }

    async fn list_trades(&self, q: &TradeQuery) -> Result<Vec<Trade>> {
        let sql = format!(
            r#"
            select {TRADE_COLUMNS}
            from trades
            where user_id = $1
              and ($2::text is null or symbol ilike $2)
              and ($3::text is null or side = $3)
            order by opened_at desc, id desc
            limit $4 offset $5
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&q.user_id)
            .bind(q.symbol.as_deref().map(like_literal))
            .bind(q.side.map(|s| s.as_str()))
            .bind(i64::from(q.limit))
            .bind(counter_i64(q.offset()))
            .fetch_all(&self.pool)
            .await
            .context("list_trades failed")?;

        rows.iter().map(trade_from_row).collect()
    }

    async fn fetch_trade(&self, user_id: &str, trade_id: Uuid) -> Result<Option<Trade>> {
        let sql = format!("select {TRADE_COLUMNS} from trades where id = $1 and user_id = $2");
        let row = sqlx::query(&sql)
            .bind(trade_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_trade failed")?;
        row.as_ref().map(trade_from_row).transpose()
    }

    async fn trades_for_user(&self, user_id: &str) -> Result<Vec<Trade>> {
        let sql = format!(
            "select {TRADE_COLUMNS} from trades where user_id = $1 order by opened_at asc, id asc"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("trades_for_user failed")?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn count_trades(&self, user_id: &str) -> Result<u64> {
        let (n,): (i64,) =
            sqlx::query_as::<_, (i64,)>("select count(*)::bigint from trades where user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .context("count_trades failed")?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn create_ingest_run(&self, user_id: &str, filename: &str) -> Result<IngestionRun> {
        let sql = format!(
            r#"
            insert into ingest_log (id, user_id, filename, status)
            values ($1, $2, $3, 'processing')
            returning {RUN_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(filename)
            .fetch_one(&self.pool)
            .await
            .context("insert ingest_log failed")?;
        run_from_row(&row)
    }

    async fn finalize_ingest_run(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<bool> {
        let c = outcome.counters();
        let res = sqlx::query(
            r#"
            update ingest_log set
              rows_processed = $2,
              rows_inserted  = $3,
              rows_updated   = $4,
              rows_failed    = $5,
              status         = $6,
              error_message  = $7,
              finished_at    = now()
            where id = $1 and status = 'processing'
            "#,
        )
        .bind(run_id)
        .bind(counter_i64(c.rows_processed))
        .bind(counter_i64(c.rows_inserted))
        .bind(counter_i64(c.rows_updated))
        .bind(counter_i64(c.rows_failed))
        .bind(outcome.status().as_str())
        .bind(outcome.error_message())
        .execute(&self.pool)
        .await
        .context("finalize ingest_log failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn fetch_ingest_run(&self, run_id: Uuid) -> Result<Option<IngestionRun>> {
        let sql = format!("select {RUN_COLUMNS} from ingest_log where id = $1");
        let row = sqlx::query(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_ingest_run failed")?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_ingest_runs(&self, user_id: &str, limit: u32) -> Result<Vec<IngestionRun>> {
        let sql = format!(
            r#"
            select {RUN_COLUMNS}
            from ingest_log
            where user_id = $1
            order by created_at desc, id desc
            limit $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .context("list_ingest_runs failed")?;
        rows.iter().map(run_from_row).collect()
    }

    async fn replace_behavior_tags(&self, user_id: &str, tags: &[NewBehaviorTag]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("replace_behavior_tags begin failed")?;

        sqlx::query("delete from trade_behavior_tags where user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("delete trade_behavior_tags failed")?;

        let mut written = 0_u64;
        for t in tags {
            // The join on trades keeps a caller from tagging another user's trade.
            let res = sqlx::query(
                r#"
                insert into trade_behavior_tags (
                  id, user_id, trade_id, behavior_code, confidence, rationale, scope
                )
                select $1, $2, t.id, $4, $5, $6, $7
                from trades t
                where t.id = $3 and t.user_id = $2
                on conflict (trade_id, behavior_code) do update set
                  confidence = excluded.confidence,
                  rationale  = excluded.rationale,
                  scope      = excluded.scope
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(t.trade_id)
            .bind(&t.behavior_code)
            .bind(t.confidence)
            .bind(&t.rationale)
            .bind(t.scope.as_str())
            .execute(&mut *tx)
            .await
            .context("insert trade_behavior_tags failed")?;

            if res.rows_affected() == 0 {
                // Dropping `tx` rolls back the delete above.
                return Err(anyhow!(
                    "replace_behavior_tags: trade {} does not belong to user",
                    t.trade_id
                ));
            }
            written += 1;
        }

        tx.commit()
            .await
            .context("replace_behavior_tags commit failed")?;

        tracing::debug!(user_id, written, "behavior tags replaced");
        Ok(written)
    }

    async fn tags_for_trades(
        &self,
        user_id: &str,
        trade_ids: &[Uuid],
    ) -> Result<Vec<BehaviorTagRow>> {
        if trade_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            select id, user_id, trade_id, behavior_code, confidence, rationale, scope, created_at
            from trade_behavior_tags
            where user_id = $1 and trade_id = any($2)
            order by trade_id, behavior_code
            "#,
        )
        .bind(user_id)
        .bind(trade_ids)
        .fetch_all(&self.pool)
        .await
        .context("tags_for_trades failed")?;
        rows.iter().map(tag_from_row).collect()
    }
}
