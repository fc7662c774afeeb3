// DB-backed tests, skipped if TG_DATABASE_URL is not set.
//
// Every test works under a fresh random user id so runs can share one database.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use tg_db::{InsertOutcome, PgTradeStore, TradeQuery, TradeStore, UpsertKind};
use tg_schemas::{
    IngestCounters, IngestStatus, Micros, NewBehaviorTag, NewTrade, RunOutcome, Side, TagScope,
};
use uuid::Uuid;

async fn pool_or_skip() -> Result<Option<PgPool>> {
    let url = match std::env::var(tg_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TG_DATABASE_URL not set");
            return Ok(None);
        }
    };
    let pool = tg_db::connect(&url, 2).await?;
    tg_db::migrate(&pool).await?;
    Ok(Some(pool))
}

fn trade(user: &str, symbol: &str, minute: u32) -> NewTrade {
    NewTrade {
        user_id: user.to_string(),
        symbol: symbol.to_string(),
        side: Side::Buy,
        qty: Micros::from_units(10),
        price: Micros::parse("150.25").unwrap(),
        opened_at: Utc.with_ymd_and_hms(2024, 1, 2, 14, minute, 0).unwrap(),
        closed_at: None,
        fees: Micros::ZERO,
        pnl: None,
        raw_hash: format!("{user}-{symbol}-{minute}"),
    }
}

#[tokio::test]
async fn migrate_is_idempotent() -> Result<()> {
    let Some(pool) = pool_or_skip().await? else {
        return Ok(());
    };
    tg_db::migrate(&pool).await?;
    let st = tg_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_trades_table);
    Ok(())
}

#[tokio::test]
async fn upsert_distinguishes_insert_from_update() -> Result<()> {
    let Some(pool) = pool_or_skip().await? else {
        return Ok(());
    };
    let store = PgTradeStore::new(pool);
    let user = Uuid::new_v4().to_string();

    let mut t = trade(&user, "AAPL", 0);
    let first = store.upsert_trade(&t).await?;
    assert_eq!(first.kind, UpsertKind::Inserted);

    t.pnl = Some(Micros::parse("-12.5").unwrap());
    t.fees = Micros::parse("1.05").unwrap();
    let second = store.upsert_trade(&t).await?;
    assert_eq!(second.kind, UpsertKind::Updated);
    assert_eq!(second.trade_id, first.trade_id);

    assert_eq!(store.count_trades(&user).await?, 1);
    let row = store.fetch_trade(&user, first.trade_id).await?.unwrap();
    assert_eq!(row.pnl, Some(Micros::parse("-12.5").unwrap()));
    assert_eq!(row.fees.to_string(), "1.05");
    assert!(row.updated_at >= row.created_at);
    Ok(())
}

#[tokio::test]
async fn insert_reports_duplicate_and_writes_nothing() -> Result<()> {
    let Some(pool) = pool_or_skip().await? else {
        return Ok(());
    };
    let store = PgTradeStore::new(pool);
    let user = Uuid::new_v4().to_string();
    let t = trade(&user, "MSFT", 5);

    let created = match store.insert_trade(&t).await? {
        InsertOutcome::Created(row) => row,
        InsertOutcome::Duplicate => panic!("first insert must create"),
    };
    assert_eq!(created.symbol, "MSFT");
    assert_eq!(store.insert_trade(&t).await?, InsertOutcome::Duplicate);
    assert_eq!(store.count_trades(&user).await?, 1);
    Ok(())
}

#[tokio::test]
async fn list_filters_symbol_literally() -> Result<()> {
    let Some(pool) = pool_or_skip().await? else {
        return Ok(());
    };
    let store = PgTradeStore::new(pool);
    let user = Uuid::new_v4().to_string();
    store.upsert_trade(&trade(&user, "AAPL", 1)).await?;
    store.upsert_trade(&trade(&user, "A_PL", 2)).await?;
    store.upsert_trade(&trade(&user, "MSFT", 3)).await?;

    let mut q = TradeQuery::for_user(&user);
    q.symbol = Some("a_p".to_string());
    let rows = store.list_trades(&q).await?;
    assert_eq!(rows.len(), 1, "underscore must not act as a wildcard");
    assert_eq!(rows[0].symbol, "A_PL");

    let all = store.list_trades(&TradeQuery::for_user(&user)).await?;
    let symbols: Vec<&str> = all.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["MSFT", "A_PL", "AAPL"]);
    Ok(())
}

#[tokio::test]
async fn ingest_run_transitions_once() -> Result<()> {
    let Some(pool) = pool_or_skip().await? else {
        return Ok(());
    };
    let store = PgTradeStore::new(pool);
    let user = Uuid::new_v4().to_string();

    let run = store.create_ingest_run(&user, "trades.csv").await?;
    assert_eq!(run.status, IngestStatus::Processing);
    assert!(run.finished_at.is_none());

    let failed = RunOutcome::Failed {
        counters: IngestCounters {
            rows_failed: 3,
            ..Default::default()
        },
        error_message: "csv has no header row".to_string(),
    };
    assert!(store.finalize_ingest_run(run.id, &failed).await?);
    assert!(
        !store
            .finalize_ingest_run(run.id, &RunOutcome::Completed(IngestCounters::default()))
            .await?
    );

    let stored = store.fetch_ingest_run(run.id).await?.unwrap();
    assert_eq!(stored.status, IngestStatus::Failed);
    assert_eq!(stored.counters.rows_failed, 3);
    assert_eq!(stored.error_message.as_deref(), Some("csv has no header row"));

    let listed = store.list_ingest_runs(&user, 10).await?;
    assert_eq!(listed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn behavior_tags_are_replaced_atomically() -> Result<()> {
    let Some(pool) = pool_or_skip().await? else {
        return Ok(());
    };
    let store = PgTradeStore::new(pool);
    let user = Uuid::new_v4().to_string();
    let other = Uuid::new_v4().to_string();
    let mine = store.upsert_trade(&trade(&user, "AAPL", 1)).await?;
    let theirs = store.upsert_trade(&trade(&other, "AAPL", 1)).await?;

    let tag = |trade_id: Uuid, code: &str| NewBehaviorTag {
        trade_id,
        behavior_code: code.to_string(),
        confidence: 0.9,
        rationale: "fixture".to_string(),
        scope: TagScope::Trade,
    };

    assert_eq!(
        store
            .replace_behavior_tags(&user, &[tag(mine.trade_id, "outcome_win")])
            .await?,
        1
    );

    // A foreign trade aborts the whole replacement.
    let err = store
        .replace_behavior_tags(
            &user,
            &[tag(mine.trade_id, "outcome_loss"), tag(theirs.trade_id, "outcome_win")],
        )
        .await;
    assert!(err.is_err());

    let tags = store.tags_for_trades(&user, &[mine.trade_id]).await?;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].behavior_code, "outcome_win");
    Ok(())
}
