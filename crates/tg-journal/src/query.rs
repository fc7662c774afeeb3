//! Read models: trade pages with tags, run history, daily metrics.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tg_behavior::behavior_info;
use tg_db::{TradeQuery, TradeStore};
use tg_schemas::{BehaviorTagRow, DailyMetrics, IngestionRun, TagView, TradeWithTags};
use uuid::Uuid;

pub const DEFAULT_RUNS_LIMIT: u32 = 20;
pub const MAX_RUNS_LIMIT: u32 = 100;

/// Attach the catalog entry to each stored tag.
pub fn tag_views(rows: Vec<BehaviorTagRow>) -> Vec<TagView> {
    rows.into_iter()
        .map(|tag| {
            let behaviors = behavior_info(&tag.behavior_code);
            TagView { tag, behaviors }
        })
        .collect()
}

/// One page of the user's trades, newest first, each with its tags.
pub async fn list_trades_with_tags(
    store: &dyn TradeStore,
    query: TradeQuery,
) -> Result<Vec<TradeWithTags>> {
    let query = query.clamped();
    let trades = store
        .list_trades(&query)
        .await
        .with_context(|| format!("list trades user={}", query.user_id))?;
    if trades.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = trades.iter().map(|t| t.id).collect();
    let rows = store
        .tags_for_trades(&query.user_id, &ids)
        .await
        .context("load behavior tags")?;

    let mut by_trade: HashMap<Uuid, Vec<BehaviorTagRow>> = HashMap::new();
    for row in rows {
        by_trade.entry(row.trade_id).or_default().push(row);
    }

    Ok(trades
        .into_iter()
        .map(|trade| {
            let tags = by_trade.remove(&trade.id).unwrap_or_default();
            TradeWithTags {
                trade,
                trade_behavior_tags: tag_views(tags),
            }
        })
        .collect())
}

/// Most recent runs first. `limit` is clamped to `1..=MAX_RUNS_LIMIT`.
pub async fn list_ingest_runs(
    store: &dyn TradeStore,
    user_id: &str,
    limit: Option<u32>,
) -> Result<Vec<IngestionRun>> {
    let limit = limit.unwrap_or(DEFAULT_RUNS_LIMIT).clamp(1, MAX_RUNS_LIMIT);
    store
        .list_ingest_runs(user_id, limit)
        .await
        .with_context(|| format!("list ingest runs user={user_id}"))
}

/// Daily metrics over `[today - range_days, today]`.
pub async fn daily_metrics(
    store: &dyn TradeStore,
    user_id: &str,
    today: NaiveDate,
    range_days: u32,
) -> Result<Vec<DailyMetrics>> {
    let trades = store
        .trades_for_user(user_id)
        .await
        .with_context(|| format!("load trades for metrics user={user_id}"))?;
    Ok(tg_behavior::daily_metrics(&trades, today, range_days))
}
