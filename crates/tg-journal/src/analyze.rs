//! Behavior analysis: features -> rules -> tag replacement.

use anyhow::{Context, Result};
use serde::Serialize;
use tg_behavior::{compute_features, run_all_rules};
use tg_db::TradeStore;
use tg_schemas::TagView;
use tracing::info;
use uuid::Uuid;

use crate::query::tag_views;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    /// Trades with a realized pnl that went through the rules.
    pub trades_analyzed: u64,
    pub tags_written: u64,
}

/// Re-derive every behavior tag of `user_id` and replace the stored set.
/// Running it twice on unchanged trades writes the same tags.
pub async fn analyze_user(store: &dyn TradeStore, user_id: &str) -> Result<AnalysisSummary> {
    let trades = store
        .trades_for_user(user_id)
        .await
        .with_context(|| format!("load trades for analysis user={user_id}"))?;

    let features = compute_features(&trades);
    let tags = run_all_rules(&features);

    let tags_written = store
        .replace_behavior_tags(user_id, &tags)
        .await
        .with_context(|| format!("replace behavior tags user={user_id}"))?;

    let summary = AnalysisSummary {
        trades_analyzed: features.len() as u64,
        tags_written,
    };
    info!(
        user_id,
        trades_analyzed = summary.trades_analyzed,
        tags_written = summary.tags_written,
        "analysis completed"
    );
    Ok(summary)
}

/// Analyze the user and return the tags of one trade.
///
/// `None` when the trade does not exist or belongs to someone else; nothing
/// is written in that case.
pub async fn analyze_trade(
    store: &dyn TradeStore,
    user_id: &str,
    trade_id: Uuid,
) -> Result<Option<Vec<TagView>>> {
    if store
        .fetch_trade(user_id, trade_id)
        .await
        .context("fetch trade for analysis")?
        .is_none()
    {
        return Ok(None);
    }

    analyze_user(store, user_id).await?;

    let rows = store
        .tags_for_trades(user_id, &[trade_id])
        .await
        .context("load trade tags")?;
    Ok(Some(tag_views(rows)))
}
