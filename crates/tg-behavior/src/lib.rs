//! tg-behavior
//!
//! Behavioral tagging and daily P&L metrics over a user's trades.
//!
//! Pipeline: completed trades -> [`compute_features`] -> [`run_all_rules`]
//! -> one tag per `(trade, behavior_code)`. Day-scope rules are attached to
//! every trade of the day they fire on.
//!
//! Deterministic, pure logic. No IO and no clock; callers pass `today`.

mod catalog;
mod features;
mod metrics;
mod rules;

pub use catalog::{behavior_info, lookup, CatalogEntry, CATALOG};
pub use features::{compute_features, Outcome, TradeFeatures, EPS_PNL};
pub use metrics::{daily_metrics, metric_date, parse_range, DEFAULT_RANGE_DAYS, MAX_RANGE_DAYS};
pub use rules::run_all_rules;
