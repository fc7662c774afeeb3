use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tg_schemas::{NewBehaviorTag, TagScope};
use uuid::Uuid;

use crate::features::{Outcome, TradeFeatures, EPS_PNL};

const OVERTRADING_MIN: usize = 5;
const CHOP_ABS_PNL_MAX: f64 = 50.0;
const SIZE_Z_THRESHOLD: f64 = 2.0;
const DISCIPLINED_SIZE_Z_MAX: f64 = 0.5;
const CONSISTENT_SIZE_Z_ABS_MAX: f64 = 0.5;
const LOW_ACTIVITY_MAX: usize = 2;
const FOCUS_DOMINANT_FRAC: f64 = 0.8;

const TICKER_BIAS_MIN_TRADES: usize = 5;
const TICKER_BIAS_MEAN_PNL_MAX: f64 = -10.0;
const TICKER_BIAS_RECENT_K: usize = 5;
const TICKER_BIAS_RECENT_MEAN_MAX: f64 = -5.0;

#[derive(Debug, Clone)]
enum Target {
    Trade(Uuid),
    Day(NaiveDate),
}

#[derive(Debug, Clone)]
struct Emission {
    target: Target,
    code: &'static str,
    confidence: f64,
    rationale: String,
}

impl Emission {
    fn trade(f: &TradeFeatures, code: &'static str, confidence: f64, rationale: String) -> Self {
        Self {
            target: Target::Trade(f.trade_id),
            code,
            confidence,
            rationale,
        }
    }

    fn day(date: NaiveDate, code: &'static str, confidence: f64, rationale: String) -> Self {
        Self {
            target: Target::Day(date),
            code,
            confidence,
            rationale,
        }
    }
}

/// Run every trade and day rule over `features` (as produced by
/// `compute_features`) and return one tag per `(trade, code)`.
///
/// Day-scope tags land on every trade of that day. When a code is emitted
/// more than once for a trade, the highest confidence wins (first emission
/// on ties). Output follows the feature order, then rule order.
pub fn run_all_rules(features: &[TradeFeatures]) -> Vec<NewBehaviorTag> {
    let days = group_days(features);

    let mut emitted: Vec<Emission> = Vec::new();
    for f in features {
        trade_rules(f, &mut emitted);
    }
    for (date, trades) in &days {
        day_rules(*date, trades, &mut emitted);
    }
    ticker_bias(features, &mut emitted);

    // Expand day emissions onto trades, keep the best per (trade, code).
    let mut order: Vec<(Uuid, &'static str)> = Vec::new();
    let mut best: HashMap<(Uuid, &'static str), NewBehaviorTag> = HashMap::new();
    let mut offer = |trade_id: Uuid, e: &Emission, scope: TagScope| {
        let key = (trade_id, e.code);
        match best.get_mut(&key) {
            Some(cur) if cur.confidence >= e.confidence => {}
            Some(cur) => {
                cur.confidence = e.confidence;
                cur.rationale = e.rationale.clone();
            }
            None => {
                order.push(key);
                best.insert(
                    key,
                    NewBehaviorTag {
                        trade_id,
                        behavior_code: e.code.to_string(),
                        confidence: e.confidence,
                        rationale: e.rationale.clone(),
                        scope,
                    },
                );
            }
        }
    };

    for e in &emitted {
        match &e.target {
            Target::Trade(id) => offer(*id, e, TagScope::Trade),
            Target::Day(date) => {
                if let Some(trades) = days.get(date) {
                    for f in trades {
                        offer(f.trade_id, e, TagScope::Day);
                    }
                }
            }
        }
    }

    let rank: HashMap<Uuid, usize> = features
        .iter()
        .enumerate()
        .map(|(i, f)| (f.trade_id, i))
        .collect();
    let mut keyed: Vec<(usize, usize, NewBehaviorTag)> = order
        .into_iter()
        .enumerate()
        .filter_map(|(seq, key)| {
            let r = rank.get(&key.0).copied().unwrap_or(usize::MAX);
            best.remove(&key).map(|t| (r, seq, t))
        })
        .collect();
    keyed.sort_by_key(|(r, seq, _)| (*r, *seq));
    keyed.into_iter().map(|(_, _, t)| t).collect()
}

fn group_days(features: &[TradeFeatures]) -> BTreeMap<NaiveDate, Vec<&TradeFeatures>> {
    let mut days: BTreeMap<NaiveDate, Vec<&TradeFeatures>> = BTreeMap::new();
    for f in features {
        days.entry(f.trade_date).or_default().push(f);
    }
    days
}

fn is_revenge(f: &TradeFeatures) -> bool {
    f.follows_prev_same_day() && f.prev_outcome_day == Some(Outcome::Loss)
}

// ---------------------------------------------------------------------------
// Trade scope
// ---------------------------------------------------------------------------

fn trade_rules(f: &TradeFeatures, out: &mut Vec<Emission>) {
    match f.outcome {
        Outcome::Win => out.push(Emission::trade(
            f,
            "outcome_win",
            0.9,
            format!("Win: PnL ${:.2}", f.pnl),
        )),
        Outcome::Loss => out.push(Emission::trade(
            f,
            "outcome_loss",
            0.9,
            format!("Loss: PnL ${:.2}", f.pnl),
        )),
        Outcome::Breakeven => out.push(Emission::trade(
            f,
            "outcome_breakeven",
            0.8,
            "Breakeven within tolerance".to_string(),
        )),
    }

    if f.large_win {
        out.push(Emission::trade(
            f,
            "large_win",
            0.75,
            format!("Top-decile win (PnL ${:.2})", f.pnl),
        ));
    }
    if f.large_loss {
        out.push(Emission::trade(
            f,
            "large_loss",
            0.85,
            format!("Worst-decile loss (PnL ${:.2})", f.pnl),
        ));
    }

    let same = if f.same_symbol_as_prev_day { " (same ticker)" } else { "" };
    if is_revenge(f) {
        let conf = if f.same_symbol_as_prev_day { 0.9 } else { 0.75 };
        out.push(Emission::trade(
            f,
            "revenge_immediate",
            conf,
            format!("Immediate re-entry after loss{same}"),
        ));
    }

    if f.size_z >= SIZE_Z_THRESHOLD {
        out.push(Emission::trade(
            f,
            "size_inconsistency",
            0.75,
            format!(
                "Size {:.1}σ above median (notional ${})",
                f.size_z,
                group_thousands(f.notional)
            ),
        ));
    }

    if f.follows_prev_same_day() && f.prev_outcome_day == Some(Outcome::Win) {
        let conf = if f.same_symbol_as_prev_day { 0.85 } else { 0.7 };
        out.push(Emission::trade(
            f,
            "follow_through_win_immediate",
            conf,
            format!("Immediate follow-through after win{same}"),
        ));
    }

    if is_revenge(f) && f.size_z <= DISCIPLINED_SIZE_Z_MAX {
        out.push(Emission::trade(
            f,
            "disciplined_after_loss_immediate",
            0.8,
            format!("Composed re-entry after loss (size {:.1}σ, within discipline)", f.size_z),
        ));
    }

    if f.size_z.abs() <= CONSISTENT_SIZE_Z_ABS_MAX {
        out.push(Emission::trade(
            f,
            "consistent_size",
            0.6,
            format!("Consistent position sizing ({:.1}σ from typical)", f.size_z),
        ));
    }
}

// ---------------------------------------------------------------------------
// Day scope
// ---------------------------------------------------------------------------

fn day_rules(date: NaiveDate, trades: &[&TradeFeatures], out: &mut Vec<Emission>) {
    let n = trades.len();
    let pnl: f64 = trades.iter().map(|f| f.pnl).sum();

    if n >= OVERTRADING_MIN {
        out.push(Emission::day(
            date,
            "overtrading_day",
            0.8,
            format!("{n} trades; day PnL ${pnl:.2}"),
        ));
    }

    let any_revenge = trades.iter().any(|f| is_revenge(f));
    let has_loss = trades.iter().any(|f| f.pnl < -EPS_PNL);
    if any_revenge || (has_loss && n >= OVERTRADING_MIN) {
        out.push(Emission::day(
            date,
            "revenge_day",
            0.75,
            "Loss-anchored high-activity episode".to_string(),
        ));
    }

    if n >= OVERTRADING_MIN && pnl.abs() <= CHOP_ABS_PNL_MAX {
        out.push(Emission::day(
            date,
            "chop_day",
            0.6,
            format!("High activity ({n}) with flat PnL ${pnl:.2}"),
        ));
    }

    let mut per_symbol: HashMap<&str, usize> = HashMap::new();
    for f in trades {
        *per_symbol.entry(f.symbol.as_str()).or_insert(0) += 1;
    }
    let tickers = per_symbol.len();
    let focus_conf = if tickers == 1 {
        if pnl > 0.0 {
            if n <= 5 {
                1.0
            } else {
                0.85
            }
        } else {
            0.6
        }
    } else {
        let top = per_symbol.values().copied().max().unwrap_or(0);
        if n > 0 && top as f64 / n as f64 >= FOCUS_DOMINANT_FRAC {
            0.5
        } else {
            0.0
        }
    };
    if focus_conf > 0.0 {
        out.push(Emission::day(
            date,
            "focused_day",
            focus_conf,
            format!("{tickers} tickers, PnL {pnl:.2}, trades={n}"),
        ));
    }

    if n <= LOW_ACTIVITY_MAX && pnl > 0.0 {
        let conf = if pnl >= 200.0 {
            1.0
        } else if pnl >= 50.0 {
            0.8
        } else {
            0.6
        };
        out.push(Emission::day(
            date,
            "green_day_low_activity",
            conf,
            format!("{n} trades, PnL {pnl:.2}"),
        ));
    }
}

/// Ticker-level expectancy, emitted on every day the ticker was traded.
fn ticker_bias(features: &[TradeFeatures], out: &mut Vec<Emission>) {
    let mut by_symbol: BTreeMap<&str, Vec<&TradeFeatures>> = BTreeMap::new();
    for f in features {
        by_symbol.entry(f.symbol.as_str()).or_default().push(f);
    }

    for (symbol, trades) in by_symbol {
        let mut dates: Vec<NaiveDate> = trades.iter().map(|f| f.trade_date).collect();
        dates.dedup();

        let n = trades.len();
        let total: f64 = trades.iter().map(|f| f.pnl).sum();
        let mean = total / n as f64;
        if n >= TICKER_BIAS_MIN_TRADES && mean <= TICKER_BIAS_MEAN_PNL_MAX {
            for d in &dates {
                out.push(Emission::day(
                    *d,
                    "ticker_bias_lifetime",
                    0.8,
                    format!(
                        "Ticker {} negative expectancy (n={}, avg ${:.2}, total ${:.2})",
                        symbol, n, mean, total
                    ),
                ));
            }
        }

        let recent = &trades[n.saturating_sub(TICKER_BIAS_RECENT_K)..];
        let recent_mean = recent.iter().map(|f| f.pnl).sum::<f64>() / recent.len() as f64;
        if recent_mean <= TICKER_BIAS_RECENT_MEAN_MAX {
            for d in &dates {
                out.push(Emission::day(
                    *d,
                    "ticker_bias_recent",
                    0.7,
                    format!(
                        "Ticker {}: last {} trades mean ${:.2}",
                        symbol, TICKER_BIAS_RECENT_K, recent_mean
                    ),
                ));
            }
        }
    }
}

/// `1234567.4` -> `1,234,567`.
fn group_thousands(x: f64) -> String {
    let rounded = format!("{:.0}", x.abs());
    let mut out = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if x < 0.0 && rounded != "0" {
        out.insert(0, '-');
    }
    out
}
