use std::collections::BTreeMap;

use chrono::NaiveDate;
use tg_schemas::Trade;
use uuid::Uuid;

/// |PnL| <= EPS_PNL dollars is a breakeven.
pub const EPS_PNL: f64 = 1.0;
/// Quantile above which a win (or below which a loss) counts as large.
const LARGE_PCT: f64 = 0.90;
/// MAD -> sigma for normally distributed data.
const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Breakeven,
}

impl Outcome {
    fn of(pnl: f64) -> Self {
        if pnl > EPS_PNL {
            Outcome::Win
        } else if pnl < -EPS_PNL {
            Outcome::Loss
        } else {
            Outcome::Breakeven
        }
    }
}

/// Per-trade features consumed by the rules.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFeatures {
    pub trade_id: Uuid,
    /// UTC date of `opened_at`.
    pub trade_date: NaiveDate,
    pub symbol: String,
    pub pnl: f64,
    pub outcome: Outcome,
    pub notional: f64,
    /// Robust z-score of notional across the user's completed trades.
    pub size_z: f64,
    /// Outcome of the previous trade on the same day; `None` for the first.
    pub prev_outcome_day: Option<Outcome>,
    pub same_symbol_as_prev_day: bool,
    pub day_trade_count: usize,
    pub day_pnl: f64,
    pub large_win: bool,
    pub large_loss: bool,
}

impl TradeFeatures {
    /// There is an earlier trade on the same day.
    pub fn follows_prev_same_day(&self) -> bool {
        self.prev_outcome_day.is_some()
    }
}

/// Features for every trade with a realized pnl, ordered by `(opened_at, id)`.
/// Trades without pnl are ignored.
pub fn compute_features(trades: &[Trade]) -> Vec<TradeFeatures> {
    let mut completed: Vec<&Trade> = trades.iter().filter(|t| t.pnl.is_some()).collect();
    completed.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.id.cmp(&b.id)));

    let pnls: Vec<f64> = completed
        .iter()
        .map(|t| t.pnl.map(|p| p.to_f64()).unwrap_or(0.0))
        .collect();
    let notionals: Vec<f64> = completed
        .iter()
        .map(|t| t.qty.to_f64() * t.price.to_f64())
        .collect();
    let size_z = robust_z(&notionals);

    let win_thr = quantile(
        &pnls.iter().map(|&p| if p > 0.0 { p } else { 0.0 }).collect::<Vec<_>>(),
        LARGE_PCT,
    );
    let loss_thr = quantile(
        &pnls.iter().map(|&p| if p < 0.0 { -p } else { 0.0 }).collect::<Vec<_>>(),
        LARGE_PCT,
    );

    // Day aggregates.
    let mut days: BTreeMap<NaiveDate, (usize, f64)> = BTreeMap::new();
    for (t, &p) in completed.iter().zip(&pnls) {
        let e = days.entry(t.trade_date()).or_insert((0, 0.0));
        e.0 += 1;
        e.1 += p;
    }

    let mut out: Vec<TradeFeatures> = Vec::with_capacity(completed.len());
    for (i, t) in completed.iter().enumerate() {
        let trade_date = t.trade_date();
        let pnl = pnls[i];
        let (day_trade_count, day_pnl) = days.get(&trade_date).copied().unwrap_or((1, pnl));

        let prev = out.last().filter(|p| p.trade_date == trade_date);
        let prev_outcome_day = prev.map(|p| p.outcome);
        let same_symbol_as_prev_day = prev.map(|p| p.symbol == t.symbol).unwrap_or(false);

        out.push(TradeFeatures {
            trade_id: t.id,
            trade_date,
            symbol: t.symbol.clone(),
            pnl,
            outcome: Outcome::of(pnl),
            notional: notionals[i],
            size_z: size_z[i],
            prev_outcome_day,
            same_symbol_as_prev_day,
            day_trade_count,
            day_pnl,
            large_win: pnl > 0.0 && pnl >= win_thr,
            large_loss: pnl < 0.0 && -pnl >= loss_thr,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

pub(crate) fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let v = sorted(xs);
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

/// Linear-interpolated quantile (`q` in 0..=1).
pub(crate) fn quantile(xs: &[f64], q: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let v = sorted(xs);
    let pos = q.clamp(0.0, 1.0) * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    v[lo] + (v[hi] - v[lo]) * (pos - lo as f64)
}

/// `(x - median) / (1.4826 * MAD)`; all zeros when MAD is 0.
pub(crate) fn robust_z(xs: &[f64]) -> Vec<f64> {
    let med = median(xs);
    let dev: Vec<f64> = xs.iter().map(|x| (x - med).abs()).collect();
    let mad = median(&dev);
    if mad == 0.0 || !mad.is_finite() {
        return vec![0.0; xs.len()];
    }
    xs.iter().map(|x| (x - med) / (MAD_SCALE * mad)).collect()
}
