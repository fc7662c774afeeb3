use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use tg_schemas::{DailyMetrics, Micros, Trade};

pub const DEFAULT_RANGE_DAYS: u32 = 30;
pub const MAX_RANGE_DAYS: u32 = 366;

/// Day a trade is booked on: close date if closed, otherwise open date (UTC).
pub fn metric_date(t: &Trade) -> NaiveDate {
    t.closed_at.unwrap_or(t.opened_at).date_naive()
}

/// Parse a range like `30d` (also `30`, `30D`). Empty means the default.
/// Values are clamped to `1..=MAX_RANGE_DAYS`; garbage yields `None`.
pub fn parse_range(raw: &str) -> Option<u32> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(DEFAULT_RANGE_DAYS);
    }
    let digits = s
        .strip_suffix('d')
        .or_else(|| s.strip_suffix('D'))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Overlong digit strings saturate rather than fail.
    let n: u64 = digits.parse().unwrap_or(u64::MAX);
    Some(n.clamp(1, MAX_RANGE_DAYS as u64) as u32)
}

#[derive(Default)]
struct DayAcc {
    pnl: Micros,
    trades: u64,
    wins: u64,
    win_sum: i128,
    losses: u64,
    loss_sum: i128,
}

fn mean(sum: i128, n: u64) -> Micros {
    if n == 0 {
        return Micros::ZERO;
    }
    let m = sum / n as i128;
    Micros::new(m.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
}

/// Per-day aggregates over trades with a realized pnl whose metric date is
/// within `[today - range_days, today]`, ascending by date. `range_days` is
/// clamped to `1..=MAX_RANGE_DAYS`.
pub fn daily_metrics(trades: &[Trade], today: NaiveDate, range_days: u32) -> Vec<DailyMetrics> {
    let range_days = range_days.clamp(1, MAX_RANGE_DAYS);
    let start = today
        .checked_sub_signed(Duration::days(range_days as i64))
        .unwrap_or(NaiveDate::MIN);
    let mut days: BTreeMap<NaiveDate, DayAcc> = BTreeMap::new();

    for t in trades {
        let Some(pnl) = t.pnl else { continue };
        let date = metric_date(t);
        if date < start || date > today {
            continue;
        }
        let acc = days.entry(date).or_default();
        acc.pnl = acc.pnl.saturating_add(pnl);
        acc.trades += 1;
        if pnl.is_positive() {
            acc.wins += 1;
            acc.win_sum += pnl.raw() as i128;
        } else if pnl.is_negative() {
            acc.losses += 1;
            acc.loss_sum += pnl.raw() as i128;
        }
    }

    days.into_iter()
        .map(|(date, a)| DailyMetrics {
            date,
            pnl: a.pnl,
            trade_count: a.trades,
            win_rate: if a.trades == 0 {
                0.0
            } else {
                a.wins as f64 / a.trades as f64
            },
            avg_win: mean(a.win_sum, a.wins),
            avg_loss: mean(a.loss_sum, a.losses),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_forms() {
        assert_eq!(parse_range(""), Some(30));
        assert_eq!(parse_range("30d"), Some(30));
        assert_eq!(parse_range("7"), Some(7));
        assert_eq!(parse_range("90D"), Some(90));
        assert_eq!(parse_range("0d"), Some(1));
        assert_eq!(parse_range("9999d"), Some(366));
        assert_eq!(parse_range("99999999999999999999999d"), Some(366));
        assert_eq!(parse_range("d"), None);
        assert_eq!(parse_range("-5d"), None);
        assert_eq!(parse_range("1w"), None);
        assert_eq!(parse_range("abc"), None);
    }

    fn closed_on(date: NaiveDate) -> Trade {
        use chrono::{TimeZone, Utc};
        use tg_schemas::Side;
        let at = Utc.from_utc_datetime(&date.and_hms_opt(15, 0, 0).unwrap());
        Trade {
            id: uuid::Uuid::new_v4(),
            user_id: "u".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            qty: Micros::from_units(1),
            price: Micros::from_units(10),
            opened_at: at,
            closed_at: Some(at),
            fees: Micros::ZERO,
            pnl: Some(Micros::from_units(5)),
            raw_hash: date.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn oversized_range_is_clamped() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(daily_metrics(&[], today, u32::MAX).is_empty());

        let inside = closed_on(today - Duration::days(MAX_RANGE_DAYS as i64));
        let outside = closed_on(today - Duration::days(MAX_RANGE_DAYS as i64 + 1));
        let m = daily_metrics(&[inside, outside], today, u32::MAX);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].date, today - Duration::days(366));
    }

    #[test]
    fn zero_range_means_one_day() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let yesterday = closed_on(today - Duration::days(1));
        assert_eq!(daily_metrics(&[yesterday], today, 0).len(), 1);
    }

    #[test]
    fn mean_truncates() {
        assert_eq!(mean(10, 3), Micros::new(3));
        assert_eq!(mean(0, 0), Micros::ZERO);
    }
}
