//! Content fingerprint used as the trade dedup key.
//!
//! `sha256(user|SYMBOL|SIDE|qty|price|opened_at|closed_at)` as lowercase hex.
//! Decimals use the canonical `Micros` rendering and timestamps are RFC 3339
//! UTC with a `Z` suffix, so `"150.250"` and `"150.25"` (or `+00:00` and `Z`)
//! fingerprint identically. Not a security primitive.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tg_schemas::{Micros, NewTrade, Side};

/// The seven fields that identify a logical trade.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintFields<'a> {
    pub user_id: &'a str,
    pub symbol: &'a str,
    pub side: Side,
    pub qty: Micros,
    pub price: Micros,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a NewTrade> for FingerprintFields<'a> {
    fn from(t: &'a NewTrade) -> Self {
        Self {
            user_id: &t.user_id,
            symbol: &t.symbol,
            side: t.side,
            qty: t.qty,
            price: t.price,
            opened_at: t.opened_at,
            closed_at: t.closed_at,
        }
    }
}

/// The exact pre-image that gets hashed.
pub fn canonical_preimage(f: &FingerprintFields<'_>) -> String {
    let closed = f.closed_at.map(format_ts).unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        f.user_id,
        f.symbol.trim().to_ascii_uppercase(),
        f.side.as_str(),
        f.qty,
        f.price,
        format_ts(f.opened_at),
        closed
    )
}

pub fn fingerprint(f: &FingerprintFields<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_preimage(f).as_bytes());
    hex::encode(hasher.finalize())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
