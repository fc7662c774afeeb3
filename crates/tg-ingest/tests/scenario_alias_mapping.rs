//! Alias headers and canonical headers produce identical trades.
//!
//! GREEN when:
//! - `ticker,action,quantity,price,date` and `symbol,side,qty,price,opened_at`
//!   describing the same trade normalize to equal records (hash included);
//! - a quoted field with an embedded comma does not shift later columns;
//! - a short row fails validation instead of being padded with garbage.

use tg_ingest::{normalize_row, Leniency, RowError, TradeCsvReader};
use tg_schemas::NewTrade;

const USER: &str = "user-42";

fn normalize_all(src: &str) -> Vec<Result<NewTrade, RowError>> {
    TradeCsvReader::from_bytes(src.as_bytes())
        .unwrap()
        .map(|rec| rec.row.and_then(|r| normalize_row(USER, &r, Leniency::Csv)))
        .collect()
}

#[test]
fn alias_headers_match_canonical_headers() {
    let canonical = "symbol,side,qty,price,opened_at\nAAPL,BUY,10,150.25,2024-01-02\n";
    let aliased = "ticker,action,quantity,price,date\naapl,buy,10.0,150.250,2024-01-02\n";

    let a = normalize_all(canonical);
    let b = normalize_all(aliased);
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].as_ref().unwrap(), b[0].as_ref().unwrap());
}

#[test]
fn column_order_is_irrelevant() {
    let a = normalize_all("symbol,side,qty,price,opened_at\nAAPL,BUY,10,150.25,2024-01-02\n");
    let b = normalize_all("opened_at,price,qty,side,symbol\n2024-01-02,150.25,10,BUY,AAPL\n");
    assert_eq!(a[0].as_ref().unwrap().raw_hash, b[0].as_ref().unwrap().raw_hash);
}

#[test]
fn quoted_comma_does_not_shift_columns() {
    let src =
        "symbol,notes,side,qty,price,opened_at\nAAPL,\"gap up, faded\",SELL,5,190,2024-01-03\n";
    let out = normalize_all(src);
    let t = out[0].as_ref().unwrap();
    assert_eq!(t.side.as_str(), "SELL");
    assert_eq!(t.price.to_string(), "190");
}

#[test]
fn short_row_is_a_validation_failure() {
    let src = "symbol,side,qty,price,opened_at\nAAPL,BUY,10\nMSFT,SELL,1,400,2024-01-02\n";
    let out = normalize_all(src);
    assert_eq!(out.len(), 2);
    assert_eq!(
        out[0].as_ref().unwrap_err(),
        &RowError::Missing(vec!["price", "opened_at"])
    );
    assert!(out[1].is_ok());
}
