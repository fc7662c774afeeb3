//! Mapped row -> validated [`NewTrade`].

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tg_schemas::{Micros, NewTrade, Side};

use crate::fingerprint::{fingerprint, FingerprintFields};
use crate::mapper::{Field, MappedRow};

/// How optional money columns are treated when they do not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leniency {
    /// CSV upload: unparseable `fees` become 0, unparseable `pnl` becomes null.
    Csv,
    /// Single-trade API: every present value must parse.
    Strict,
}

/// Why one row could not become a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// Required fields with no value, by canonical name.
    Missing(Vec<&'static str>),
    UnknownSide(String),
    InvalidDecimal { field: &'static str, raw: String },
    NotPositive { field: &'static str, raw: String },
    NegativeFees(String),
    InvalidTimestamp { field: &'static str, raw: String },
    /// The CSV layer could not decode the record at all.
    Malformed(String),
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::Missing(fields) => {
                write!(f, "missing required fields: {}", fields.join(", "))
            }
            RowError::UnknownSide(raw) => {
                write!(f, "side must be one of BUY, SELL, SHORT, COVER (got '{raw}')")
            }
            RowError::InvalidDecimal { field, raw } => {
                write!(f, "field '{field}' is not a valid decimal: '{raw}'")
            }
            RowError::NotPositive { field, raw } => {
                write!(f, "field '{field}' must be greater than 0 (got '{raw}')")
            }
            RowError::NegativeFees(raw) => write!(f, "fees must not be negative (got '{raw}')"),
            RowError::InvalidTimestamp { field, raw } => {
                write!(f, "field '{field}' is not a recognised timestamp: '{raw}'")
            }
            RowError::Malformed(msg) => write!(f, "malformed csv record: {msg}"),
        }
    }
}

impl std::error::Error for RowError {}

/// Validate `row` and build the trade, fingerprint included.
///
/// Symbol is trimmed and upper-cased; side is parsed case-insensitively.
pub fn normalize_row(
    user_id: &str,
    row: &MappedRow,
    leniency: Leniency,
) -> Result<NewTrade, RowError> {
    let missing = row.missing_required();
    if !missing.is_empty() {
        return Err(RowError::Missing(missing));
    }

    // Presence was checked above; empty-string fallbacks never reach the parsers.
    let symbol = row.get(Field::Symbol).unwrap_or_default().to_ascii_uppercase();
    let side_raw = row.get(Field::Side).unwrap_or_default();
    let side = Side::parse(side_raw).ok_or_else(|| RowError::UnknownSide(side_raw.to_string()))?;

    let qty = positive_decimal(row, Field::Qty)?;
    let price = positive_decimal(row, Field::Price)?;

    let opened_at = timestamp(row, Field::OpenedAt)?.unwrap_or_default();
    let closed_at = timestamp(row, Field::ClosedAt)?;

    let fees = match optional_decimal(row, Field::Fees, leniency)? {
        Some(v) if v.is_negative() => {
            return Err(RowError::NegativeFees(v.to_string()));
        }
        Some(v) => v,
        None => Micros::ZERO,
    };
    let pnl = optional_decimal(row, Field::Pnl, leniency)?;

    let raw_hash = fingerprint(&FingerprintFields {
        user_id,
        symbol: &symbol,
        side,
        qty,
        price,
        opened_at,
        closed_at,
    });

    Ok(NewTrade {
        user_id: user_id.to_string(),
        symbol,
        side,
        qty,
        price,
        opened_at,
        closed_at,
        fees,
        pnl,
        raw_hash,
    })
}

fn positive_decimal(row: &MappedRow, field: Field) -> Result<Micros, RowError> {
    let raw = row.get(field).unwrap_or_default();
    let v = Micros::parse(raw).map_err(|_| RowError::InvalidDecimal {
        field: field.name(),
        raw: raw.to_string(),
    })?;
    if !v.is_positive() {
        return Err(RowError::NotPositive {
            field: field.name(),
            raw: raw.to_string(),
        });
    }
    Ok(v)
}

fn optional_decimal(
    row: &MappedRow,
    field: Field,
    leniency: Leniency,
) -> Result<Option<Micros>, RowError> {
    let Some(raw) = row.get(field) else {
        return Ok(None);
    };
    match (Micros::parse(raw), leniency) {
        (Ok(v), _) => Ok(Some(v)),
        (Err(_), Leniency::Csv) => Ok(None),
        (Err(_), Leniency::Strict) => Err(RowError::InvalidDecimal {
            field: field.name(),
            raw: raw.to_string(),
        }),
    }
}

fn timestamp(row: &MappedRow, field: Field) -> Result<Option<DateTime<Utc>>, RowError> {
    let Some(raw) = row.get(field) else {
        return Ok(None);
    };
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| RowError::InvalidTimestamp {
            field: field.name(),
            raw: raw.to_string(),
        })
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Accepts RFC 3339 (any offset, converted to UTC), naive date-times and bare
/// dates. Naive values are taken as UTC; bare dates as UTC midnight.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(ndt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn good() -> MappedRow {
        MappedRow::default()
            .with(Field::Symbol, "aapl")
            .with(Field::Side, "buy")
            .with(Field::Qty, "10")
            .with(Field::Price, "150.250")
            .with(Field::OpenedAt, "2024-01-02T14:30:00Z")
    }

    #[test]
    fn normalizes_symbol_side_and_defaults() {
        let t = normalize_row("u1", &good(), Leniency::Csv).unwrap();
        assert_eq!(t.symbol, "AAPL");
        assert_eq!(t.side, Side::Buy);
        assert_eq!(t.price.to_string(), "150.25");
        assert_eq!(t.fees, Micros::ZERO);
        assert_eq!(t.pnl, None);
        assert_eq!(t.closed_at, None);
        assert_eq!(t.raw_hash.len(), 64);
    }

    #[test]
    fn missing_fields_are_listed() {
        let row = MappedRow::default().with(Field::Symbol, "AAPL");
        match normalize_row("u1", &row, Leniency::Strict) {
            Err(RowError::Missing(f)) => assert_eq!(f, vec!["side", "qty", "price", "opened_at"]),
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn unknown_side_rejected() {
        let row = good().with(Field::Side, "long");
        assert_eq!(
            normalize_row("u1", &row, Leniency::Csv),
            Err(RowError::UnknownSide("long".to_string()))
        );
    }

    #[test]
    fn non_numeric_and_non_positive_qty_rejected() {
        let row = good().with(Field::Qty, "ten");
        assert!(matches!(
            normalize_row("u1", &row, Leniency::Csv),
            Err(RowError::InvalidDecimal { field: "qty", .. })
        ));
        let row = good().with(Field::Price, "0");
        assert!(matches!(
            normalize_row("u1", &row, Leniency::Csv),
            Err(RowError::NotPositive { field: "price", .. })
        ));
    }

    #[test]
    fn lenient_money_columns() {
        let row = good().with(Field::Fees, "n/a").with(Field::Pnl, "oops");
        let t = normalize_row("u1", &row, Leniency::Csv).unwrap();
        assert_eq!(t.fees, Micros::ZERO);
        assert_eq!(t.pnl, None);

        assert!(matches!(
            normalize_row("u1", &row, Leniency::Strict),
            Err(RowError::InvalidDecimal { field: "fees", .. })
        ));
    }

    #[test]
    fn zero_pnl_is_kept() {
        let row = good().with(Field::Pnl, "0");
        let t = normalize_row("u1", &row, Leniency::Csv).unwrap();
        assert_eq!(t.pnl, Some(Micros::ZERO));
    }

    #[test]
    fn negative_fees_rejected_in_both_modes() {
        let row = good().with(Field::Fees, "-1.5");
        for mode in [Leniency::Csv, Leniency::Strict] {
            assert_eq!(
                normalize_row("u1", &row, mode),
                Err(RowError::NegativeFees("-1.5".to_string()))
            );
        }
    }

    #[test]
    fn bad_closed_at_is_a_row_error() {
        let row = good().with(Field::ClosedAt, "yesterday");
        assert!(matches!(
            normalize_row("u1", &row, Leniency::Csv),
            Err(RowError::InvalidTimestamp { field: "closed_at", .. })
        ));
    }

    #[test]
    fn timestamp_formats() {
        let expect = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        for raw in [
            "2024-01-02T14:30:00Z",
            "2024-01-02T09:30:00-05:00",
            "2024-01-02 14:30:00",
            "2024-01-02T14:30:00",
            "2024-01-02 14:30",
            "01/02/2024 14:30",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expect), "format {raw}");
        }
        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01"), Some(midnight));
        assert_eq!(parse_timestamp("03/01/2024"), Some(midnight));
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn offset_and_utc_renderings_fingerprint_identically() {
        let a = normalize_row("u1", &good(), Leniency::Csv).unwrap();
        let b = normalize_row(
            "u1",
            &good().with(Field::OpenedAt, "2024-01-02T15:30:00+01:00"),
            Leniency::Csv,
        )
        .unwrap();
        assert_eq!(a.raw_hash, b.raw_hash);
    }
}
