//! Broker ledger -> round-trip trades plus cash events.
//!
//! A ledger has one row per execution or cash movement. Columns are matched
//! case-insensitively; the first candidate present wins:
//!
//! | Column     | Accepted headers                           | Required |
//! |------------|--------------------------------------------|----------|
//! | `date`     | `date`                                     | yes      |
//! | `ticker`   | `ticker`, `symbol`                         | yes      |
//! | `action`   | `action`, `description`                    | yes      |
//! | `quantity` | `quantity`, `qty`, `shares`, `contracts`   | yes      |
//! | `price`    | `price`                                    | yes      |
//! | `amount`   | `amount`, `cash`, `net`                    | no       |
//!
//! The free-text action decides what a row is (see [`classify_action`]).
//! Cash rows become [`CashEvent`]s. Trade rows become [`Execution`]s, which
//! [`fifo_round_trips`] matches per symbol into closed [`RoundTrip`]s.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tg_schemas::{Micros, NewTrade, Side};

use crate::csv_reader::{is_blank, CsvIngestError};
use crate::fingerprint::{fingerprint, FingerprintFields};
use crate::normalize::{parse_timestamp, RowError};

// ---------------------------------------------------------------------------
// Action classification
// ---------------------------------------------------------------------------

/// Execution direction of a trade row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecDir {
    Buy,
    Sell,
    Short,
    Cover,
}

impl ExecDir {
    /// Buy and cover add shares; sell and short remove them.
    pub fn is_buy_side(self) -> bool {
        matches!(self, ExecDir::Buy | ExecDir::Cover)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashKind {
    Deposit,
    Withdraw,
    Fee,
    Interest,
}

impl CashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashKind::Deposit => "deposit",
            CashKind::Withdraw => "withdraw",
            CashKind::Fee => "fee",
            CashKind::Interest => "interest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    Trade(ExecDir),
    Cash(CashKind),
    Ignore,
}

/// Classify free-text action by substring, case-insensitively.
///
/// Cash keywords are checked before trade keywords. "short" means a short
/// sale unless the text also says "cover".
pub fn classify_action(raw: &str) -> LedgerAction {
    let a = raw.trim().to_ascii_lowercase();
    if a.contains("deposit") {
        LedgerAction::Cash(CashKind::Deposit)
    } else if a.contains("withdraw") {
        LedgerAction::Cash(CashKind::Withdraw)
    } else if a.contains("interest") {
        LedgerAction::Cash(CashKind::Interest)
    } else if a.contains("fee") || a.contains("commission") {
        LedgerAction::Cash(CashKind::Fee)
    } else if a.contains("short") && !a.contains("cover") {
        LedgerAction::Trade(ExecDir::Short)
    } else if a.contains("cover") {
        LedgerAction::Trade(ExecDir::Cover)
    } else if a.contains("buy") {
        LedgerAction::Trade(ExecDir::Buy)
    } else if a.contains("sell") {
        LedgerAction::Trade(ExecDir::Sell)
    } else {
        LedgerAction::Ignore
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// 1-based line of the source record (header = line 1).
    pub line: u64,
    pub executed_at: DateTime<Utc>,
    pub symbol: String,
    pub dir: ExecDir,
    /// Always positive; the sign comes from `dir`.
    pub qty: Micros,
    pub price: Micros,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashEvent {
    pub line: u64,
    pub date: DateTime<Utc>,
    pub kind: CashKind,
    /// `None` when the amount cell is absent or not a decimal.
    pub amount: Option<Micros>,
    /// The action text as written.
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub line: u64,
    pub error: RowError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    /// Sorted by symbol, then execution time; file order breaks ties.
    pub executions: Vec<Execution>,
    pub cash_events: Vec<CashEvent>,
    pub rejected: Vec<RejectedRow>,
    /// Rows whose action is neither a trade nor a cash movement.
    pub ignored: u64,
}

struct LedgerColumns {
    date: usize,
    ticker: usize,
    action: usize,
    quantity: usize,
    price: usize,
    amount: Option<usize>,
}

impl LedgerColumns {
    fn resolve(record: &csv::StringRecord) -> Result<Self, CsvIngestError> {
        let headers: Vec<String> = record.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let pick = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|c| headers.iter().position(|h| h == c))
        };

        let date = pick(&["date"]);
        let ticker = pick(&["ticker", "symbol"]);
        let action = pick(&["action", "description"]);
        let quantity = pick(&["quantity", "qty", "shares", "contracts"]);
        let price = pick(&["price"]);
        let amount = pick(&["amount", "cash", "net"]);

        match (date, ticker, action, quantity, price) {
            (Some(date), Some(ticker), Some(action), Some(quantity), Some(price)) => Ok(Self {
                date,
                ticker,
                action,
                quantity,
                price,
                amount,
            }),
            _ => {
                let missing = [
                    ("date", date),
                    ("ticker", ticker),
                    ("action", action),
                    ("quantity", quantity),
                    ("price", price),
                ]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name)
                .collect();
                Err(CsvIngestError::MissingColumns(missing))
            }
        }
    }
}

fn cell(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

/// Read a ledger CSV and split it into executions and cash events.
///
/// Row problems are collected in [`Ledger::rejected`]; only an empty file or
/// a header missing required columns fails the call.
pub fn load_ledger(bytes: &[u8]) -> Result<Ledger, CsvIngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut record = csv::StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(true) if is_blank(&record) => continue,
            Ok(true) => break,
            Ok(false) => return Err(CsvIngestError::Empty),
            Err(e) => return Err(CsvIngestError::Header(e.to_string())),
        }
    }
    let cols = LedgerColumns::resolve(&record)?;

    let mut ledger = Ledger::default();
    loop {
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) if is_blank(&record) => continue,
            Ok(true) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                if let Err(error) = load_row(&cols, &record, line, &mut ledger) {
                    ledger.rejected.push(RejectedRow { line, error });
                }
            }
            Err(e) => {
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    break;
                }
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                ledger.rejected.push(RejectedRow {
                    line,
                    error: RowError::Malformed(e.to_string()),
                });
            }
        }
    }

    // Stable: same-instant executions keep file order.
    ledger
        .executions
        .sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.executed_at.cmp(&b.executed_at)));
    Ok(ledger)
}

fn load_row(
    cols: &LedgerColumns,
    record: &csv::StringRecord,
    line: u64,
    ledger: &mut Ledger,
) -> Result<(), RowError> {
    let action_raw = cell(record, cols.action);
    let dir = match classify_action(action_raw) {
        LedgerAction::Ignore => {
            ledger.ignored += 1;
            return Ok(());
        }
        LedgerAction::Cash(kind) => {
            let date = date_cell(record, cols.date)?;
            let amount = cols
                .amount
                .map(|idx| cell(record, idx))
                .and_then(|raw| Micros::parse(raw).ok());
            ledger.cash_events.push(CashEvent {
                line,
                date,
                kind,
                amount,
                note: action_raw.to_string(),
            });
            return Ok(());
        }
        LedgerAction::Trade(dir) => dir,
    };

    let symbol = cell(record, cols.ticker).to_ascii_uppercase();
    let qty_raw = cell(record, cols.quantity);
    let price_raw = cell(record, cols.price);
    let missing: Vec<&'static str> = [
        ("date", cell(record, cols.date)),
        ("ticker", symbol.as_str()),
        ("quantity", qty_raw),
        ("price", price_raw),
    ]
    .into_iter()
    .filter(|(_, v)| v.is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(RowError::Missing(missing));
    }

    let executed_at = date_cell(record, cols.date)?;
    // Some brokers sign the quantity; the action already carries direction.
    let qty = decimal(qty_raw, "quantity")?
        .raw()
        .checked_abs()
        .map(Micros::new)
        .ok_or_else(|| RowError::InvalidDecimal {
            field: "quantity",
            raw: qty_raw.to_string(),
        })?;
    if !qty.is_positive() {
        return Err(RowError::NotPositive {
            field: "quantity",
            raw: qty_raw.to_string(),
        });
    }
    let price = decimal(price_raw, "price")?;
    if !price.is_positive() {
        return Err(RowError::NotPositive {
            field: "price",
            raw: price_raw.to_string(),
        });
    }

    ledger.executions.push(Execution {
        line,
        executed_at,
        symbol,
        dir,
        qty,
        price,
    });
    Ok(())
}

fn date_cell(record: &csv::StringRecord, idx: usize) -> Result<DateTime<Utc>, RowError> {
    let raw = cell(record, idx);
    parse_timestamp(raw).ok_or_else(|| RowError::InvalidTimestamp {
        field: "date",
        raw: raw.to_string(),
    })
}

fn decimal(raw: &str, field: &'static str) -> Result<Micros, RowError> {
    Micros::parse(raw).map_err(|_| RowError::InvalidDecimal {
        field,
        raw: raw.to_string(),
    })
}

// ---------------------------------------------------------------------------
// FIFO matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Opening side recorded on the journal trade.
    pub fn side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Short,
        }
    }
}

/// One closed slice of a position: an opening lot (or part of it) matched
/// against a closing execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTrip {
    pub symbol: String,
    pub direction: Direction,
    pub qty: Micros,
    pub entry_price: Micros,
    pub exit_price: Micros,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// `None` only when the product does not fit in micros.
    pub realized_pnl: Option<Micros>,
    /// Line of the execution that closed the slice.
    pub closing_line: u64,
}

impl RoundTrip {
    /// Journal trade for this round trip, fingerprint included. Fees are 0;
    /// fee rows live in the cash events.
    pub fn to_new_trade(&self, user_id: &str) -> NewTrade {
        let side = self.direction.side();
        let raw_hash = fingerprint(&FingerprintFields {
            user_id,
            symbol: &self.symbol,
            side,
            qty: self.qty,
            price: self.entry_price,
            opened_at: self.opened_at,
            closed_at: Some(self.closed_at),
        });
        NewTrade {
            user_id: user_id.to_string(),
            symbol: self.symbol.clone(),
            side,
            qty: self.qty,
            price: self.entry_price,
            opened_at: self.opened_at,
            closed_at: Some(self.closed_at),
            fees: Micros::ZERO,
            pnl: self.realized_pnl,
            raw_hash,
        }
    }
}

#[derive(Debug, Clone)]
struct Lot {
    qty: Micros,
    price: Micros,
    opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Book {
    long: VecDeque<Lot>,
    short: VecDeque<Lot>,
}

/// Match executions into round trips with FIFO lots per symbol.
///
/// - Buy/cover: closes short lots oldest first (pnl = (entry - exit) * qty),
///   the remainder opens a long lot.
/// - Sell/short: closes long lots oldest first (pnl = (exit - entry) * qty),
///   the remainder opens a short lot.
///
/// Executions must be in time order within each symbol, as [`load_ledger`]
/// returns them. Lots still open at the end produce nothing. Output is
/// ordered by close time, then symbol.
pub fn fifo_round_trips(executions: &[Execution]) -> Vec<RoundTrip> {
    let mut books: BTreeMap<&str, Book> = BTreeMap::new();
    let mut out = Vec::new();

    for ex in executions {
        let Book { long, short } = books.entry(ex.symbol.as_str()).or_default();
        let (closing, opening, closes) = if ex.dir.is_buy_side() {
            (short, long, Direction::Short)
        } else {
            (long, short, Direction::Long)
        };

        let left = close_fifo(closing, ex, closes, &mut out);
        if left.is_positive() {
            opening.push_back(Lot {
                qty: left,
                price: ex.price,
                opened_at: ex.executed_at,
            });
        }
    }

    out.sort_by(|a, b| a.closed_at.cmp(&b.closed_at).then(a.symbol.cmp(&b.symbol)));
    out
}

/// Consume `lots` against `ex`; returns the quantity left unmatched.
fn close_fifo(
    lots: &mut VecDeque<Lot>,
    ex: &Execution,
    direction: Direction,
    out: &mut Vec<RoundTrip>,
) -> Micros {
    let mut remaining = ex.qty;
    while remaining.is_positive() {
        let Some(lot) = lots.front_mut() else {
            break;
        };
        let used = remaining.min(lot.qty);
        let per_unit = match direction {
            Direction::Long => ex.price.checked_sub(lot.price),
            Direction::Short => lot.price.checked_sub(ex.price),
        };

        out.push(RoundTrip {
            symbol: ex.symbol.clone(),
            direction,
            qty: used,
            entry_price: lot.price,
            exit_price: ex.price,
            opened_at: lot.opened_at,
            closed_at: ex.executed_at,
            realized_pnl: per_unit.and_then(|d| d.checked_mul(used)),
            closing_line: ex.line,
        });

        // used <= both operands, so neither subtraction can underflow.
        remaining = Micros::new(remaining.raw() - used.raw());
        lot.qty = Micros::new(lot.qty.raw() - used.raw());
        if !lot.qty.is_positive() {
            lots.pop_front();
        }
    }
    remaining
}
