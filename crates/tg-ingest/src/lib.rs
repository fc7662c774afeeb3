//! Trade CSV ingestion: the read side only.
//!
//! Bytes go through [`csv_reader::TradeCsvReader`], which yields one
//! [`mapper::MappedRow`] per non-blank record. [`normalize::normalize_row`]
//! turns a mapped row into a validated [`tg_schemas::NewTrade`] carrying its
//! [`fingerprint`]. Broker ledgers with one row per execution go through
//! [`ledger::load_ledger`] and [`ledger::fifo_round_trips`] instead. Nothing
//! in this crate touches the store.

pub mod csv_reader;
pub mod fingerprint;
pub mod ledger;
pub mod mapper;
pub mod normalize;

pub use csv_reader::{CsvIngestError, RecordOutcome, TradeCsvReader};
pub use fingerprint::{fingerprint, FingerprintFields};
pub use ledger::{
    classify_action, fifo_round_trips, load_ledger, CashEvent, CashKind, Direction, ExecDir,
    Execution, Ledger, LedgerAction, RejectedRow, RoundTrip,
};
pub use mapper::{Field, HeaderMap, MappedRow};
pub use normalize::{normalize_row, parse_timestamp, Leniency, RowError};
