//! Record-at-a-time CSV reader for trade uploads.
//!
//! Uses the `csv` crate, so quoted fields with embedded commas, quotes or
//! newlines are handled. Records may be shorter or longer than the header.
//! Records whose fields are all blank are skipped without being counted.

use std::fmt;
use std::io::Read;

use crate::mapper::{HeaderMap, MappedRow};
use crate::normalize::RowError;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// File-level failures. Any of these ends the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvIngestError {
    /// No header row at all (empty or whitespace-only payload).
    Empty,
    /// The header row could not be decoded.
    Header(String),
    /// A ledger header lacks required columns, by canonical name.
    MissingColumns(Vec<&'static str>),
}

impl fmt::Display for CsvIngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvIngestError::Empty => write!(f, "csv has no header row"),
            CsvIngestError::Header(msg) => write!(f, "csv header unreadable: {msg}"),
            CsvIngestError::MissingColumns(cols) => {
                write!(f, "csv is missing required columns: {}", cols.join(", "))
            }
        }
    }
}

impl std::error::Error for CsvIngestError {}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// One non-blank data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// 1-based line number where the record starts (header = line 1).
    pub line: u64,
    pub row: Result<MappedRow, RowError>,
}

pub struct TradeCsvReader<R: Read> {
    inner: csv::Reader<R>,
    header: HeaderMap,
    record: csv::StringRecord,
}

impl<R: Read> fmt::Debug for TradeCsvReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradeCsvReader")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl<'a> TradeCsvReader<&'a [u8]> {
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, CsvIngestError> {
        Self::new(bytes)
    }
}

impl<R: Read> TradeCsvReader<R> {
    /// Read and resolve the header row.
    pub fn new(reader: R) -> Result<Self, CsvIngestError> {
        let mut inner = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut record = csv::StringRecord::new();
        // Leading blank records are not a header.
        loop {
            match inner.read_record(&mut record) {
                Ok(true) if is_blank(&record) => continue,
                Ok(true) => break,
                Ok(false) => return Err(CsvIngestError::Empty),
                Err(e) => return Err(CsvIngestError::Header(e.to_string())),
            }
        }

        let header = HeaderMap::from_headers(record.iter());
        Ok(Self {
            inner,
            header,
            record,
        })
    }

    pub fn header(&self) -> &HeaderMap {
        &self.header
    }
}

impl<R: Read> Iterator for TradeCsvReader<R> {
    type Item = RecordOutcome;

    fn next(&mut self) -> Option<RecordOutcome> {
        loop {
            match self.inner.read_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) if is_blank(&self.record) => continue,
                Ok(true) => {
                    let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                    return Some(RecordOutcome {
                        line,
                        row: Ok(self.header.map_record(self.record.iter())),
                    });
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    // An I/O failure cannot be skipped past; anything else is a bad record.
                    if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                        return None;
                    }
                    return Some(RecordOutcome {
                        line,
                        row: Err(RowError::Malformed(e.to_string())),
                    });
                }
            }
        }
    }
}

pub(crate) fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::Field;

    const HEADER: &str = "symbol,side,qty,price,opened_at";

    fn rows(src: &str) -> Vec<RecordOutcome> {
        TradeCsvReader::from_bytes(src.as_bytes()).unwrap().collect()
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert_eq!(
            TradeCsvReader::from_bytes(b"").unwrap_err(),
            CsvIngestError::Empty
        );
        assert_eq!(
            TradeCsvReader::from_bytes(b"\n \n\n").unwrap_err(),
            CsvIngestError::Empty
        );
    }

    #[test]
    fn header_only_yields_no_records() {
        assert!(rows(HEADER).is_empty());
        assert!(rows(&format!("{HEADER}\n")).is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let src =
            format!("{HEADER}\n\nAAPL,BUY,1,2,2024-01-01\n , , \n\nMSFT,SELL,1,2,2024-01-01\n");
        let out = rows(&src);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].row.as_ref().unwrap().get(Field::Symbol), Some("AAPL"));
        assert_eq!(out[1].row.as_ref().unwrap().get(Field::Symbol), Some("MSFT"));
    }

    #[test]
    fn quoted_fields_with_commas() {
        let src = concat!(
            "symbol,side,qty,price,opened_at,notes\n",
            "\"BRK.B\",BUY,\"1,000\",\"410.5\",2024-01-01,\"hello, world\"\n",
        );
        let out = rows(src);
        assert_eq!(out.len(), 1);
        let row = out[0].row.as_ref().unwrap();
        assert_eq!(row.get(Field::Symbol), Some("BRK.B"));
        assert_eq!(row.get(Field::Qty), Some("1,000"));
        assert_eq!(row.get(Field::Price), Some("410.5"));
    }

    #[test]
    fn values_are_trimmed() {
        let out = rows(&format!("{HEADER}\n  AAPL , buy ,  1 , 2 , 2024-01-01 "));
        let row = out[0].row.as_ref().unwrap();
        assert_eq!(row.get(Field::Symbol), Some("AAPL"));
        assert_eq!(row.get(Field::Side), Some("buy"));
    }

    #[test]
    fn data_records_start_after_header() {
        let out = rows(&format!("{HEADER}\nAAPL,BUY,1,2,2024-01-01\nMSFT,BUY,1,2,2024-01-01\n"));
        assert!(out[0].line >= 2);
        assert!(out[1].line > out[0].line);
    }

    #[test]
    fn crlf_line_endings() {
        let out = rows("symbol,side,qty,price,opened_at\r\nAAPL,BUY,1,2,2024-01-01\r\n");
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].row.as_ref().unwrap().get(Field::OpenedAt),
            Some("2024-01-01")
        );
    }
}
