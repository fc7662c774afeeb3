//! Header aliases onto canonical trade fields.
//!
//! | Field       | Accepted headers (first non-empty wins) |
//! |-------------|-----------------------------------------|
//! | `symbol`    | `symbol`, `ticker`                      |
//! | `side`      | `side`, `action`                        |
//! | `qty`       | `qty`, `quantity`                       |
//! | `price`     | `price`                                 |
//! | `opened_at` | `opened_at`, `date`                     |
//! | `closed_at` | `closed_at`                             |
//! | `fees`      | `fees`                                  |
//! | `pnl`       | `pnl`                                   |
//!
//! Header matching is case-insensitive and ignores surrounding whitespace.
//! Unknown headers are ignored.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Symbol,
    Side,
    Qty,
    Price,
    OpenedAt,
    ClosedAt,
    Fees,
    Pnl,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Symbol,
        Field::Side,
        Field::Qty,
        Field::Price,
        Field::OpenedAt,
        Field::ClosedAt,
        Field::Fees,
        Field::Pnl,
    ];

    /// Canonical (wire / column) name.
    pub fn name(&self) -> &'static str {
        match self {
            Field::Symbol => "symbol",
            Field::Side => "side",
            Field::Qty => "qty",
            Field::Price => "price",
            Field::OpenedAt => "opened_at",
            Field::ClosedAt => "closed_at",
            Field::Fees => "fees",
            Field::Pnl => "pnl",
        }
    }

    /// Header names that map onto this field, in priority order.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Symbol => &["symbol", "ticker"],
            Field::Side => &["side", "action"],
            Field::Qty => &["qty", "quantity"],
            Field::Price => &["price"],
            Field::OpenedAt => &["opened_at", "date"],
            Field::ClosedAt => &["closed_at"],
            Field::Fees => &["fees"],
            Field::Pnl => &["pnl"],
        }
    }

    fn index(&self) -> usize {
        match self {
            Field::Symbol => 0,
            Field::Side => 1,
            Field::Qty => 2,
            Field::Price => 3,
            Field::OpenedAt => 4,
            Field::ClosedAt => 5,
            Field::Fees => 6,
            Field::Pnl => 7,
        }
    }
}

/// Raw string values for one record, keyed by canonical field.
///
/// Values are trimmed; empty strings are stored as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRow {
    values: [Option<String>; 8],
}

impl MappedRow {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values[field.index()].as_deref()
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let v = value.into();
        let t = v.trim();
        self.values[field.index()] = if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        };
    }

    /// Builder form of [`MappedRow::set`].
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Required fields (`symbol`, `side`, `qty`, `price`, `opened_at`) that are
    /// absent, by canonical name.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            Field::Symbol,
            Field::Side,
            Field::Qty,
            Field::Price,
            Field::OpenedAt,
        ]
        .into_iter()
        .filter(|f| self.get(*f).is_none())
        .map(|f| f.name())
        .collect()
    }
}

/// Column positions for every canonical field, resolved once per file.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    columns: [Vec<usize>; 8],
}

impl HeaderMap {
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized: Vec<String> = headers
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();

        let mut columns: [Vec<usize>; 8] = Default::default();
        for field in Field::ALL {
            for alias in field.aliases() {
                for (i, h) in normalized.iter().enumerate() {
                    if h == alias {
                        columns[field.index()].push(i);
                    }
                }
            }
        }
        Self { columns }
    }

    /// True if at least one header maps onto `field`.
    pub fn has(&self, field: Field) -> bool {
        !self.columns[field.index()].is_empty()
    }

    /// Zip one record against the header. Short records resolve their missing
    /// trailing fields to absent.
    pub fn map_record<'a, I>(&self, values: I) -> MappedRow
    where
        I: IntoIterator<Item = &'a str>,
    {
        let values: Vec<&str> = values.into_iter().collect();
        let mut row = MappedRow::default();
        for field in Field::ALL {
            let first = self.columns[field.index()]
                .iter()
                .filter_map(|&i| values.get(i))
                .map(|v| v.trim())
                .find(|v| !v.is_empty());
            if let Some(v) = first {
                row.set(field, v);
            }
        }
        row
    }
}
