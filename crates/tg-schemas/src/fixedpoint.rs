//! Fixed-point decimal type for quantities and money.
//!
//! # Motivation
//!
//! Trade quantities, prices, fees and PnL arrive as decimal strings (CSV
//! cells, JSON numbers). They feed the trade fingerprint, so two renderings
//! of the same value must never produce different hashes. Floats cannot give
//! that guarantee; `Micros` can.
//!
//! # Scale
//!
//! 1 unit = 1_000_000 Micros. At most six fractional digits are accepted;
//! anything finer is rejected instead of rounded.
//!
//! # Canonical form
//!
//! [`Micros`]'s `Display` renders the shortest exact decimal: `150.25`, `100`,
//! `-0.5`. This is the representation used for hashing and for the JSON API.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SCALE: i64 = 1_000_000;
const MAX_FRAC_DIGITS: usize = 6;

// ---------------------------------------------------------------------------
// Micros newtype
// ---------------------------------------------------------------------------

/// A fixed-point decimal at 1e-6 scale.
///
/// There is intentionally no `From<i64>`; use [`Micros::new`] when a raw
/// integer is known to be at micros scale, or [`Micros::parse`] for text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Whole units, e.g. `Micros::from_units(3)` is `3`.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Micros(units * SCALE)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Parse a decimal string such as `"150.25"`, `"+5"`, `"-0.000001"`.
    ///
    /// Surrounding whitespace is ignored. Rejects empty input, exponents,
    /// thousands separators, more than six fractional digits and overflow.
    pub fn parse(s: &str) -> Result<Self, DecimalError> {
        let t = s.trim();
        if t.is_empty() {
            return Err(DecimalError::Empty);
        }

        let (negative, body) = match t.as_bytes()[0] {
            b'-' => (true, &t[1..]),
            b'+' => (false, &t[1..]),
            _ => (false, t),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalError::Invalid(t.to_string()));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DecimalError::Invalid(t.to_string()));
        }
        if frac_part.len() > MAX_FRAC_DIGITS {
            return Err(DecimalError::TooPrecise(t.to_string()));
        }

        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DecimalError::Overflow(t.to_string()))?
        };

        let mut frac_val: i64 = 0;
        for (i, b) in frac_part.bytes().enumerate() {
            frac_val += i64::from(b - b'0') * 10_i64.pow((MAX_FRAC_DIGITS - 1 - i) as u32);
        }

        let magnitude = int_val
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(|| DecimalError::Overflow(t.to_string()))?;

        Ok(Micros(if negative { -magnitude } else { magnitude }))
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn checked_add(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_add(rhs.0).map(Micros)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_sub(rhs.0).map(Micros)
    }

    /// Fixed-point product (e.g. price x quantity), truncated toward zero at
    /// micros scale. `None` when the result does not fit.
    pub fn checked_mul(self, rhs: Micros) -> Option<Micros> {
        let product = (self.0 as i128 * rhs.0 as i128) / SCALE as i128;
        i64::try_from(product).ok().map(Micros)
    }

    /// Lossy conversion for statistics (z-scores, quantiles, averages).
    /// Never feed the result back into hashing or storage.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    Empty,
    Invalid(String),
    TooPrecise(String),
    Overflow(String),
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalError::Empty => write!(f, "empty decimal"),
            DecimalError::Invalid(s) => write!(f, "invalid decimal '{s}'"),
            DecimalError::TooPrecise(s) => {
                write!(f, "decimal '{s}' has more than {MAX_FRAC_DIGITS} fractional digits")
            }
            DecimalError::Overflow(s) => write!(f, "decimal '{s}' out of range"),
        }
    }
}

impl std::error::Error for DecimalError {}

impl FromStr for Micros {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Micros::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Display (canonical form)
// ---------------------------------------------------------------------------

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / SCALE as u64;
        let frac = abs % SCALE as u64;
        if frac == 0 {
            return write!(f, "{sign}{units}");
        }
        let digits = format!("{frac:06}");
        write!(f, "{sign}{units}.{}", digits.trim_end_matches('0'))
    }
}

// ---------------------------------------------------------------------------
// Serde: canonical string out, string or JSON number in
// ---------------------------------------------------------------------------

impl Serialize for Micros {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct MicrosVisitor;

impl<'de> Visitor<'de> for MicrosVisitor {
    type Value = Micros;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Micros, E> {
        Micros::parse(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Micros, E> {
        v.checked_mul(SCALE)
            .map(Micros)
            .ok_or_else(|| E::custom(DecimalError::Overflow(v.to_string())))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Micros, E> {
        i64::try_from(v)
            .map_err(|_| E::custom(DecimalError::Overflow(v.to_string())))
            .and_then(|v| self.visit_i64(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Micros, E> {
        // f64 Display is the shortest round-trip form, so 150.25 stays "150.25".
        Micros::parse(&v.to_string()).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Micros {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MicrosVisitor)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_values() {
        assert_eq!(Micros::parse("0").unwrap(), Micros::ZERO);
        assert_eq!(Micros::parse("1").unwrap(), Micros::new(1_000_000));
        assert_eq!(Micros::parse("1.23").unwrap(), Micros::new(1_230_000));
        assert_eq!(Micros::parse("001.2300").unwrap(), Micros::new(1_230_000));
        assert_eq!(Micros::parse("+5.000001").unwrap(), Micros::new(5_000_001));
        assert_eq!(Micros::parse(".5").unwrap(), Micros::new(500_000));
        assert_eq!(Micros::parse("7.").unwrap(), Micros::new(7_000_000));
        assert_eq!(Micros::parse("  42.5 ").unwrap(), Micros::new(42_500_000));
    }

    #[test]
    fn parse_negative_values() {
        assert_eq!(Micros::parse("-2.75").unwrap(), Micros::new(-2_750_000));
        assert_eq!(Micros::parse("-0.5").unwrap(), Micros::new(-500_000));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Micros::parse(""), Err(DecimalError::Empty));
        assert!(matches!(Micros::parse("abc"), Err(DecimalError::Invalid(_))));
        assert!(matches!(Micros::parse("1e5"), Err(DecimalError::Invalid(_))));
        assert!(matches!(Micros::parse("1,000"), Err(DecimalError::Invalid(_))));
        assert!(matches!(Micros::parse("."), Err(DecimalError::Invalid(_))));
        assert!(matches!(Micros::parse("-"), Err(DecimalError::Invalid(_))));
        assert!(matches!(Micros::parse("1.2.3"), Err(DecimalError::Invalid(_))));
        assert!(matches!(Micros::parse("NaN"), Err(DecimalError::Invalid(_))));
    }

    #[test]
    fn parse_rejects_rounding_ambiguity() {
        assert!(matches!(
            Micros::parse("1.0000001"),
            Err(DecimalError::TooPrecise(_))
        ));
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!(matches!(
            Micros::parse("99999999999999999999"),
            Err(DecimalError::Overflow(_))
        ));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Micros::parse("150.250").unwrap().to_string(), "150.25");
        assert_eq!(Micros::parse("100.000000").unwrap().to_string(), "100");
        assert_eq!(Micros::parse("-0.5").unwrap().to_string(), "-0.5");
        assert_eq!(Micros::new(1).to_string(), "0.000001");
        assert_eq!(Micros::ZERO.to_string(), "0");
    }

    #[test]
    fn equal_values_render_identically() {
        let a = Micros::parse("100").unwrap();
        let b = Micros::parse("100.00").unwrap();
        let c = Micros::parse("+0100.0").unwrap();
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(b.to_string(), c.to_string());
    }

    #[test]
    fn serde_accepts_numbers_and_strings() {
        let from_num: Micros = serde_json::from_str("150.25").unwrap();
        let from_int: Micros = serde_json::from_str("100").unwrap();
        let from_str: Micros = serde_json::from_str("\"150.25\"").unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(from_int, Micros::from_units(100));
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"150.25\"");
    }

    #[test]
    fn checked_arithmetic() {
        let a = Micros::from_units(10);
        let b = Micros::parse("2.5").unwrap();
        assert_eq!(a.checked_sub(b), Some(Micros::parse("7.5").unwrap()));
        assert_eq!(a.checked_add(b).map(Micros::to_f64), Some(12.5));
        assert!(b.checked_sub(a).unwrap().is_negative());
        assert!(!Micros::ZERO.is_positive());
        assert_eq!(Micros::new(i64::MAX).checked_add(Micros::new(1)), None);
        assert_eq!(
            Micros::new(i64::MAX).saturating_add(Micros::new(1)),
            Micros::new(i64::MAX)
        );
    }

    #[test]
    fn multiplication_keeps_scale() {
        let price = Micros::parse("150.25").unwrap();
        let qty = Micros::parse("2.5").unwrap();
        assert_eq!(price.checked_mul(qty), Some(Micros::parse("375.625").unwrap()));
        assert_eq!(
            Micros::parse("-0.5").unwrap().checked_mul(Micros::from_units(3)),
            Some(Micros::parse("-1.5").unwrap())
        );
        // 0.000001 * 0.5 truncates toward zero
        assert_eq!(
            Micros::new(1).checked_mul(Micros::parse("0.5").unwrap()),
            Some(Micros::ZERO)
        );
        let big = Micros::from_units(1_000_000_000);
        assert_eq!(big.checked_mul(big), None);
    }
}
