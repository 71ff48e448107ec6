//! Result cell decoding.
//!
//! # Responsibilities
//! - Hold one scanned column value as raw bytes or SQL NULL
//! - Convert a cell into a concrete scalar on demand
//! - Report NULL explicitly instead of folding it into the value
//!
//! # Design Decisions
//! - Cells are a closed sum type; drivers render every column as text
//!   bytes so one parser per target type covers all of them
//! - NULL yields the target's zero value with `is_null = true`
//! - No best-effort coercion: a value that does not fit the requested
//!   width is an error, never truncated

use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;

/// One column value of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Raw driver representation, usually the textual form of the value.
    Bytes(Vec<u8>),
}

/// Error returned when a non-null cell cannot be read as the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("can't convert to {target}")]
pub struct CellError {
    target: &'static str,
}

impl CellError {
    fn new(target: &'static str) -> Self {
        Self { target }
    }

    /// Name of the type the conversion was attempting.
    pub fn target(&self) -> &'static str {
        self.target
    }
}

/// A converted value together with its null flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decoded<T> {
    pub value: T,
    pub is_null: bool,
}

impl<T> Decoded<T> {
    fn value(value: T) -> Self {
        Self { value, is_null: false }
    }

    /// `None` for NULL, the value otherwise.
    pub fn into_option(self) -> Option<T> {
        if self.is_null {
            None
        } else {
            Some(self.value)
        }
    }
}

impl<T: Default> Decoded<T> {
    fn null() -> Self {
        Self {
            value: T::default(),
            is_null: true,
        }
    }
}

impl From<Option<Vec<u8>>> for Cell {
    fn from(value: Option<Vec<u8>>) -> Self {
        match value {
            Some(bytes) => Cell::Bytes(bytes),
            None => Cell::Null,
        }
    }
}

impl From<Option<&str>> for Cell {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(text) => Cell::Bytes(text.as_bytes().to_vec()),
            None => Cell::Null,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Bytes(value.as_bytes().to_vec())
    }
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Raw bytes of the cell, `None` for NULL.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Cell::Null => None,
            Cell::Bytes(bytes) => Some(bytes),
        }
    }

    pub fn to_bytes(&self) -> Result<Decoded<Vec<u8>>, CellError> {
        match self {
            Cell::Null => Ok(Decoded::null()),
            Cell::Bytes(bytes) => Ok(Decoded::value(bytes.clone())),
        }
    }

    pub fn to_text(&self) -> Result<Decoded<String>, CellError> {
        match self {
            Cell::Null => Ok(Decoded::null()),
            Cell::Bytes(bytes) => std::str::from_utf8(bytes)
                .map(|s| Decoded::value(s.to_string()))
                .map_err(|_| CellError::new("string")),
        }
    }

    /// Accepts `1`/`0`, `t`/`f`, `true`/`false` and the raw bit bytes `0x01`/`0x00`.
    pub fn to_bool(&self) -> Result<Decoded<bool>, CellError> {
        let bytes = match self {
            Cell::Null => return Ok(Decoded::null()),
            Cell::Bytes(bytes) => bytes.as_slice(),
        };
        let parsed = match bytes {
            [0x01] => Some(true),
            [0x00] => Some(false),
            _ => match std::str::from_utf8(bytes).map(str::to_ascii_lowercase) {
                Ok(text) => match text.as_str() {
                    "1" | "t" | "true" => Some(true),
                    "0" | "f" | "false" => Some(false),
                    _ => None,
                },
                Err(_) => None,
            },
        };
        parsed
            .map(Decoded::value)
            .ok_or_else(|| CellError::new("bool"))
    }

    pub fn to_i8(&self) -> Result<Decoded<i8>, CellError> {
        self.parse_number("int8")
    }

    pub fn to_i16(&self) -> Result<Decoded<i16>, CellError> {
        self.parse_number("int16")
    }

    pub fn to_i32(&self) -> Result<Decoded<i32>, CellError> {
        self.parse_number("int32")
    }

    pub fn to_i64(&self) -> Result<Decoded<i64>, CellError> {
        self.parse_number("int64")
    }

    pub fn to_isize(&self) -> Result<Decoded<isize>, CellError> {
        self.parse_number("int")
    }

    pub fn to_u8(&self) -> Result<Decoded<u8>, CellError> {
        self.parse_number("uint8")
    }

    pub fn to_u16(&self) -> Result<Decoded<u16>, CellError> {
        self.parse_number("uint16")
    }

    pub fn to_u32(&self) -> Result<Decoded<u32>, CellError> {
        self.parse_number("uint32")
    }

    pub fn to_u64(&self) -> Result<Decoded<u64>, CellError> {
        self.parse_number("uint64")
    }

    pub fn to_usize(&self) -> Result<Decoded<usize>, CellError> {
        self.parse_number("uint")
    }

    /// Finite text that only overflows at single precision is rejected.
    pub fn to_f32(&self) -> Result<Decoded<f32>, CellError> {
        let wide = match self.to_f64() {
            Ok(decoded) if decoded.is_null => return Ok(Decoded::null()),
            Ok(decoded) => decoded.value,
            Err(_) => return Err(CellError::new("float32")),
        };
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return Err(CellError::new("float32"));
        }
        Ok(Decoded::value(narrow))
    }

    pub fn to_f64(&self) -> Result<Decoded<f64>, CellError> {
        self.parse_number("float64")
    }

    /// Reads `YYYY-MM-DD HH:MM:SS[.fraction][offset]` as a UTC timestamp.
    ///
    /// Text without an offset is taken as UTC. A numeric offset in the
    /// forms `+HH`, `+HHMM` or `+HH:MM` (as Postgres prints `timestamptz`)
    /// is applied and the result converted to UTC.
    pub fn to_time(&self) -> Result<Decoded<DateTime<Utc>>, CellError> {
        let bytes = match self {
            Cell::Null => return Ok(Decoded::null()),
            Cell::Bytes(bytes) => bytes.as_slice(),
        };
        let err = || CellError::new("time");
        let text = std::str::from_utf8(bytes).map_err(|_| err())?;
        if text.len() < 19 {
            return Err(err());
        }
        let date = text.get(..10).ok_or_else(err)?;
        let time = text.get(11..).ok_or_else(err)?;
        let (clock, offset) = match time.find(['+', '-']) {
            Some(at) => (&time[..at], normalize_offset(&time[at..]).ok_or_else(err)?),
            None => (time, "Z".to_string()),
        };
        DateTime::parse_from_rfc3339(&format!("{date}T{clock}{offset}"))
            .map(|t| Decoded::value(t.with_timezone(&Utc)))
            .map_err(|_| err())
    }

    fn parse_number<T>(&self, target: &'static str) -> Result<Decoded<T>, CellError>
    where
        T: FromStr + Default,
    {
        let bytes = match self {
            Cell::Null => return Ok(Decoded::null()),
            Cell::Bytes(bytes) => bytes.as_slice(),
        };
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| text.parse::<T>().ok())
            .map(Decoded::value)
            .ok_or_else(|| CellError::new(target))
    }
}

/// Rewrites `+HH`, `+HHMM` and `+HH:MM` into the RFC 3339 `+HH:MM` form.
fn normalize_offset(offset: &str) -> Option<String> {
    let (sign, rest) = offset.split_at(1);
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.len() {
        2 => Some(format!("{sign}{digits}:00")),
        4 => Some(format!("{sign}{}:{}", &digits[..2], &digits[2..])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_null_yields_zero_values() {
        let cell = Cell::Null;

        assert_eq!(cell.to_i64().unwrap(), Decoded { value: 0, is_null: true });
        assert_eq!(cell.to_u8().unwrap(), Decoded { value: 0, is_null: true });
        assert_eq!(cell.to_text().unwrap(), Decoded { value: String::new(), is_null: true });
        assert_eq!(cell.to_bool().unwrap(), Decoded { value: false, is_null: true });
        assert!(cell.to_bytes().unwrap().value.is_empty());
        assert!(cell.to_f32().unwrap().is_null);

        let time = cell.to_time().unwrap();
        assert!(time.is_null);
        assert_eq!(time.value.timestamp(), 0);
    }

    #[test]
    fn test_integer_width_is_enforced() {
        assert_eq!(Cell::from("127").to_i8().unwrap().value, 127);
        assert_eq!(Cell::from("128").to_i8().unwrap_err().to_string(), "can't convert to int8");
        assert!(Cell::from("-1").to_u32().is_err());
        assert!(Cell::from("65536").to_u16().is_err());
        assert_eq!(Cell::from("4294967295").to_u32().unwrap().value, u32::MAX);
        assert_eq!(Cell::from("-9223372036854775808").to_i64().unwrap().value, i64::MIN);
        assert!(Cell::from("9223372036854775808").to_i64().is_err());
    }

    #[test]
    fn test_non_numeric_text_is_error() {
        assert!(Cell::from("12abc").to_i32().is_err());
        assert!(Cell::from("").to_i32().is_err());
        assert!(Cell::from(" 1").to_i32().is_err());
        assert!(Cell::from("1.5").to_i64().is_err());
    }

    #[test]
    fn test_floats() {
        assert_eq!(Cell::from("1.5").to_f64().unwrap().value, 1.5);
        assert_eq!(Cell::from("-0.25").to_f32().unwrap().value, -0.25);
        assert!(Cell::from("1e39").to_f32().is_err());
        assert!(Cell::from("1e39").to_f64().is_ok());
        assert!(Cell::from("one").to_f64().is_err());
    }

    #[test]
    fn test_bool_forms() {
        for truthy in ["1", "t", "TRUE", "true"] {
            assert!(Cell::from(truthy).to_bool().unwrap().value, "{truthy}");
        }
        for falsy in ["0", "f", "False"] {
            assert!(!Cell::from(falsy).to_bool().unwrap().value, "{falsy}");
        }
        assert!(Cell::Bytes(vec![1]).to_bool().unwrap().value);
        assert!(!Cell::Bytes(vec![0]).to_bool().unwrap().value);
        assert!(Cell::from("yes").to_bool().is_err());
        assert!(Cell::Bytes(Vec::new()).to_bool().is_err());
    }

    #[test]
    fn test_text_requires_utf8() {
        assert_eq!(Cell::from("héllo").to_text().unwrap().value, "héllo");
        assert!(Cell::Bytes(vec![0xff, 0xfe]).to_text().is_err());
    }

    #[test]
    fn test_time_is_read_as_utc() {
        let decoded = Cell::from("2021-03-04 05:06:07").to_time().unwrap();
        assert!(!decoded.is_null);
        assert_eq!(decoded.value, Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap());

        let fractional = Cell::from("2021-03-04 05:06:07.250").to_time().unwrap();
        assert_eq!(fractional.value.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_time_applies_numeric_offset() {
        let utc = Cell::from("2024-03-01 10:15:00+00").to_time().unwrap();
        assert_eq!(utc.value, Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap());

        let east = Cell::from("2024-03-01 10:15:00.5+02").to_time().unwrap();
        assert_eq!(east.value.timestamp(), Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap().timestamp());
        assert_eq!(east.value.timestamp_subsec_millis(), 500);

        let india = Cell::from("2024-03-01 10:15:00+05:30").to_time().unwrap();
        assert_eq!(india.value, Utc.with_ymd_and_hms(2024, 3, 1, 4, 45, 0).unwrap());

        let west = Cell::from("2024-03-01 23:00:00-0800").to_time().unwrap();
        assert_eq!(west.value, Utc.with_ymd_and_hms(2024, 3, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_time_rejects_malformed_offset() {
        assert!(Cell::from("2024-03-01 10:15:00+0").to_time().is_err());
        assert!(Cell::from("2024-03-01 10:15:00+ab").to_time().is_err());
        assert!(Cell::from("2024-03-01 10:15:00+05:30:15").to_time().is_err());
    }

    #[test]
    fn test_time_rejects_short_or_malformed_text() {
        assert!(Cell::from("2021-03-04").to_time().is_err());
        assert!(Cell::from("2021-03-04 05:06").to_time().is_err());
        assert!(Cell::from("2021-13-04 05:06:07").to_time().is_err());
        assert!(Cell::from("not a timestamp at all").to_time().is_err());
    }

    #[test]
    fn test_into_option() {
        assert_eq!(Cell::Null.to_i32().unwrap().into_option(), None);
        assert_eq!(Cell::from("7").to_i32().unwrap().into_option(), Some(7));
    }
}
