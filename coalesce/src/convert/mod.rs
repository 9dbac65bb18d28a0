//! Value conversion between field types.
//!
//! The coalesce algorithm only decides *which* value ends up in an output
//! field. *How* that value is turned into the output type is delegated to a
//! [`ValueConverter`]. [`HostConverter`] implements the general conversion
//! rules of the host value model.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;

use crate::models::{Value, ValueType};

/// Default textual date format (`yyyy/MM/dd HH:mm:ss.SSS`).
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Date-time formats accepted when parsing strings, tried in order.
const DATE_TIME_PARSE_FORMATS: [&str; 4] = [
    DATE_FORMAT,
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Date-only formats accepted when parsing strings, tried in order.
const DATE_PARSE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];

/// Values accepted as `true` when converting strings to booleans.
const TRUE_VALUES: [&str; 4] = ["y", "yes", "true", "1"];

/// A failed conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    pub message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn unsupported(source: ValueType, target: ValueType) -> Self {
        Self::new(format!("no conversion from {} to {}", source, target))
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConversionError {}

/// Converts a value from its declared field type to another field type.
///
/// `Ok(None)` means the value converts to null.
pub trait ValueConverter {
    fn convert(
        &self,
        value: &Value,
        source: ValueType,
        target: ValueType,
    ) -> Result<Option<Value>, ConversionError>;
}

/// The host's general conversion rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostConverter;

impl ValueConverter for HostConverter {
    fn convert(
        &self,
        value: &Value,
        source: ValueType,
        target: ValueType,
    ) -> Result<Option<Value>, ConversionError> {
        if source == target || target.is_none() {
            return Ok(Some(value.clone()));
        }

        match target {
            ValueType::String => to_string(value).map(|s| Some(Value::String(s))),
            ValueType::Number => to_number(value, source),
            ValueType::Integer => to_integer(value, source),
            ValueType::Boolean => to_boolean(value, source).map(|b| Some(Value::Boolean(b))),
            ValueType::Date => to_date(value, source),
            ValueType::Binary => to_binary(value, source).map(|b| Some(Value::Binary(b))),
            ValueType::None => unreachable!("handled above"),
        }
    }
}

fn to_string(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::Binary(bytes) => String::from_utf8(bytes.clone())
            .map_err(|e| ConversionError::new(format!("binary is not valid UTF-8: {}", e))),
        other => Ok(other.to_string()),
    }
}

fn to_number(value: &Value, source: ValueType) -> Result<Option<Value>, ConversionError> {
    let number = match value {
        Value::Number(n) => *n,
        Value::Integer(i) => *i as f64,
        Value::Boolean(b) => bool_to_i64(*b) as f64,
        Value::Date(d) => d.and_utc().timestamp_millis() as f64,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .map_err(|e| ConversionError::new(format!("unparseable number '{}': {}", s, e)))?
        }
        Value::Binary(_) => return Err(ConversionError::unsupported(source, ValueType::Number)),
    };
    Ok(Some(Value::Number(number)))
}

fn to_integer(value: &Value, source: ValueType) -> Result<Option<Value>, ConversionError> {
    let integer = match value {
        Value::Integer(i) => *i,
        Value::Number(n) => {
            if !n.is_finite() {
                return Err(ConversionError::new(format!("{} is not a finite number", n)));
            }
            n.round() as i64
        }
        Value::Boolean(b) => bool_to_i64(*b),
        Value::Date(d) => d.and_utc().timestamp_millis(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<i64>()
                .map_err(|e| ConversionError::new(format!("unparseable integer '{}': {}", s, e)))?
        }
        Value::Binary(_) => return Err(ConversionError::unsupported(source, ValueType::Integer)),
    };
    Ok(Some(Value::Integer(integer)))
}

fn to_boolean(value: &Value, source: ValueType) -> Result<bool, ConversionError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Integer(i) => Ok(*i != 0),
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            Ok(TRUE_VALUES.contains(&s.as_str()))
        }
        Value::Date(_) | Value::Binary(_) => {
            Err(ConversionError::unsupported(source, ValueType::Boolean))
        }
    }
}

fn to_date(value: &Value, source: ValueType) -> Result<Option<Value>, ConversionError> {
    let date = match value {
        Value::Date(d) => *d,
        Value::Integer(ms) => from_millis(*ms)?,
        Value::Number(ms) => from_millis(ms.round() as i64)?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            parse_date(s)?
        }
        Value::Boolean(_) | Value::Binary(_) => {
            return Err(ConversionError::unsupported(source, ValueType::Date))
        }
    };
    Ok(Some(Value::Date(date)))
}

fn to_binary(value: &Value, source: ValueType) -> Result<Vec<u8>, ConversionError> {
    match value {
        Value::Binary(b) => Ok(b.clone()),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        _ => Err(ConversionError::unsupported(source, ValueType::Binary)),
    }
}

fn bool_to_i64(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

fn from_millis(ms: i64) -> Result<NaiveDateTime, ConversionError> {
    DateTime::from_timestamp_millis(ms)
        .map(|d| d.naive_utc())
        .ok_or_else(|| ConversionError::new(format!("{} ms is out of the date range", ms)))
}

/// Parse a date using the accepted date and date-time formats.
pub fn parse_date(s: &str) -> Result<NaiveDateTime, ConversionError> {
    for format in DATE_TIME_PARSE_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(d);
        }
    }
    for format in DATE_PARSE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }
    Err(ConversionError::new(format!("unparseable date '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(value: Value, target: ValueType) -> Result<Option<Value>, ConversionError> {
        let source = value.value_type();
        HostConverter.convert(&value, source, target)
    }

    #[test]
    fn test_identity() {
        let v = Value::from("248-0532");
        assert_eq!(convert(v.clone(), ValueType::String).unwrap(), Some(v));
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(
            convert(Value::from(" 7.5 "), ValueType::Number).unwrap(),
            Some(Value::Number(7.5))
        );
        assert_eq!(convert(Value::from(""), ValueType::Number).unwrap(), None);
        let err = convert(Value::from("warm"), ValueType::Number).unwrap_err();
        assert!(err.message.contains("warm"));
    }

    #[test]
    fn test_string_to_integer() {
        assert_eq!(
            convert(Value::from("42"), ValueType::Integer).unwrap(),
            Some(Value::Integer(42))
        );
        assert!(convert(Value::from("4.2"), ValueType::Integer).is_err());
    }

    #[test]
    fn test_number_integer_rounding() {
        assert_eq!(
            convert(Value::Number(2.5), ValueType::Integer).unwrap(),
            Some(Value::Integer(3))
        );
        assert_eq!(
            convert(Value::Number(-2.5), ValueType::Integer).unwrap(),
            Some(Value::Integer(-3))
        );
        assert_eq!(
            convert(Value::Integer(8), ValueType::Number).unwrap(),
            Some(Value::Number(8.0))
        );
        assert!(convert(Value::Number(f64::NAN), ValueType::Integer).is_err());
    }

    #[test]
    fn test_to_string() {
        assert_eq!(
            convert(Value::Number(10.5), ValueType::String).unwrap(),
            Some(Value::from("10.5"))
        );
        assert_eq!(
            convert(Value::Boolean(true), ValueType::String).unwrap(),
            Some(Value::from("Y"))
        );
        assert!(convert(Value::Binary(vec![0xff, 0xfe]), ValueType::String).is_err());
    }

    #[test]
    fn test_string_to_boolean() {
        for s in ["Y", "yes", "TRUE", "1"] {
            assert_eq!(
                convert(Value::from(s), ValueType::Boolean).unwrap(),
                Some(Value::Boolean(true))
            );
        }
        assert_eq!(
            convert(Value::from("nope"), ValueType::Boolean).unwrap(),
            Some(Value::Boolean(false))
        );
    }

    #[test]
    fn test_dates() {
        let parsed = convert(Value::from("2013/05/01 10:20:30.000"), ValueType::Date)
            .unwrap()
            .unwrap();
        assert_eq!(
            parsed.to_string(),
            "2013/05/01 10:20:30.000"
        );

        let day = convert(Value::from("2013-05-01"), ValueType::Date).unwrap().unwrap();
        assert_eq!(
            convert(day, ValueType::Integer).unwrap(),
            Some(Value::Integer(1_367_366_400_000))
        );

        assert!(convert(Value::from("yesterday"), ValueType::Date).is_err());
    }

    #[test]
    fn test_unsupported() {
        assert!(convert(Value::Boolean(true), ValueType::Date).is_err());
        assert!(convert(Value::Integer(1), ValueType::Binary).is_err());
    }
}
