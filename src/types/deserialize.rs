//! Text-format deserializers for the standard types.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::error::{Error, Result};

use super::Value;

/// Converts the raw text-format bytes of a non-NULL field.
pub type Deserializer = fn(&[u8]) -> Result<Value>;

fn text(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {e}")))
}

fn cannot_convert(bytes: &[u8], target: &str) -> Error {
    Error::Decode(format!(
        "cannot convert {:?} to {target}",
        String::from_utf8_lossy(bytes)
    ))
}

/// Text passthrough, falling back to bytes when not UTF-8.
pub fn generic(bytes: &[u8]) -> Result<Value> {
    Ok(match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    })
}

pub fn boolean(bytes: &[u8]) -> Result<Value> {
    match bytes {
        b"t" => Ok(Value::Bool(true)),
        b"f" => Ok(Value::Bool(false)),
        _ => Err(cannot_convert(bytes, "a boolean value")),
    }
}

pub fn integer(bytes: &[u8]) -> Result<Value> {
    text(bytes)?
        .parse()
        .map(Value::Integer)
        .map_err(|_e| cannot_convert(bytes, "an integer"))
}

pub fn float(bytes: &[u8]) -> Result<Value> {
    let value = match bytes {
        b"Infinity" => f64::INFINITY,
        b"-Infinity" => f64::NEG_INFINITY,
        b"NaN" => f64::NAN,
        _ => text(bytes)?
            .parse()
            .map_err(|_e| cannot_convert(bytes, "a float"))?,
    };
    Ok(Value::Float(value))
}

pub fn numeric(bytes: &[u8]) -> Result<Value> {
    let s = text(bytes)?;
    Decimal::from_str(s)
        .or_else(|_e| Decimal::from_scientific(s))
        .map(Value::Numeric)
        .map_err(|_e| cannot_convert(bytes, "a numeric"))
}

pub fn unicode_string(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Text(text(bytes)?.to_string()))
}

/// Unescape `\ooo` octal sequences (first digit 0-3); everything else is literal.
pub fn binary_string(bytes: &[u8]) -> Result<Value> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if let [b'\\', a @ b'0'..=b'3', b @ b'0'..=b'7', c @ b'0'..=b'7', ..] = bytes[i..] {
            out.push(((a - b'0') << 6) | ((b - b'0') << 3) | (c - b'0'));
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(Value::Bytes(out))
}

pub fn date(bytes: &[u8]) -> Result<Value> {
    NaiveDate::parse_from_str(text(bytes)?, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|_e| cannot_convert(bytes, "a date"))
}

pub fn timestamp(bytes: &[u8]) -> Result<Value> {
    NaiveDateTime::parse_from_str(text(bytes)?, "%Y-%m-%d %H:%M:%S%.f")
        .map(Value::Timestamp)
        .map_err(|_e| cannot_convert(bytes, "a timestamp"))
}

pub fn timestamp_tz(bytes: &[u8]) -> Result<Value> {
    DateTime::parse_from_str(text(bytes)?, "%Y-%m-%d %H:%M:%S%.f%#z")
        .map(Value::TimestampTz)
        .map_err(|_e| cannot_convert(bytes, "a timestamp with time zone"))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_boolean() {
        assert_eq!(boolean(b"t").unwrap(), Value::Bool(true));
        assert_eq!(boolean(b"f").unwrap(), Value::Bool(false));
        assert!(boolean(b"yes").is_err());
    }

    #[test]
    fn test_integer() {
        assert_eq!(integer(b"42").unwrap(), Value::Integer(42));
        assert_eq!(integer(b"-9").unwrap(), Value::Integer(-9));
        assert!(matches!(integer(b"4x"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_float_specials() {
        assert_eq!(float(b"1.5").unwrap(), Value::Float(1.5));
        assert_eq!(float(b"Infinity").unwrap(), Value::Float(f64::INFINITY));
        assert_eq!(float(b"-Infinity").unwrap(), Value::Float(f64::NEG_INFINITY));
        assert!(float(b"NaN").unwrap().as_f64().unwrap().is_nan());
    }

    #[test]
    fn test_numeric() {
        assert_eq!(
            numeric(b"1.2300").unwrap(),
            Value::Numeric(Decimal::new(12300, 4))
        );
    }

    #[test]
    fn test_binary_string() {
        assert_eq!(
            binary_string(b"\\000\\377a\\b").unwrap(),
            Value::Bytes(vec![0, 255, b'a', b'\\', b'b'])
        );
        assert_eq!(binary_string(b"\\4").unwrap(), Value::Bytes(b"\\4".to_vec()));
    }

    #[test]
    fn test_dates() {
        let d = date(b"2013-12-31").unwrap().as_date().unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2013, 12, 31));

        let ts = timestamp(b"2013-12-31 19:20:21.123456")
            .unwrap()
            .as_timestamp()
            .unwrap();
        assert_eq!(ts.nanosecond(), 123_456_000);
        assert!(timestamp(b"2013-12-31 19:20:21").is_ok());

        let tz = timestamp_tz(b"2013-12-31 19:20:21+05:30")
            .unwrap()
            .as_timestamp_tz()
            .unwrap();
        assert_eq!(tz.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
        let tz = timestamp_tz(b"2013-12-31 19:20:21.5-08")
            .unwrap()
            .as_timestamp_tz()
            .unwrap();
        assert_eq!(tz.offset().local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn test_generic_passthrough() {
        assert_eq!(generic(b"04:05:06").unwrap(), Value::Text("04:05:06".into()));
        assert_eq!(generic(&[0xFF]).unwrap(), Value::Bytes(vec![0xFF]));
    }
}
