//! Text encoding of bind parameters.

use super::{DataType, Value};

/// Text form of a parameter for a Bind message, `None` for NULL.
///
/// Booleans bound to a `bool` parameter are sent as `1`/`0`; timestamps use
/// microsecond precision. Everything else, including values whose parameter
/// type is unknown, uses its plain text form.
pub fn encode_param(value: &Value, data_type: Option<&DataType>) -> Option<Vec<u8>> {
    let is_bool_param = data_type.is_some_and(|t| t.name() == "bool");
    let text = match value {
        Value::Null => return None,
        Value::Bool(v) if is_bool_param => String::from(if *v { "1" } else { "0" }),
        Value::Bool(v) => v.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Float(v) => float_text(*v),
        Value::Numeric(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Bytes(v) => return Some(v.clone()),
        Value::Date(v) => v.format("%Y-%m-%d").to_string(),
        Value::Time(v) => v.format("%H:%M:%S%.6f").to_string(),
        Value::Timestamp(v) => v.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        Value::TimestampTz(v) => v.format("%Y-%m-%d %H:%M:%S%.6f %z").to_string(),
    };
    Some(text.into_bytes())
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        String::from(if v.is_sign_positive() { "Infinity" } else { "-Infinity" })
    } else {
        v.to_string()
    }
}
