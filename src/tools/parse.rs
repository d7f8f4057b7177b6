use geojson::JsonValue;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LEADING_FLOAT: Regex =
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap();
}

/// Parses the leading decimal number of `raw`, ignoring leading whitespace and
/// any trailing garbage, so `"4.70 E"` reads as `4.7`. Returns `None` when the
/// text does not start with a number.
pub fn leading_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    let matched = LEADING_FLOAT.find(trimmed)?;
    matched.as_str().parse::<f64>().ok()
}

/// Reads a coordinate component from a raw feed value, which may be either a
/// JSON number or a numeric string
pub fn coordinate_from_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => leading_f64(s),
        _ => None,
    }
}
