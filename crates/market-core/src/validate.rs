//! Per-record coercions shared by the ingestion managers. Policy per the
//! error table: a bad field is coerced or the row dropped with a warning,
//! never aborting the batch.

use serde_json::Value;

/// Closes above this magnitude are treated as provider garbage.
pub const MAX_CLOSE: f64 = 1e16;
/// Volumes and market caps above this magnitude are treated as garbage.
pub const MAX_LARGE: f64 = 1e24;
/// Ratios at or above this magnitude become null.
pub const MAX_RATIO: f64 = 1e20;
/// Non-zero ratios below this magnitude become null.
pub const MIN_RATIO: f64 = 1e-10;

/// Clamp a close price: negative or overflowing values become 0.
pub fn coerce_close(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 || value.abs() >= MAX_CLOSE {
        0.0
    } else {
        value
    }
}

/// Clamp a volume or market cap: negative or overflowing values become 0.
pub fn coerce_large(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 || value.abs() >= MAX_LARGE {
        0.0
    } else {
        value
    }
}

/// Range-check a ratio; out-of-range magnitudes and non-finite values are
/// nulled rather than clamped.
pub fn coerce_ratio(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let mag = value.abs();
    if mag >= MAX_RATIO {
        return None;
    }
    if mag > 0.0 && mag < MIN_RATIO {
        return None;
    }
    Some(value)
}

/// Upper-case a currency code and apply the provider's known misspellings.
pub fn normalize_currency(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let upper = code.to_uppercase();
    let mapped = match upper.as_str() {
        "ILA" => "ILS",
        "KWF" => "KWD",
        "ZAC" => "ZAR",
        other => other,
    };
    Some(mapped.to_string())
}

/// Parse a boolean that may arrive as a native bool or a string.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Empty or whitespace-only strings become None; others are length-capped.
pub fn clean_string(value: Option<&str>, max_len: usize) -> Option<String> {
    let s = value?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().count() > max_len {
        return None;
    }
    Some(s.to_string())
}

/// Pull an optional f64 out of a JSON field that may be a number or a
/// numeric string.
pub fn json_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Pull an optional non-empty string out of a JSON field.
pub fn json_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn close_coercion() {
        assert_eq!(coerce_close(101.5), 101.5);
        assert_eq!(coerce_close(-3.0), 0.0);
        assert_eq!(coerce_close(1e17), 0.0);
        assert_eq!(coerce_close(f64::INFINITY), 0.0);
    }

    #[test]
    fn large_coercion() {
        assert_eq!(coerce_large(5e23), 5e23);
        assert_eq!(coerce_large(1e24), 0.0);
        assert_eq!(coerce_large(-1.0), 0.0);
    }

    #[test]
    fn ratio_coercion_nulls_out_of_range() {
        assert_eq!(coerce_ratio(0.35), Some(0.35));
        assert_eq!(coerce_ratio(0.0), Some(0.0));
        assert_eq!(coerce_ratio(1e20), None);
        assert_eq!(coerce_ratio(1e-11), None);
        assert_eq!(coerce_ratio(-1e-11), None);
        assert_eq!(coerce_ratio(f64::NEG_INFINITY), None);
        assert_eq!(coerce_ratio(f64::NAN), None);
    }

    #[test]
    fn currency_remap() {
        assert_eq!(normalize_currency("ila"), Some("ILS".to_string()));
        assert_eq!(normalize_currency("KWF"), Some("KWD".to_string()));
        assert_eq!(normalize_currency("ZAC"), Some("ZAR".to_string()));
        assert_eq!(normalize_currency("usd"), Some("USD".to_string()));
        assert_eq!(normalize_currency("  "), None);
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool(&json!(true)), Some(true));
        assert_eq!(parse_bool(&json!("TRUE")), Some(true));
        assert_eq!(parse_bool(&json!("False")), Some(false));
        assert_eq!(parse_bool(&json!("yes")), None);
        assert_eq!(parse_bool(&json!(1)), None);
    }

    #[test]
    fn string_cleaning() {
        assert_eq!(clean_string(Some("  "), 10), None);
        assert_eq!(clean_string(Some("abc"), 10), Some("abc".to_string()));
        assert_eq!(clean_string(Some("toolongvalue"), 5), None);
        assert_eq!(clean_string(None, 5), None);
    }

    #[test]
    fn json_extraction() {
        assert_eq!(json_f64(Some(&json!(1.5))), Some(1.5));
        assert_eq!(json_f64(Some(&json!("2.25"))), Some(2.25));
        assert_eq!(json_f64(Some(&json!(null))), None);
        assert_eq!(json_string(Some(&json!("x"))), Some("x".to_string()));
        assert_eq!(json_string(Some(&json!(""))), None);
    }
}
