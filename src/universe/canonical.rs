//! Identifier normalization shared by every tool.

use serde_json::Value;

/// Canonical ids and tickers compare after trim + ASCII uppercase.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Normalize an optional id, mapping empty results to `None`.
pub fn normalize_opt(raw: Option<&str>) -> Option<String> {
    raw.map(normalize_id).filter(|s| !s.is_empty())
}

/// Normalize a JSON scalar into an id. Numbers are accepted because some
/// upstream lists carry numeric tickers.
pub fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_opt(Some(s)),
        Value::Number(n) => normalize_opt(Some(&n.to_string())),
        _ => None,
    }
}

/// Pull a ticker from either a bare string or an object exposing
/// `ticker`, `symbol` or `code` (first non-empty wins).
pub fn ticker_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["ticker", "symbol", "code"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(normalize_value),
        other => normalize_value(other),
    }
}

/// Collapse free-text reasons into `UPPER_SNAKE` codes.
pub fn reason_code(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Round to a fixed number of decimals for report ratios.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
