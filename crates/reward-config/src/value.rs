//! Loosely typed configuration values.
//!
//! Values keep the type of the layer they came from: YAML keeps booleans and
//! numbers, dotenv and environment variables are always strings. Consumers go
//! through [`is_enabled`] and [`as_string`] so both forms behave the same.

use serde_json::Value;

/// Returns true for boolean `true`, integer `1`, and the strings `"1"` and
/// `"true"` (any case). Everything else, including null, is false.
pub fn is_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Render a scalar as the string a template or a command line would see.
/// Null renders as the empty string; lists and maps render as JSON.
pub fn as_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Interpret a value as a list of strings. A comma-separated string is split.
pub fn as_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(as_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        Value::Null => Vec::new(),
        other => vec![as_string(other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enabled_accepts_truthy_forms() {
        assert!(is_enabled(&json!(true)));
        assert!(is_enabled(&json!(1)));
        assert!(is_enabled(&json!("1")));
        assert!(is_enabled(&json!("true")));
        assert!(is_enabled(&json!("TRUE")));
        assert!(is_enabled(&json!("True")));
    }

    #[test]
    fn enabled_rejects_everything_else() {
        assert!(!is_enabled(&json!(false)));
        assert!(!is_enabled(&json!(0)));
        assert!(!is_enabled(&json!(2)));
        assert!(!is_enabled(&json!("yes")));
        assert!(!is_enabled(&json!("0")));
        assert!(!is_enabled(&json!("")));
        assert!(!is_enabled(&Value::Null));
        assert!(!is_enabled(&json!(["true"])));
    }

    #[test]
    fn string_list_splits_csv() {
        assert_eq!(as_string_list(&json!("8080, 8081")), vec!["8080", "8081"]);
        assert_eq!(as_string_list(&json!([8080, "8443"])), vec!["8080", "8443"]);
        assert!(as_string_list(&json!("")).is_empty());
    }

    #[test]
    fn null_renders_empty() {
        assert_eq!(as_string(&Value::Null), "");
        assert_eq!(as_string(&json!(7.4)), "7.4");
    }
}
