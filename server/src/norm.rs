//! Normalization for loosely-typed JSON columns.
//!
//! The store keeps `assigned_to`, `attachments`, and `tags` as JSON arrays.
//! Rows written by older clients mix numbers with numeric strings, so every
//! read goes through this module and consumers only ever see concrete typed
//! lists.

use serde_json::Value;

/// Coerces a JSON value into a list of user ids.
///
/// Accepts numbers and numeric strings; anything else in the array is
/// dropped. Non-array values yield an empty list.
pub fn id_list(value: &Value) -> Vec<i32> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
                Value::String(s) => s.trim().parse::<i32>().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Coerces a JSON value into a list of strings, dropping non-string entries.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_list_accepts_numbers_and_numeric_strings() {
        let value = json!([1, "2", 3, " 4 "]);
        assert_eq!(id_list(&value), vec![1, 2, 3, 4]);
    }

    #[test]
    fn id_list_drops_junk_entries() {
        let value = json!([1, "abc", null, {"id": 2}, true]);
        assert_eq!(id_list(&value), vec![1]);
    }

    #[test]
    fn id_list_of_non_array_is_empty() {
        assert_eq!(id_list(&json!(null)), Vec::<i32>::new());
        assert_eq!(id_list(&json!("[1,2]")), Vec::<i32>::new());
    }

    #[test]
    fn string_list_keeps_only_strings() {
        let value = json!(["a.png", 7, "b.pdf"]);
        assert_eq!(string_list(&value), vec!["a.png", "b.pdf"]);
    }
}
