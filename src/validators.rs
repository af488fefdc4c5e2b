//! Ready-made validators for common stored shapes.
//!
//! Each function is a `fn(&Value) -> bool` predicate suitable for
//! [`KeyedStore::load_validated`](crate::KeyedStore::load_validated). A
//! validator looks at the payload *after* migration; rejection makes the
//! load return the caller's default while leaving the stored value intact.

use serde_json::Value;

/// The payload is a JSON boolean.
pub fn boolean(value: &Value) -> bool {
    value.is_boolean()
}

/// The payload is a JSON string.
pub fn string(value: &Value) -> bool {
    value.is_string()
}

/// The payload is a finite JSON number.
pub fn finite_number(value: &Value) -> bool {
    value.as_f64().is_some_and(f64::is_finite)
}

/// The payload is a list of email records, each an object with a non-empty
/// string `address` field.
pub fn email_list(value: &Value) -> bool {
    value.as_array().is_some_and(|items| {
        items.iter().all(|item| {
            item.get("address")
                .and_then(Value::as_str)
                .is_some_and(|address| !address.is_empty())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean() {
        assert!(boolean(&json!(true)));
        assert!(!boolean(&json!("true")));
        assert!(!boolean(&json!(1)));
    }

    #[test]
    fn test_string() {
        assert!(string(&json!("hello")));
        assert!(!string(&json!(42)));
    }

    #[test]
    fn test_finite_number() {
        assert!(finite_number(&json!(42)));
        assert!(finite_number(&json!(-0.5)));
        assert!(!finite_number(&json!("42")));
        assert!(!finite_number(&json!(null)));
    }

    #[test]
    fn test_email_list() {
        assert!(email_list(&json!([])));
        assert!(email_list(&json!([
            {"address": "a@b.c", "expires": "2025-01-01T00:00:00Z"},
            {"address": "d@e.f"},
        ])));

        // Not a list at all.
        assert!(!email_list(&json!({"address": "a@b.c"})));
        // Missing or empty address.
        assert!(!email_list(&json!([{"expires": "2025-01-01T00:00:00Z"}])));
        assert!(!email_list(&json!([{"address": ""}])));
        assert!(!email_list(&json!([{"address": 42}])));
    }
}
