//! Schema migration hook.
//!
//! A stored envelope may carry a version written by an older build. Before
//! such a payload is handed back to the caller it is passed through the
//! store's [`Migrate`] implementation, which can reshape it into the current
//! schema. The default implementation returns the payload unchanged and
//! notes that no migration rule exists.

use serde_json::Value;

/// Caller-overridable migration of payloads written under an older version.
///
/// Invoked only when a stored envelope carries a version string different
/// from the store's current version. Legacy bare values and envelopes with
/// no version field bypass migration entirely.
///
/// Implementations must not fail: a payload that cannot be migrated should
/// be returned as-is and left to the caller's validator to reject.
pub trait Migrate: Send + Sync {
    /// Reshape `data`, written under `from_version`, into the schema of
    /// `to_version`.
    fn migrate(&self, key: &str, data: Value, from_version: &str, to_version: &str) -> Value;
}

/// Identity migration: keeps the payload unchanged and logs the gap.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMigration;

impl Migrate for NoMigration {
    fn migrate(&self, key: &str, data: Value, from_version: &str, to_version: &str) -> Value {
        tracing::debug!(
            key,
            from = from_version,
            to = to_version,
            "no migration rule registered, keeping payload unchanged"
        );
        data
    }
}

/// Closures are migrations too.
impl<F> Migrate for F
where
    F: Fn(&str, Value, &str, &str) -> Value + Send + Sync,
{
    fn migrate(&self, key: &str, data: Value, from_version: &str, to_version: &str) -> Value {
        self(key, data, from_version, to_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_migration_is_identity() {
        let data = json!({"emails": []});
        let migrated = NoMigration.migrate("emails", data.clone(), "0.9.0", "1.0.0");
        assert_eq!(migrated, data);
    }

    #[test]
    fn test_closure_migration() {
        let rename = |_key: &str, data: Value, _from: &str, _to: &str| -> Value {
            match data {
                Value::Object(mut fields) => {
                    if let Some(v) = fields.remove("addr") {
                        fields.insert("address".to_string(), v);
                    }
                    Value::Object(fields)
                }
                other => other,
            }
        };

        let migrated = rename.migrate("email", json!({"addr": "a@b.c"}), "0.9.0", "1.0.0");
        assert_eq!(migrated, json!({"address": "a@b.c"}));
    }
}
