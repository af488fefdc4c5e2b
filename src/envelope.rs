//! The versioned record persisted per physical key.
//!
//! Every write wraps the caller's payload in an [`Envelope`] carrying the
//! writer's schema version and a write timestamp. Reads must also accept a
//! legacy shape where the stored string is the bare payload with no wrapper
//! at all; the two are distinguished by the presence of a `data` property.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Versioned wrapper stored as UTF-8 JSON under each physical key.
///
/// On-disk shape:
///
/// ```json
/// {"version": "1.0.0", "timestamp": "2025-01-15T10:30:00Z", "data": ...}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Schema version the writer was running.
    pub version: String,
    /// Instant of the write, RFC 3339.
    pub timestamp: DateTime<Utc>,
    /// Opaque caller payload.
    pub data: Value,
}

impl Envelope {
    /// Wrap `data` in a fresh envelope stamped with the current instant.
    pub fn new(version: &str, data: Value) -> Self {
        Self {
            version: version.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outcome of leniently parsing a stored string.
///
/// A JSON object with a `data` property is the enveloped shape; any other
/// valid JSON is a legacy bare payload. Content that is not JSON at all is
/// corruption, reported as the error case.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    /// Current shape. `version` and `timestamp` are optional on read:
    /// envelopes written by older builds may omit either.
    Enveloped {
        version: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        data: Value,
    },
    /// Pre-envelope shape: the stored value is the payload itself.
    Legacy(Value),
}

impl StoredRecord {
    /// Leniently parse a raw stored string.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        match value {
            Value::Object(mut fields) if fields.contains_key("data") => {
                let version = fields
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let timestamp = fields
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|ts| ts.with_timezone(&Utc));
                let data = fields.remove("data").unwrap_or(Value::Null);
                Ok(Self::Enveloped {
                    version,
                    timestamp,
                    data,
                })
            }
            other => Ok(Self::Legacy(other)),
        }
    }

    /// The write timestamp, if this record carries a usable one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Enveloped { timestamp, .. } => *timestamp,
            Self::Legacy(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_written_envelope_parses_back() {
        let envelope = Envelope::new("1.0.0", json!({"emails": ["a@b.c"]}));
        let raw = envelope.to_json().expect("serialize should succeed");

        let record = StoredRecord::parse(&raw).expect("parse should succeed");
        match record {
            StoredRecord::Enveloped {
                version,
                timestamp,
                data,
            } => {
                assert_eq!(version.as_deref(), Some("1.0.0"));
                assert_eq!(timestamp, Some(envelope.timestamp));
                assert_eq!(data, json!({"emails": ["a@b.c"]}));
            }
            StoredRecord::Legacy(_) => panic!("expected enveloped record"),
        }
    }

    #[test]
    fn test_bare_value_is_legacy() {
        let record = StoredRecord::parse(r#"["a@b.c","d@e.f"]"#).expect("parse should succeed");
        assert_eq!(record, StoredRecord::Legacy(json!(["a@b.c", "d@e.f"])));
        assert_eq!(record.timestamp(), None);
    }

    #[test]
    fn test_object_without_data_property_is_legacy() {
        // An object is only an envelope if it has a `data` property.
        let record =
            StoredRecord::parse(r#"{"version":"1.0.0","address":"a@b.c"}"#).expect("should parse");
        assert!(matches!(record, StoredRecord::Legacy(_)));
    }

    #[test]
    fn test_envelope_with_missing_fields() {
        let record = StoredRecord::parse(r#"{"data":42}"#).expect("parse should succeed");
        assert_eq!(
            record,
            StoredRecord::Enveloped {
                version: None,
                timestamp: None,
                data: json!(42),
            }
        );
    }

    #[test]
    fn test_unparsable_timestamp_is_dropped() {
        let record = StoredRecord::parse(r#"{"data":1,"timestamp":"not-a-date"}"#)
            .expect("parse should succeed");
        assert_eq!(record.timestamp(), None);
    }

    #[test]
    fn test_non_json_is_an_error() {
        assert!(StoredRecord::parse("{{{not json").is_err());
        assert!(StoredRecord::parse("").is_err());
    }
}
