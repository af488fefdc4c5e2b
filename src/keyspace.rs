//! Logical-to-physical key mapping.
//!
//! All physical keys are `<prefix><logical>`. The prefix is the sole
//! isolation mechanism on a storage primitive shared by several stores and
//! unrelated code, so prefix filtering has to be exact: a namespace scan
//! must never touch another tenant's keys.

/// The namespace a store owns inside a shared storage primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Create a keyspace with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Map a logical key to its physical key.
    pub fn physical(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, logical)
    }

    /// Whether a physical key belongs to this namespace.
    pub fn contains(&self, physical: &str) -> bool {
        physical.starts_with(&self.prefix)
    }

    /// Recover the logical key from a physical key in this namespace.
    pub fn logical<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical.strip_prefix(self.prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_mapping() {
        let keys = KeySpace::new("ephemeral_");
        assert_eq!(keys.physical("emails"), "ephemeral_emails");
        assert_eq!(keys.prefix(), "ephemeral_");
    }

    #[test]
    fn test_contains_is_exact_prefix_match() {
        let keys = KeySpace::new("a_");
        assert!(keys.contains("a_emails"));
        assert!(!keys.contains("b_emails"));
        // A key equal to the bare prefix still belongs to the namespace.
        assert!(keys.contains("a_"));
    }

    #[test]
    fn test_logical_roundtrip() {
        let keys = KeySpace::new("ephemeral_");
        let physical = keys.physical("settings");
        assert_eq!(keys.logical(&physical), Some("settings"));
        assert_eq!(keys.logical("other_settings"), None);
    }
}
