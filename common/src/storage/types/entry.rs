use serde::{Deserialize, Serialize};

use super::StoredObject;

/// A row as it appears in the source CSV. A missing eligibility column
/// deserializes to the empty string, which sanitizes to `false`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    pub email: String,
    #[serde(default)]
    pub eligible: String,
}

/// The normalized record written to the blocklist table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlocklistEntry {
    pub email: String,
    pub eligible: bool,
    pub load_date: String,
}

impl RawEntry {
    /// Normalize a raw row for storage. Only the literal string "true"
    /// counts as eligible, any other value is treated as ineligible.
    pub fn sanitize(self, load_date: &str) -> BlocklistEntry {
        BlocklistEntry {
            email: self.email,
            eligible: self.eligible == "true",
            load_date: load_date.to_string(),
        }
    }
}

impl StoredObject for BlocklistEntry {
    fn table_name() -> &'static str {
        "blocklist"
    }

    fn key_field() -> &'static str {
        "email"
    }

    fn get_id(&self) -> &str {
        &self.email
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(email: &str, eligible: &str) -> RawEntry {
        RawEntry {
            email: email.to_string(),
            eligible: eligible.to_string(),
        }
    }

    #[test]
    fn test_sanitize_normalizes_eligibility() {
        let load_date = "2023-07-22T05:46:40.000Z";

        let entry = raw("a@example.com", "true").sanitize(load_date);
        assert!(entry.eligible);
        assert_eq!(entry.email, "a@example.com");
        assert_eq!(entry.load_date, load_date);

        for value in ["false", "TRUE", "True", "1", "yes", ""] {
            let entry = raw("b@example.com", value).sanitize(load_date);
            assert!(!entry.eligible, "{value:?} should not count as eligible");
        }
    }

    #[test]
    fn test_missing_eligible_column_defaults_to_ineligible() {
        let raw: RawEntry =
            serde_json::from_str(r#"{"email":"c@example.com"}"#).expect("deserialize");
        assert_eq!(raw.eligible, "");
        assert!(!raw.sanitize("2023-01-01T00:00:00.000Z").eligible);
    }
}
