//! Metadata record types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One line of the metadata JSONL file.
///
/// The key is `uuid`; `identifier` is accepted as an alias. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(alias = "identifier")]
    pub uuid: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub industries: BTreeSet<String>,

    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub country_codes: BTreeSet<String>,
}

/// Metadata records keyed by document identifier.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    records: HashMap<String, MetadataRecord>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. A later record with the same key replaces the earlier one.
    pub fn insert(&mut self, record: MetadataRecord) {
        self.records.insert(record.uuid.clone(), record);
    }

    pub fn get(&self, identifier: &str) -> Option<&MetadataRecord> {
        self.records.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<MetadataRecord> for MetadataTable {
    fn from_iter<I: IntoIterator<Item = MetadataRecord>>(iter: I) -> Self {
        let mut table = Self::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_alias_and_unknown_fields() {
        let record: MetadataRecord = serde_json::from_str(
            r#"{"identifier":"abc123","title":"Steel outlook","publisher":"ignored"}"#,
        )
        .unwrap();

        assert_eq!(record.uuid, "abc123");
        assert_eq!(record.title.as_deref(), Some("Steel outlook"));
        assert!(record.industries.is_empty());
    }

    #[test]
    fn test_later_record_wins() {
        let table: MetadataTable = vec![
            MetadataRecord {
                uuid: "a".to_string(),
                title: Some("first".to_string()),
                ..Default::default()
            },
            MetadataRecord {
                uuid: "a".to_string(),
                title: Some("second".to_string()),
                ..Default::default()
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a").unwrap().title.as_deref(), Some("second"));
    }
}
