//! Metadata module for source documents
//!
//! Loads the JSONL metadata table and merges records onto pages.

mod types;

pub use types::{MetadataRecord, MetadataTable};

use crate::types::SourceDocument;
use ragline_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Load the metadata table from a JSONL file.
///
/// Blank lines are skipped. Any malformed line aborts the whole load.
pub fn load_metadata(path: &Path) -> AppResult<MetadataTable> {
    if !path.is_file() {
        return Err(AppError::MetadataNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let mut table = MetadataTable::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: MetadataRecord =
            serde_json::from_str(line).map_err(|e| AppError::MetadataFormat {
                line: idx + 1,
                message: e.to_string(),
            })?;

        if record.uuid.trim().is_empty() {
            return Err(AppError::MetadataFormat {
                line: idx + 1,
                message: "empty uuid".to_string(),
            });
        }

        table.insert(record);
    }

    tracing::info!("Loaded {} metadata records from {:?}", table.len(), path);
    Ok(table)
}

/// Merge the matching metadata record onto every page of a document.
///
/// The record is looked up once by the document identifier. Returns `false`
/// and leaves the pages untouched when there is no record.
pub fn enrich_document(document: &mut SourceDocument, table: &MetadataTable) -> bool {
    let Some(record) = table.get(&document.identifier) else {
        tracing::warn!(
            "No metadata found for {} ({} pages left unenriched)",
            document.identifier,
            document.pages.len()
        );
        return false;
    };

    for page in &mut document.pages {
        page.metadata.title = record.title.clone();
        page.metadata.industries = record.industries.clone();
        page.metadata.date = record.date.clone();
        page.metadata.country_codes = record.country_codes.clone();
    }
    true
}

/// Deterministic record id for a chunk position.
pub fn record_id(source: &str, page: u32, start_offset: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0]);
    hasher.update(page.to_le_bytes());
    hasher.update((start_offset as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Page, PageMetadata};
    use std::fs;
    use tempfile::TempDir;

    fn document(identifier: &str, pages: u32) -> SourceDocument {
        SourceDocument {
            identifier: identifier.to_string(),
            path: format!("docs/{}.pdf", identifier).into(),
            pages: (1..=pages)
                .map(|page| Page {
                    text: "Quarterly results".to_string(),
                    metadata: PageMetadata {
                        source: format!("{}.pdf", identifier),
                        page,
                        identifier: identifier.to_string(),
                        ..Default::default()
                    },
                })
                .collect(),
        }
    }

    fn write_metadata(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("metadata.jsonl");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = write_metadata(
            temp.path(),
            "{\"uuid\":\"abc123\",\"title\":\"T\"}\n\n   \n{\"uuid\":\"def456\"}\n",
        );

        let table = load_metadata(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("def456").is_some());
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = load_metadata(&temp.path().join("nope.jsonl"));
        assert!(matches!(result, Err(AppError::MetadataNotFound(_))));
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let temp = TempDir::new().unwrap();
        let path = write_metadata(temp.path(), "{\"uuid\":\"a\"}\n{not json}\n");

        match load_metadata(&path) {
            Err(AppError::MetadataFormat { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_missing_key_is_format_error() {
        let temp = TempDir::new().unwrap();
        let path = write_metadata(temp.path(), "{\"title\":\"no key\"}\n");
        assert!(matches!(
            load_metadata(&path),
            Err(AppError::MetadataFormat { line: 1, .. })
        ));
    }

    #[test]
    fn test_enrich_known_identifier() {
        let temp = TempDir::new().unwrap();
        let path = write_metadata(
            temp.path(),
            r#"{"uuid":"abc123","title":"Steel outlook","industries":["Metals","Mining"],"date":"2024-03-01","country_codes":["BR","CL"]}"#,
        );
        let table = load_metadata(&path).unwrap();

        let mut doc = document("abc123", 3);
        assert!(enrich_document(&mut doc, &table));
        for (idx, page) in doc.pages.iter().enumerate() {
            assert_eq!(page.metadata.title.as_deref(), Some("Steel outlook"));
            assert_eq!(page.metadata.date.as_deref(), Some("2024-03-01"));
            assert!(page.metadata.industries.contains("Mining"));
            assert!(page.metadata.country_codes.contains("CL"));
            assert_eq!(page.metadata.page, idx as u32 + 1);
        }
    }

    #[test]
    fn test_enrich_unknown_identifier_is_noop() {
        let table: MetadataTable = vec![MetadataRecord {
            uuid: "abc123".to_string(),
            ..Default::default()
        }]
        .into_iter()
        .collect();

        let mut doc = document("zzz", 4);
        let before = doc.pages.clone();
        assert!(!enrich_document(&mut doc, &table));
        assert_eq!(doc.pages, before);
    }

    #[test]
    fn test_record_id_is_deterministic() {
        let a = record_id("a.pdf", 1, 0, "text");
        assert_eq!(a, record_id("a.pdf", 1, 0, "text"));
        assert_ne!(a, record_id("a.pdf", 1, 800, "text"));
        assert_eq!(a.len(), 32);
    }
}
