//! PDF document loading.
//!
//! Lists a documents directory, extracts one `Page` per physical page and
//! merges metadata onto every page. Files that cannot be read are recorded in
//! the `LoadReport` and skipped; they never abort the run.

use crate::metadata::{enrich_document, MetadataTable};
use crate::types::{
    FileFailure, IngestionFileError, LoadReport, Page, PageMetadata, SourceDocument,
};
use ragline_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Failure reported by a `PageExtractor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractFailure {
    /// The file is not a structurally valid PDF
    Corrupt(String),
    Other { kind: String, message: String },
}

/// Splits a document file into page texts.
pub trait PageExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractFailure>;
}

/// `pdf-extract` backed extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PageExtractor for PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractFailure> {
        // Any parser error means the document structure could not be read.
        pdf_extract::extract_text_by_pages(path).map_err(|e| ExtractFailure::Corrupt(e.to_string()))
    }
}

/// Loads PDFs from a directory.
#[derive(Clone)]
pub struct DocumentLoader {
    extractor: Arc<dyn PageExtractor>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self {
            extractor: Arc::new(PdfExtractor),
        }
    }

    pub fn with_extractor(extractor: Arc<dyn PageExtractor>) -> Self {
        Self { extractor }
    }

    /// Load every `.pdf` directly inside `dir`, in file name order.
    pub async fn load_directory(&self, dir: &Path, table: &MetadataTable) -> AppResult<LoadReport> {
        if !dir.is_dir() {
            return Err(AppError::Config(format!(
                "Documents directory not found: {:?}",
                dir
            )));
        }

        let files = list_pdfs(dir);
        tracing::info!("Found {} PDF files in {:?}", files.len(), dir);

        let mut report = LoadReport::default();
        for path in files {
            let file = file_name(&path);
            match self.load_file(&path).await {
                Ok(mut document) => {
                    enrich_document(&mut document, table);
                    tracing::debug!("Loaded {} ({} pages)", file, document.pages.len());
                    report.documents.push(document);
                }
                Err(error) => {
                    let failure = FileFailure { file, error };
                    tracing::warn!("Skipping {}", failure);
                    report.errors.push(failure);
                }
            }
        }

        Ok(report)
    }

    /// Load a single file without metadata enrichment.
    pub async fn load_file(&self, path: &Path) -> Result<SourceDocument, IngestionFileError> {
        let size = std::fs::metadata(path).map_err(io_failure)?.len();
        if size == 0 {
            return Err(IngestionFileError::EmptyFile);
        }

        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract_pages(&owned)).await;

        let texts = match extracted {
            Ok(Ok(texts)) => texts,
            Ok(Err(ExtractFailure::Corrupt(message))) => {
                tracing::debug!("Extraction failed for {:?}: {}", path, message);
                return Err(IngestionFileError::CorruptFile);
            }
            Ok(Err(ExtractFailure::Other { kind, message })) => {
                return Err(IngestionFileError::Other { kind, message })
            }
            // The parser panics on some malformed streams
            Err(e) if e.is_panic() => return Err(IngestionFileError::CorruptFile),
            Err(e) => {
                return Err(IngestionFileError::Other {
                    kind: "JoinError".to_string(),
                    message: e.to_string(),
                })
            }
        };

        let identifier = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let source = file_name(path);

        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(idx, text)| Page {
                text,
                metadata: PageMetadata {
                    source: source.clone(),
                    page: idx as u32 + 1,
                    identifier: identifier.clone(),
                    ..Default::default()
                },
            })
            .collect();

        Ok(SourceDocument {
            identifier,
            path: path.to_path_buf(),
            pages,
        })
    }
}

fn list_pdfs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_pdf(p))
        .collect();
    files.sort();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn io_failure(e: std::io::Error) -> IngestionFileError {
    IngestionFileError::Other {
        kind: format!("{:?}", e.kind()),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataRecord;
    use std::fs;
    use tempfile::TempDir;

    /// Reads the file as UTF-8 and splits pages on form feeds.
    struct FormFeedExtractor;

    impl PageExtractor for FormFeedExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractFailure> {
            let raw = fs::read(path).map_err(|e| ExtractFailure::Other {
                kind: "Io".to_string(),
                message: e.to_string(),
            })?;
            let text = String::from_utf8(raw).map_err(|e| ExtractFailure::Corrupt(e.to_string()))?;
            Ok(text.split('\u{c}').map(str::to_string).collect())
        }
    }

    fn stub_loader() -> DocumentLoader {
        DocumentLoader::with_extractor(Arc::new(FormFeedExtractor))
    }

    fn metadata_for(uuid: &str) -> MetadataTable {
        vec![MetadataRecord {
            uuid: uuid.to_string(),
            title: Some("Annual review".to_string()),
            industries: ["Energy".to_string()].into_iter().collect(),
            date: Some("2023-11-30".to_string()),
            country_codes: ["US".to_string()].into_iter().collect(),
        }]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_three_pages_and_empty_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("abc123.pdf"),
            "page one\u{c}page two\u{c}page three",
        )
        .unwrap();
        fs::write(temp.path().join("empty.pdf"), "").unwrap();

        let report = stub_loader()
            .load_directory(temp.path(), &metadata_for("abc123"))
            .await
            .unwrap();

        assert_eq!(report.page_count(), 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].error, IngestionFileError::EmptyFile);
        assert_eq!(report.errors[0].to_string(), "empty.pdf: Empty file");

        let pages: Vec<_> = report.pages().collect();
        assert_eq!(pages[0].metadata.page, 1);
        assert_eq!(pages[2].metadata.page, 3);
        assert_eq!(pages[2].text, "page three");
        assert!(pages
            .iter()
            .all(|p| p.metadata.title.as_deref() == Some("Annual review")));
    }

    #[tokio::test]
    async fn test_unmatched_document_is_not_enriched() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("zzz.pdf"), "only page").unwrap();

        let report = stub_loader()
            .load_directory(temp.path(), &metadata_for("abc123"))
            .await
            .unwrap();

        let page = report.pages().next().unwrap();
        assert_eq!(page.metadata.identifier, "zzz");
        assert!(!page.metadata.is_enriched());
    }

    #[tokio::test]
    async fn test_only_top_level_pdfs_in_name_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.PDF"), "b").unwrap();
        fs::write(temp.path().join("a.pdf"), "a").unwrap();
        fs::write(temp.path().join("notes.txt"), "skip").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested/c.pdf"), "c").unwrap();

        let report = stub_loader()
            .load_directory(temp.path(), &MetadataTable::new())
            .await
            .unwrap();

        let ids: Vec<_> = report.documents.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_corrupt() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.pdf"), b"this is not a pdf at all").unwrap();

        let report = DocumentLoader::new()
            .load_directory(temp.path(), &MetadataTable::new())
            .await
            .unwrap();

        assert!(report.documents.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].error, IngestionFileError::CorruptFile);
        assert_eq!(report.errors[0].to_string(), "broken.pdf: Corrupted PDF");
    }

    #[tokio::test]
    async fn test_missing_directory_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = DocumentLoader::new()
            .load_directory(&temp.path().join("missing"), &MetadataTable::new())
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
