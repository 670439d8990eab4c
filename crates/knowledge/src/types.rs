//! Knowledge pipeline type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Metadata attached to a single page and inherited by its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// File name of the source document
    pub source: String,

    /// 1-based page number
    pub page: u32,

    /// Document identifier (file stem), used as the metadata lookup key
    pub identifier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub industries: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub country_codes: BTreeSet<String>,
}

impl PageMetadata {
    /// True once a metadata record has been merged in.
    pub fn is_enriched(&self) -> bool {
        self.title.is_some()
            || self.date.is_some()
            || !self.industries.is_empty()
            || !self.country_codes.is_empty()
    }
}

/// One physical page of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub text: String,
    pub metadata: PageMetadata,
}

/// A loaded PDF: its identifier plus pages in physical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub identifier: String,
    pub path: PathBuf,
    pub pages: Vec<Page>,
}

/// Contiguous slice of a page's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    /// Character offset of `text` within the page text
    pub start_offset: usize,

    pub metadata: PageMetadata,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Why a single file was skipped during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionFileError {
    EmptyFile,
    CorruptFile,
    Other { kind: String, message: String },
}

/// A per-file failure recorded by the loader. Never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: String,
    pub error: IngestionFileError,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            IngestionFileError::EmptyFile => write!(f, "{}: Empty file", self.file),
            IngestionFileError::CorruptFile => write!(f, "{}: Corrupted PDF", self.file),
            IngestionFileError::Other { kind, message } => {
                write!(f, "{}: {} - {}", self.file, kind, message)
            }
        }
    }
}

/// Outcome of loading a document directory.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<SourceDocument>,
    pub errors: Vec<FileFailure>,
}

impl LoadReport {
    /// All pages across documents, in document then page order.
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.documents.iter().flat_map(|doc| doc.pages.iter())
    }

    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|doc| doc.pages.len()).sum()
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub files_loaded: usize,
    pub pages: usize,
    pub chunks: usize,
    pub dropped_chunks: usize,
    pub upserted: usize,

    /// Rendered per-file failures
    pub file_errors: Vec<String>,

    pub total_vector_count: u64,
    pub duration_secs: f64,
    pub completed_at: DateTime<Utc>,
}
