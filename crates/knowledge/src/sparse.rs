//! BM25 sparse encoder.
//!
//! Fitted on the ingested corpus and persisted as JSON next to the index.
//! The same fitted model must encode both the corpus and later queries.
//!
//! Term ids are derived from the term itself, so a record encoded in an
//! earlier ingestion run stays comparable with queries after a refit. Only
//! document frequencies and lengths change between fits.

use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_K1: f32 = 1.2;
pub const DEFAULT_B: f32 = 0.75;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Lowercased alphanumeric terms with stop words and single characters removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .flat_map(|word| {
            word.to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| t.chars().count() > 1 && !stop_words().contains(t))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Stable id of a term: the first four bytes of its SHA-256 digest.
pub fn term_id(term: &str) -> u32 {
    let digest = Sha256::digest(term.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Sparse vector with indices sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    fn from_weights(weights: BTreeMap<u32, f32>) -> Self {
        let total: f32 = weights.values().sum();
        if total <= 0.0 {
            return Self::default();
        }
        let (indices, values) = weights.into_iter().map(|(i, w)| (i, w / total)).unzip();
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Corpus statistics contributed by one source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SourceStats {
    n_docs: u32,
    total_len: u64,
    term_docs: BTreeMap<String, u32>,
}

impl SourceStats {
    fn add(&mut self, text: &str) {
        let tokens = tokenize(text);
        self.n_docs += 1;
        self.total_len += tokens.len() as u64;
        let unique: HashSet<String> = tokens.into_iter().collect();
        for term in unique {
            *self.term_docs.entry(term).or_insert(0) += 1;
        }
    }
}

/// BM25 model: vocabulary, document frequencies and length statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Encoder {
    k1: f32,
    b: f32,
    n_docs: u32,
    avg_doc_len: f32,
    vocabulary: BTreeMap<String, u32>,
    doc_freq: BTreeMap<u32, u32>,
    /// Per-source statistics the aggregates above are rebuilt from
    #[serde(default)]
    sources: BTreeMap<String, SourceStats>,
}

impl Default for Bm25Encoder {
    fn default() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25Encoder {
    pub fn with_params(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            n_docs: 0,
            avg_doc_len: 0.0,
            vocabulary: BTreeMap::new(),
            doc_freq: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Fit a default-parameter encoder on a corpus.
    pub fn fitted<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut encoder = Self::default();
        encoder.fit(texts);
        encoder
    }

    /// Learn vocabulary and statistics, replacing any earlier fit.
    pub fn fit<I, S>(&mut self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stats = SourceStats::default();
        for text in texts {
            stats.add(text.as_ref());
        }
        self.sources.clear();
        self.sources.insert(String::new(), stats);
        self.rebuild();
    }

    /// Refit the statistics of the given sources from `(source, text)` pairs.
    ///
    /// Sources not present in `docs` keep what earlier fits learned about
    /// them, so records they produced remain scoreable.
    pub fn update<I, S, T>(&mut self, docs: I)
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut fresh: BTreeMap<String, SourceStats> = BTreeMap::new();
        for (source, text) in docs {
            fresh
                .entry(source.as_ref().to_string())
                .or_default()
                .add(text.as_ref());
        }
        let refitted = fresh.len();
        self.sources.extend(fresh);
        self.rebuild();
        tracing::debug!("Refitted {} of {} sources", refitted, self.sources.len());
    }

    fn rebuild(&mut self) {
        self.vocabulary.clear();
        self.doc_freq.clear();
        let mut n_docs = 0u32;
        let mut total_len = 0u64;

        for stats in self.sources.values() {
            n_docs += stats.n_docs;
            total_len += stats.total_len;
            for (term, df) in &stats.term_docs {
                let id = *self
                    .vocabulary
                    .entry(term.clone())
                    .or_insert_with(|| term_id(term));
                *self.doc_freq.entry(id).or_insert(0) += df;
            }
        }

        self.n_docs = n_docs;
        self.avg_doc_len = if n_docs > 0 {
            total_len as f32 / n_docs as f32
        } else {
            0.0
        };

        tracing::info!(
            "Fitted BM25 on {} documents ({} terms, avg length {:.1})",
            self.n_docs,
            self.vocabulary.len(),
            self.avg_doc_len
        );
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn n_docs(&self) -> u32 {
        self.n_docs
    }

    /// Saturated term-frequency weights for a corpus text.
    pub fn encode_documents(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;
        let avg = if self.avg_doc_len > 0.0 {
            self.avg_doc_len
        } else {
            1.0
        };

        let mut tf: BTreeMap<u32, f32> = BTreeMap::new();
        for token in &tokens {
            if let Some(&id) = self.vocabulary.get(token) {
                *tf.entry(id).or_insert(0.0) += 1.0;
            }
        }

        let norm = self.k1 * (1.0 - self.b + self.b * doc_len / avg);
        let weights = tf
            .into_iter()
            .map(|(id, f)| (id, f * (self.k1 + 1.0) / (f + norm)))
            .collect();
        SparseVector::from_weights(weights)
    }

    /// IDF weights for the distinct known terms of a query.
    pub fn encode_queries(&self, text: &str) -> SparseVector {
        let n = self.n_docs as f32;
        let weights = tokenize(text)
            .iter()
            .filter_map(|token| self.vocabulary.get(token))
            .map(|&id| {
                let df = self.doc_freq.get(&id).copied().unwrap_or(0) as f32;
                (id, ((n + 1.0) / (df + 0.5)).ln())
            })
            .collect();
        SparseVector::from_weights(weights)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Saved BM25 encoder to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.is_file() {
            return Err(AppError::Knowledge(format!(
                "BM25 encoder not found at {:?}. Run 'ragline ingest' first.",
                path
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let encoder: Self = serde_json::from_str(&content).map_err(|e| {
            AppError::Knowledge(format!("Failed to parse BM25 encoder {:?}: {}", path, e))
        })?;
        tracing::debug!(
            "Loaded BM25 encoder ({} terms) from {:?}",
            encoder.vocabulary.len(),
            path
        );
        Ok(encoder)
    }
}
