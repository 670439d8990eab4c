//! Structured progress reporting for ingestion.
//!
//! The pipeline emits one event per step so callers (the CLI) can render
//! incremental feedback during long uploads.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Ingestion phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Loading,
    Chunking,
    Encoding,
    Uploading,
    Completed,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressPhase::Loading => "loading",
            ProgressPhase::Chunking => "chunking",
            ProgressPhase::Encoding => "encoding",
            ProgressPhase::Uploading => "uploading",
            ProgressPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Progress event emitted during ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,

    /// Units done so far (files, chunks, batches)
    pub current: u64,

    /// Total expected work, if known
    pub total: Option<u64>,

    /// Percentage complete (0.0 - 100.0)
    pub percentage: Option<f64>,

    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: ProgressPhase,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        let percentage =
            total.map(|t| if t > 0 { (current as f64 / t as f64) * 100.0 } else { 0.0 });

        Self {
            phase,
            current,
            total,
            percentage,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = Some(elapsed_secs);
        self
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };
        let pct = self
            .percentage
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits progress events through an optional callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let event = event.with_elapsed(elapsed);

        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            message = %event.message,
            elapsed_secs = elapsed,
            "Progress event"
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn loading(&self, files: u64, pages: u64) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Loading,
            files,
            None,
            format!("{} pages loaded", pages),
        ));
    }

    pub fn chunking(&self, kept: u64, dropped: u64) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Chunking,
            kept,
            None,
            format!("{} chunks kept, {} dropped", kept, dropped),
        ));
    }

    pub fn encoding(&self, vocabulary: u64, model: &str) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Encoding,
            vocabulary,
            None,
            format!("BM25 vocabulary fitted, dense model={}", model),
        ));
    }

    pub fn uploading(&self, batch: u64, batches: u64, records: u64) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Uploading,
            batch,
            Some(batches),
            format!("{} records upserted", records),
        ));
    }

    pub fn completed(&self, total_vectors: u64) {
        self.emit(ProgressEvent::new(
            ProgressPhase::Completed,
            total_vectors,
            None,
            format!("index holds {} vectors", total_vectors),
        ));
    }
}
