//! Ingest command handler.
//!
//! Loads the documents directory into the hybrid index.

use crate::bootstrap;
use clap::Args;
use ragline_core::{config::AppConfig, AppResult};
use ragline_knowledge::{IngestOptions, IngestPipeline, ProgressReporter};
use std::path::PathBuf;
use std::sync::Arc;

/// Index every PDF in the documents directory
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Documents directory (overrides knowledge.documentsPath)
    #[arg(short, long)]
    pub documents: Option<PathBuf>,

    /// Metadata JSONL file (default: <documents>/metadata.jsonl)
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// Records per upsert request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command");
        tracing::debug!("Ingest options: {:?}", self);

        let mut config = config.clone();
        if let Some(ref documents) = self.documents {
            config.knowledge.documents_path = Some(documents.clone());
        }
        if let Some(ref metadata) = self.metadata {
            config.knowledge.metadata_path = Some(metadata.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.knowledge.batch_size = batch_size;
        }
        config.validate()?;

        let embedder = bootstrap::embedder(&config).await?;
        let index = bootstrap::index(&config).await?;
        let options = IngestOptions::from_config(&config, embedder.dimensions())?;

        println!("Ingesting documents from {:?}", options.documents_dir);

        let progress = ProgressReporter::new(Arc::new(|event| {
            eprintln!("{}", event.format_simple());
        }));
        let report = IngestPipeline::new(embedder, index)
            .with_progress(progress)
            .run(&options)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!();
        println!("{}", "=".repeat(60));
        println!("Summary:");
        println!("  Files loaded:        {}", report.files_loaded);
        println!("  Files failed:        {}", report.file_errors.len());
        println!("  Pages:               {}", report.pages);
        println!("  Chunks:              {}", report.chunks);
        println!("  Dropped chunks:      {}", report.dropped_chunks);
        println!("  Records upserted:    {}", report.upserted);
        println!("  Vectors in index:    {}", report.total_vector_count);
        println!("  Duration:            {:.2}s", report.duration_secs);
        println!("{}", "=".repeat(60));

        if !report.file_errors.is_empty() {
            println!();
            println!("Errors encountered:");
            for error in &report.file_errors {
                println!("  - {}", error);
            }
        }

        Ok(())
    }
}
