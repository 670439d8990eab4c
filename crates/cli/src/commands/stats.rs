//! Stats command handler.
//!
//! Shows the size and shape of the hybrid index.

use crate::bootstrap;
use clap::Args;
use ragline_core::{config::AppConfig, AppResult};

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let index = bootstrap::index(config).await?;
        let stats = index.describe_stats().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Index:      {}", stats.name);
        println!("Backend:    {}", config.index.backend);
        println!("Metric:     {}", stats.metric.as_str());
        println!("Dimension:  {}", stats.dimension);
        println!("Vectors:    {}", stats.total_vector_count);

        let encoder = config.encoder_path();
        if encoder.is_file() {
            println!("Encoder:    {:?}", encoder);
        } else {
            println!("Encoder:    missing (run 'ragline ingest')");
        }

        Ok(())
    }
}
