//! Ask command handler.
//!
//! Answers one question from the indexed documents, streaming to stdout.

use crate::bootstrap;
use clap::Args;
use ragline_core::{config::AppConfig, AppError, AppResult};
use std::io::Write;

/// Ask a question about the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of passages retrieved per tool call
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.question.trim();
        if question.is_empty() {
            return Err(AppError::Config("Question must not be empty".to_string()));
        }
        config.validate()?;

        let agent = bootstrap::agent(config, self.top_k).await?;
        let mut rx = agent.answer(question);

        let mut stdout = std::io::stdout();
        while let Some(fragment) = rx.recv().await {
            write!(stdout, "{}", fragment)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;

        Ok(())
    }
}
