//! Serve command handler.

use crate::bootstrap;
use clap::Args;
use ragline_core::{config::AppConfig, AppResult};
use ragline_server::AppState;

/// Run the HTTP server
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (overrides server.bind)
    #[arg(short, long)]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");
        config.validate()?;

        let agent = bootstrap::agent(config, None).await?;
        let bind = self.bind.as_deref().unwrap_or(&config.server.bind);

        println!("ragline listening on http://{}", bind);
        ragline_server::serve(AppState::new(agent), bind).await
    }
}
