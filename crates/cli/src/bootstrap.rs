//! Construction of the long-lived handles shared by commands.

use ragline_core::{config::AppConfig, AppError, AppResult};
use ragline_knowledge::{
    create_provider, open_index, AgentConfig, AnswerAgent, EmbeddingConfig, EmbeddingProvider,
    HybridIndex, RetrievalTool, Toolbox,
};
use ragline_llm::create_client;
use ragline_prompt::{load_prompt_or_default, ANSWER_SYSTEM_PROMPT_ID};
use std::sync::Arc;

pub async fn embedder(config: &AppConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let provider = &config.knowledge.embedding_provider;
    let api_key = config.resolve_api_key(provider)?;
    let embedding = EmbeddingConfig::from_settings(&config.knowledge, api_key);
    tracing::debug!(
        "Embedding provider: {} ({}, {} dims)",
        embedding.provider,
        embedding.model,
        embedding.dimensions
    );
    create_provider(&embedding).await
}

pub async fn index(config: &AppConfig) -> AppResult<Arc<dyn HybridIndex>> {
    let uri = config.index_uri();
    tracing::debug!("Index '{}' at {:?}", config.index.name, uri);
    open_index(&config.index, &uri).await
}

/// Build the answer agent with its retrieval tool.
pub async fn agent(config: &AppConfig, top_k: Option<usize>) -> AppResult<Arc<AnswerAgent>> {
    let api_key = config.resolve_api_key(&config.provider)?;
    let llm = create_client(
        &config.provider,
        config.llm_endpoint.as_deref(),
        api_key.as_deref(),
    )
    .map_err(AppError::Config)?;

    let retrieval = RetrievalTool::new(
        config.encoder_path(),
        embedder(config).await?,
        index(config).await?,
    )
    .with_top_k(top_k.unwrap_or(config.knowledge.top_k));

    let prompt = load_prompt_or_default(&config.workspace, ANSWER_SYSTEM_PROMPT_ID)?;

    let agent = AnswerAgent::new(
        llm,
        Toolbox::new(Arc::new(retrieval)),
        AgentConfig {
            model: config.model.clone(),
            max_tool_rounds: config.server.max_tool_rounds,
            channel_capacity: config.server.channel_capacity,
            temperature: None,
        },
    )
    .with_prompt(prompt);

    Ok(Arc::new(agent))
}
