//! Configuration management for ragline.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.ragline/config.yaml` or `RAGLINE_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! State produced by ingestion (encoder artifact, local index) lives under
//! `<workspace>/.ragline/` unless configured otherwise.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// LLM providers that can drive the answer agent.
pub const LLM_PROVIDERS: [&str; 2] = ["gemini", "ollama"];

/// Providers that can produce dense embeddings.
pub const EMBEDDING_PROVIDERS: [&str; 3] = ["gemini", "ollama", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragline/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider ("gemini" or "ollama")
    pub provider: String,

    /// Chat model identifier
    pub model: String,

    /// API key for Gemini (chat and embeddings)
    pub api_key: Option<String>,

    /// Custom LLM endpoint
    pub llm_endpoint: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Ingestion and retrieval settings
    pub knowledge: KnowledgeSettings,

    /// Hybrid index settings
    pub index: IndexSettings,

    /// HTTP server and agent settings
    pub server: ServerSettings,
}

/// Ingestion and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct KnowledgeSettings {
    /// Directory holding the source PDFs
    pub documents_path: Option<PathBuf>,

    /// JSONL metadata file; defaults to `<documents>/metadata.jsonl`
    pub metadata_path: Option<PathBuf>,

    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Chunks shorter than this (after trimming) are discarded
    pub min_chunk_chars: usize,

    /// Records per upsert batch
    pub batch_size: usize,

    /// Passages returned by the retrieval tool
    pub top_k: usize,

    /// Location of the fitted BM25 artifact
    pub encoder_path: Option<PathBuf>,

    /// Dense embedding provider ("gemini", "ollama", "mock")
    pub embedding_provider: String,

    /// Dense embedding model
    pub embedding_model: String,

    /// Dense vector length
    pub embedding_dimensions: usize,

    /// Custom embedding endpoint
    pub embedding_endpoint: Option<String>,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            documents_path: None,
            metadata_path: None,
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_chars: 10,
            batch_size: 100,
            top_k: 4,
            encoder_path: None,
            embedding_provider: "gemini".to_string(),
            embedding_model: "gemini-embedding-001".to_string(),
            embedding_dimensions: 3072,
            embedding_endpoint: None,
        }
    }
}

/// Hybrid index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexSettings {
    /// Index name
    pub name: String,

    /// Storage backend ("lancedb" or "memory")
    pub backend: String,

    /// LanceDB directory; defaults to `<workspace>/.ragline/index`
    pub uri: Option<PathBuf>,

    /// Dense similarity metric ("dotproduct" or "cosine")
    pub metric: String,

    /// Weight of the dense score in the fused score
    pub alpha: f32,

    /// Attempts per upsert batch before giving up
    pub upload_retries: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "isi-data-hybrid".to_string(),
            backend: "lancedb".to_string(),
            uri: None,
            metric: "dotproduct".to_string(),
            alpha: 0.5,
            upload_retries: 3,
        }
    }
}

/// HTTP server and agent settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Listen address
    pub bind: String,

    /// Tool-calling rounds before the agent must answer
    pub max_tool_rounds: usize,

    /// Buffered answer fragments per request
    pub channel_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            max_tool_rounds: 4,
            channel_capacity: 32,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    knowledge: Option<KnowledgeSettings>,
    index: Option<IndexSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            api_key: None,
            llm_endpoint: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            knowledge: KnowledgeSettings::default(),
            index: IndexSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment and config file.
    ///
    /// Environment variables:
    /// - `RAGLINE_WORKSPACE`: Override workspace path
    /// - `RAGLINE_CONFIG`: Path to config file
    /// - `RAGLINE_PROVIDER` / `RAGLINE_MODEL` / `RAGLINE_LLM_ENDPOINT`
    /// - `RAGLINE_API_KEY`, falling back to `GOOGLE_API_KEY`
    /// - `RAGLINE_DOCUMENTS_PATH` (or `DOCUMENTS_PATH`), `RAGLINE_METADATA_PATH`
    /// - `RAGLINE_EMBEDDING_PROVIDER`, `RAGLINE_INDEX_BACKEND`, `RAGLINE_BIND`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use ragline_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with_env(|key| std::env::var(key).ok())
    }

    /// Load configuration using `env` to look up variables.
    pub fn load_with_env<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workspace) = env("RAGLINE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Some(config_file) = env("RAGLINE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.ragline_dir().join("config.yaml"),
        };

        let mut api_key_env = None;
        if config_path.exists() {
            let (merged, key_env) = config.merge_yaml(&config_path)?;
            config = merged;
            api_key_env = key_env;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file does not exist: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Some(provider) = env("RAGLINE_PROVIDER") {
            config.provider = provider;
        }
        if let Some(model) = env("RAGLINE_MODEL") {
            config.model = model;
        }
        if let Some(endpoint) = env("RAGLINE_LLM_ENDPOINT") {
            config.llm_endpoint = Some(endpoint);
        }

        config.api_key = env("RAGLINE_API_KEY")
            .or_else(|| api_key_env.as_deref().and_then(&env))
            .or_else(|| env("GOOGLE_API_KEY"));

        if let Some(path) = env("RAGLINE_DOCUMENTS_PATH").or_else(|| env("DOCUMENTS_PATH")) {
            config.knowledge.documents_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env("RAGLINE_METADATA_PATH") {
            config.knowledge.metadata_path = Some(PathBuf::from(path));
        }
        if let Some(provider) = env("RAGLINE_EMBEDDING_PROVIDER") {
            config.knowledge.embedding_provider = provider;
        }
        if let Some(backend) = env("RAGLINE_INDEX_BACKEND") {
            config.index.backend = backend;
        }
        if let Some(bind) = env("RAGLINE_BIND") {
            config.server.bind = bind;
        }

        if let Some(level) = env("RUST_LOG") {
            config.log_level = Some(level);
        }
        if env("NO_COLOR").is_some() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    ///
    /// Returns the merged config and the name of the environment variable
    /// holding the API key, if the file names one.
    fn merge_yaml(self, path: &Path) -> AppResult<(Self, Option<String>)> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        // An empty file deserializes to unit, not a mapping
        let config_file: ConfigFile = if contents.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        let mut result = self;
        let mut api_key_env = None;

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            result.llm_endpoint = llm.endpoint.or(result.llm_endpoint);
            api_key_env = llm.api_key_env;
        }

        if let Some(knowledge) = config_file.knowledge {
            result.knowledge = knowledge;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }
        if let Some(server) = config_file.server {
            result.server = server;
        }

        Ok((result, api_key_env))
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .ragline directory.
    pub fn ragline_dir(&self) -> PathBuf {
        self.workspace.join(".ragline")
    }

    /// Ensure the .ragline directory exists.
    pub fn ensure_ragline_dir(&self) -> AppResult<()> {
        let dir = self.ragline_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragline directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Documents directory, failing if unset or missing.
    pub fn require_documents_path(&self) -> AppResult<PathBuf> {
        let path = self.knowledge.documents_path.clone().ok_or_else(|| {
            AppError::Config(
                "Documents path not configured. Set RAGLINE_DOCUMENTS_PATH or knowledge.documentsPath"
                    .to_string(),
            )
        })?;

        if !path.is_dir() {
            return Err(AppError::Config(format!(
                "Documents directory does not exist: {:?}",
                path
            )));
        }

        Ok(path)
    }

    /// Metadata file path; defaults to `metadata.jsonl` in the documents directory.
    pub fn metadata_path(&self) -> AppResult<PathBuf> {
        match self.knowledge.metadata_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(self.require_documents_path()?.join("metadata.jsonl")),
        }
    }

    /// Location of the fitted BM25 artifact.
    pub fn encoder_path(&self) -> PathBuf {
        self.knowledge
            .encoder_path
            .clone()
            .unwrap_or_else(|| self.ragline_dir().join("bm25_encoder.json"))
    }

    /// LanceDB directory for the hybrid index.
    pub fn index_uri(&self) -> PathBuf {
        self.index
            .uri
            .clone()
            .unwrap_or_else(|| self.ragline_dir().join("index"))
    }

    /// API key for providers that require one.
    pub fn resolve_api_key(&self, provider: &str) -> AppResult<Option<String>> {
        match provider {
            "gemini" => match self.api_key {
                Some(ref key) if !key.trim().is_empty() => Ok(Some(key.clone())),
                _ => Err(AppError::Config(
                    "Gemini requires an API key. Set RAGLINE_API_KEY or GOOGLE_API_KEY"
                        .to_string(),
                )),
            },
            _ => Ok(self.api_key.clone()),
        }
    }

    /// Validate provider names and numeric settings.
    pub fn validate(&self) -> AppResult<()> {
        if !LLM_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                LLM_PROVIDERS.join(", ")
            )));
        }

        let embedding = self.knowledge.embedding_provider.as_str();
        if !EMBEDDING_PROVIDERS.contains(&embedding) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                embedding,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        let k = &self.knowledge;
        if k.chunk_size == 0 || k.chunk_overlap >= k.chunk_size {
            return Err(AppError::Config(format!(
                "Invalid chunking: size {} must be positive and greater than overlap {}",
                k.chunk_size, k.chunk_overlap
            )));
        }
        if k.batch_size == 0 {
            return Err(AppError::Config("batchSize must be positive".to_string()));
        }
        if k.top_k == 0 {
            return Err(AppError::Config("topK must be positive".to_string()));
        }
        if k.embedding_dimensions == 0 {
            return Err(AppError::Config(
                "embeddingDimensions must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.index.alpha) {
            return Err(AppError::Config(format!(
                "index.alpha must be within [0, 1], got {}",
                self.index.alpha
            )));
        }
        if !matches!(self.index.metric.as_str(), "dotproduct" | "cosine") {
            return Err(AppError::Config(format!(
                "Unknown index metric: {}",
                self.index.metric
            )));
        }
        if !matches!(self.index.backend.as_str(), "lancedb" | "memory") {
            return Err(AppError::Config(format!(
                "Unknown index backend: {}",
                self.index.backend
            )));
        }

        if self.provider == "gemini" || embedding == "gemini" {
            self.resolve_api_key("gemini")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.model, "gemini-2.5-flash-lite");
        assert_eq!(config.knowledge.chunk_size, 1000);
        assert_eq!(config.knowledge.chunk_overlap, 200);
        assert_eq!(config.knowledge.top_k, 4);
        assert_eq!(config.index.name, "isi-data-hybrid");
        assert_eq!(config.index.metric, "dotproduct");
    }

    #[test]
    fn test_ragline_dir() {
        let config = AppConfig::default();
        assert!(config.ragline_dir().ends_with(".ragline"));
        assert!(config.encoder_path().ends_with("bm25_encoder.json"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
            true,
        );

        assert_eq!(overridden.provider, "ollama");
        assert_eq!(overridden.model, "llama3.2");
        assert!(overridden.verbose);
        assert!(overridden.log_json);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_env_overrides_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ragline")).unwrap();
        std::fs::write(
            dir.path().join(".ragline/config.yaml"),
            "llm:\n  provider: ollama\n  model: llama3.2\nknowledge:\n  topK: 6\n  chunkSize: 500\nindex:\n  alpha: 0.3\n",
        )
        .unwrap();

        let workspace = dir.path().to_string_lossy().to_string();
        let config = AppConfig::load_with_env(env_from(&[
            ("RAGLINE_WORKSPACE", workspace.as_str()),
            ("RAGLINE_MODEL", "qwen2.5"),
            ("GOOGLE_API_KEY", "secret"),
            ("DOCUMENTS_PATH", "/data/pdfs"),
        ]))
        .unwrap();

        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.knowledge.top_k, 6);
        assert_eq!(config.knowledge.chunk_size, 500);
        // Unspecified fields in a section keep their defaults
        assert_eq!(config.knowledge.chunk_overlap, 200);
        assert_eq!(config.index.alpha, 0.3);
        assert_eq!(
            config.knowledge.documents_path,
            Some(PathBuf::from("/data/pdfs"))
        );
    }

    #[test]
    fn test_missing_workspace_is_config_error() {
        let result = AppConfig::load_with_env(env_from(&[(
            "RAGLINE_WORKSPACE",
            "/definitely/not/here",
        )]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_gemini_requires_key() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ollama_with_mock_embeddings() {
        let mut config = AppConfig::default();
        config.provider = "ollama".to_string();
        config.knowledge.embedding_provider = "mock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = AppConfig::default();
        config.api_key = Some("key".to_string());
        config.knowledge.chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_documents_path() {
        let mut config = AppConfig::default();
        assert!(config.require_documents_path().is_err());

        let dir = tempfile::tempdir().unwrap();
        config.knowledge.documents_path = Some(dir.path().to_path_buf());
        assert_eq!(config.require_documents_path().unwrap(), dir.path());
        assert_eq!(
            config.metadata_path().unwrap(),
            dir.path().join("metadata.jsonl")
        );
    }
}
