use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::agents::DEFAULT_MAX_TURNS;
use crate::llm::ModelConfig;
use crate::{ContentError, SecretValue, optional_env};

const DEFAULT_CONFIG_PATH: &str = "contentcrew.toml";
const CONFIG_PATH_ENV: &str = "CONTENTCREW_CONFIG";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Model settings with the credential resolved from the environment.
    ///
    /// A missing key is not an error here; the model call reports it.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model: Some(self.llm.model.clone()).filter(|model| !model.trim().is_empty()),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            api_key: optional_env(&self.llm.api_key_env),
            base_url: self.llm.base_url.clone(),
        }
    }

    /// Search credential, if the configured variable is present.
    pub fn search_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.search.api_key_env)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument (must exist).
    /// 2. `CONTENTCREW_CONFIG` environment variable (must exist).
    /// 3. `contentcrew.toml` in the current working directory, or built-in
    ///    defaults when that file is absent.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ContentError> {
        let config = match resolve_path(path) {
            Candidate::Required(path) => Self::load_file(&path)?,
            Candidate::Implicit(path) if path.exists() => Self::load_file(&path)?,
            Candidate::Implicit(_) => Config::default(),
        };

        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Config, ContentError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| ContentError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Config, ContentError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| ContentError::config_io(path.to_path_buf(), err))?;
        toml::from_str(&raw).map_err(|err| ContentError::InvalidConfiguration(err.to_string()))
    }

    fn validate(config: &Config) -> Result<(), ContentError> {
        if config.pipeline.max_turns == 0 {
            return Err(ContentError::InvalidConfiguration(
                "pipeline.max_turns must be at least 1".into(),
            ));
        }
        if config.search.num_results == 0 {
            return Err(ContentError::InvalidConfiguration(
                "search.num_results must be at least 1".into(),
            ));
        }
        if config.search.endpoint.trim().is_empty() {
            return Err(ContentError::InvalidConfiguration(
                "search.endpoint must not be empty".into(),
            ));
        }
        Ok(())
    }
}

enum Candidate {
    Required(PathBuf),
    Implicit(PathBuf),
}

fn resolve_path(path: Option<PathBuf>) -> Candidate {
    if let Some(path) = path {
        return Candidate::Required(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return Candidate::Required(PathBuf::from(from_env));
        }
    }

    Candidate::Implicit(Path::new(DEFAULT_CONFIG_PATH).to_path_buf())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
    #[serde(default = "LlmConfig::default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "LlmConfig::default_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default = "LlmConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl LlmConfig {
    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    const fn default_temperature() -> Option<f32> {
        Some(0.7)
    }

    const fn default_max_tokens() -> Option<u32> {
        Some(4_000)
    }

    fn default_api_key_env() -> String {
        "OPENAI_API_KEY".to_string()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
            api_key_env: Self::default_api_key_env(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "SearchConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "SearchConfig::default_num_results")]
    pub num_results: u32,
    #[serde(default = "SearchConfig::default_fetch_full_content")]
    pub fetch_full_content: bool,
    #[serde(default = "SearchConfig::default_page_timeout_secs")]
    pub page_timeout_secs: u64,
}

impl SearchConfig {
    fn default_endpoint() -> String {
        "https://serpapi.com/search".to_string()
    }

    fn default_api_key_env() -> String {
        "SERPAPI_API_KEY".to_string()
    }

    const fn default_num_results() -> u32 {
        10
    }

    const fn default_fetch_full_content() -> bool {
        true
    }

    const fn default_page_timeout_secs() -> u64 {
        10
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            api_key_env: Self::default_api_key_env(),
            num_results: Self::default_num_results(),
            fetch_full_content: Self::default_fetch_full_content(),
            page_timeout_secs: Self::default_page_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "PipelineConfig::default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "PipelineConfig::default_category")]
    pub default_category: String,
}

impl PipelineConfig {
    const fn default_max_turns() -> usize {
        DEFAULT_MAX_TURNS
    }

    fn default_category() -> String {
        "Technology".to_string()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_turns: Self::default_max_turns(),
            default_category: Self::default_category(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}
