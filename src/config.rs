//! Configuration
//!
//! Settings come from an optional TOML file; every field has a default, so an empty or
//! missing file is valid. API keys are never read from the file, only from the
//! environment (a `.env` file in the working directory is loaded first).

use crate::anthropic::CLAUDE_SONNET;
use crate::error::{Error, Result};
use crate::logging::default_log_dir;
use crate::partition::PartitionConfig;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "followup.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Falls back to the provider's default model.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: None,
            base_url: None,
            temperature: 0.4,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub results_per_query: usize,
    pub excerpt_chars: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            results_per_query: 3,
            excerpt_chars: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Segments passed on to starter generation.
    pub top_k: usize,
    pub starters_per_segment: usize,
    /// Detect the conversation's language and ask oracles to answer in it.
    pub classify_language: bool,
    pub partition: PartitionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            starters_per_segment: 5,
            classify_language: true,
            partition: PartitionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    /// Daily log files go here. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "followup=info".to_string(),
            directory: Some(default_log_dir()),
            retention_days: 7,
        }
    }
}

/// Credentials, taken from the environment only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub firecrawl: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `lookup` maps a variable name to its value. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| lookup(n))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        Self {
            openai: first(&["OPENAI_API_KEY", "OPENAI_KEY", "OPENAI_TOKEN"]),
            anthropic: first(&["ANTHROPIC_API_KEY"]),
            firecrawl: first(&["FIRECRAWL_API_KEY"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: Provider,
    pub openai: ModelSettings,
    pub anthropic: ModelSettings,
    pub research: ResearchSettings,
    pub pipeline: PipelineConfig,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub keys: ApiKeys,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            openai: ModelSettings::default(),
            anthropic: ModelSettings::default(),
            research: ResearchSettings::default(),
            pipeline: PipelineConfig::default(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
            keys: ApiKeys::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist. Without one, `followup.toml` in the
    /// working directory is used if present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.keys = ApiKeys::from_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.top_k == 0 {
            return Err(Error::Config("pipeline.top_k must be at least 1".to_string()));
        }
        if self.pipeline.starters_per_segment == 0 {
            return Err(Error::Config(
                "pipeline.starters_per_segment must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        self.pipeline.partition.validate()
    }

    pub fn model_settings(&self) -> &ModelSettings {
        match self.provider {
            Provider::OpenAI => &self.openai,
            Provider::Anthropic => &self.anthropic,
        }
    }

    pub fn model_name(&self) -> &str {
        let default = match self.provider {
            Provider::OpenAI => DEFAULT_OPENAI_MODEL,
            Provider::Anthropic => CLAUDE_SONNET,
        };
        self.model_settings().model.as_deref().unwrap_or(default)
    }

    pub fn provider_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAI => self.keys.openai.as_deref(),
            Provider::Anthropic => self.keys.anthropic.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.pipeline.top_k, 3);
        assert_eq!(config.pipeline.starters_per_segment, 5);
        assert_eq!(config.pipeline.partition.max_segments, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.model_name(), "gpt-4o");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let raw = r#"
provider = "anthropic"

[pipeline]
top_k = 2

[pipeline.partition]
min_words_per_segment = 25

[anthropic]
temperature = 0.2

[retry]
max_attempts = 5

[logging]
filter = "followup=debug"
"#;
        let config = AppConfig::from_toml(raw).unwrap();
        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.pipeline.top_k, 2);
        assert_eq!(config.pipeline.starters_per_segment, 5);
        assert_eq!(config.pipeline.partition.min_words_per_segment, 25);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.min_delay_ms, 250);
        assert_eq!(config.model_name(), CLAUDE_SONNET);
        assert_eq!(config.model_settings().temperature, 0.2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[pipeline]\ntop_k = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(AppConfig::from_toml("provider = 3"), Err(Error::Toml(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("followup.toml");
        std::fs::write(&path, "[pipeline]\nstarters_per_segment = 4\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.pipeline.starters_per_segment, 4);

        let missing = AppConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Io { .. })));
    }

    #[test]
    fn test_api_keys_fallback_names() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "  "),
            ("OPENAI_TOKEN", "sk-token"),
            ("FIRECRAWL_API_KEY", "fc-1"),
        ]
        .into_iter()
        .collect();

        let keys = ApiKeys::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(keys.openai.as_deref(), Some("sk-token"));
        assert_eq!(keys.anthropic, None);
        assert_eq!(keys.firecrawl.as_deref(), Some("fc-1"));
    }
}
