//! Runtime settings and credentials.
//!
//! Settings come from an optional YAML file where every field has a default.
//! Credentials are read once from the environment and handed to the clients
//! that need them; no component reads the environment on its own.

use crate::clients::{ANTHROPIC_BASE_URL, AnthropicClient, FetchError, NEWSAPI_BASE_URL, NewsApiClient};
use crate::contexts::{
    CodeExtractor, CodeSynthesizer, DEFAULT_ENGINE, DEFAULT_KEYWORDS, DEFAULT_LANGUAGE,
    DEFAULT_MAX_CAPTURE_BYTES, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_QUALITY_FLAG,
    DEFAULT_SOURCE_PATH, DEFAULT_TEMPERATURE, EngineCommandError, Renderer, SynthesisError,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Settings file picked up from the working directory when no path is given
pub const CONFIG_FILE: &str = "newsreel.yml";
pub const NEWSAPI_KEY_VAR: &str = "NEWSAPI_KEY";
pub const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Engine(#[from] EngineCommandError),
    #[error("Failed to build news client: {0}")]
    NewsClient(#[from] FetchError),
    #[error("Failed to build synthesis client: {0}")]
    SynthesisClient(#[from] SynthesisError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    pub base_url: String,
    pub keywords: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            base_url: NEWSAPI_BASE_URL.to_string(),
            keywords: DEFAULT_KEYWORDS.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub source_path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Engine command, split shell-style (`manim`, `python -m manim`, ...)
    pub engine: String,
    pub quality_flag: String,
    pub working_dir: Option<PathBuf>,
    /// `None` waits for the engine indefinitely
    pub timeout_secs: Option<u64>,
    pub max_capture_bytes: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            quality_flag: DEFAULT_QUALITY_FLAG.to_string(),
            working_dir: None,
            timeout_secs: None,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub news: NewsSettings,
    pub synthesis: SynthesisSettings,
    pub output: OutputSettings,
    pub render: RenderSettings,
}

impl Settings {
    /// Loads settings from `path`, or from `CONFIG_FILE` if it exists, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = PathBuf::from(CONFIG_FILE);
                if !default_path.exists() {
                    debug!("No config file found; using defaults");
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to null rather than an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.synthesis.temperature) {
            return Err(ConfigError::Invalid {
                field: "synthesis.temperature",
                reason: format!("{} is outside 0.0..=1.0", self.synthesis.temperature),
            });
        }
        if self.synthesis.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                field: "synthesis.max_tokens",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.render.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "render.timeout_secs",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        if self.output.source_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "output.source_path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn news_client(&self, credentials: &Credentials) -> Result<NewsApiClient, ConfigError> {
        Ok(NewsApiClient::new(
            credentials.news_api_key.clone(),
            self.news.base_url.clone(),
            Duration::from_secs(self.news.timeout_secs),
        )?)
    }

    pub fn synthesizer(
        &self,
        credentials: &Credentials,
    ) -> Result<CodeSynthesizer<AnthropicClient>, ConfigError> {
        let client = AnthropicClient::new(
            credentials.anthropic_api_key.clone(),
            self.synthesis.base_url.clone(),
            Duration::from_secs(self.synthesis.timeout_secs),
        )?;
        Ok(CodeSynthesizer::new(client, self.synthesis.model.clone())
            .with_temperature(self.synthesis.temperature)
            .with_max_tokens(self.synthesis.max_tokens))
    }

    pub fn extractor(&self) -> CodeExtractor {
        CodeExtractor::new(self.output.source_path.clone())
    }

    pub fn renderer(&self) -> Result<Renderer, ConfigError> {
        Ok(Renderer::from_command_line(&self.render.engine)?
            .with_quality_flag(self.render.quality_flag.clone())
            .with_working_dir(self.render.working_dir.clone())
            .with_timeout(self.render.timeout_secs.map(Duration::from_secs))
            .with_max_capture_bytes(self.render.max_capture_bytes))
    }
}

/// API keys for the two external services
#[derive(Clone, Default)]
pub struct Credentials {
    pub news_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Credentials {
    /// Reads `NEWSAPI_KEY` and `ANTHROPIC_API_KEY` from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds credentials from an arbitrary variable lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            news_api_key: read(NEWSAPI_KEY_VAR),
            anthropic_api_key: read(ANTHROPIC_KEY_VAR),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("news_api_key", &redact(&self.news_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .finish()
    }
}
