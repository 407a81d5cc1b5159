//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use papertrack_core::{ErrorKind, RetryPolicy, SortOrder};
use serde::Deserialize;

/// Global configuration for papertrack
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub classic: ClassicConfig,
    pub arxiv: ArxivConfig,
    pub scholar: ScholarConfig,
    pub workers: WorkersConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./reports"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Characters of paper text sent to the model; zero or negative means no limit
    pub max_content_length: i64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: std::env::var("LLM_API_KEY").ok(),
            model: "gpt-4".to_string(),
            max_tokens: 4000,
            temperature: 0.3,
            timeout_secs: 120,
            max_content_length: -1,
        }
    }
}

impl LlmConfig {
    pub fn content_limit(&self) -> Option<usize> {
        usize::try_from(self.max_content_length).ok().filter(|&n| n > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub category: String,
    pub days: u32,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            category: "cs.AI".to_string(),
            days: 7,
            max_results: 5,
        }
    }
}

/// How classic papers are picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    /// Relevance order plus keyword match
    Relevance,
    /// Citation thresholds from Semantic Scholar
    Citation,
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Relevance => "relevance",
            Self::Citation => "citation",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassicConfig {
    pub strategy: StrategyName,
    pub years_back: u32,
    /// relevance | lastUpdatedDate | submittedDate
    pub sort_by: String,
    pub min_citations: u64,
    pub min_influential_citations: u64,
    /// Spacing between citation lookups
    pub request_delay_ms: u64,
}

impl Default for ClassicConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyName::Relevance,
            years_back: 3,
            sort_by: "relevance".to_string(),
            min_citations: 10,
            min_influential_citations: 5,
            request_delay_ms: 2000,
        }
    }
}

impl ClassicConfig {
    pub fn sort_order(&self) -> Result<SortOrder> {
        SortOrder::from_name(&self.sort_by).with_context(|| {
            format!(
                "Unknown classic.sort_by '{}' (expected relevance, lastUpdatedDate or submittedDate)",
                self.sort_by
            )
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Abort a PDF download when no bytes arrive for this long
    pub stall_timeout_secs: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: papertrack_arxiv::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            stall_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScholarConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            base_url: papertrack_scholar::DEFAULT_BASE_URL.to_string(),
            api_key: std::env::var("S2_API_KEY").ok(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub concurrency: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}

/// One `[retry.<collaborator>]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retryable: Vec<ErrorKind>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RetryPolicy> for PolicyConfig {
    fn from(p: RetryPolicy) -> Self {
        Self {
            max_attempts: p.max_attempts,
            base_delay_ms: p.base_delay.as_millis() as u64,
            backoff_multiplier: p.backoff_multiplier,
            retryable: p.retryable,
        }
    }
}

impl PolicyConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
            self.retryable.iter().copied(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub discovery: PolicyConfig,
    pub citation: PolicyConfig,
    pub retrieval: PolicyConfig,
    pub summarize: PolicyConfig,
    pub report: PolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            discovery: PolicyConfig::default(),
            citation: PolicyConfig::default(),
            retrieval: PolicyConfig::default(),
            summarize: PolicyConfig::default(),
            report: RetryPolicy::no_retry().into(),
        }
    }
}

impl RetryConfig {
    fn named(&self) -> [(&'static str, &PolicyConfig); 5] {
        [
            ("discovery", &self.discovery),
            ("citation", &self.citation),
            ("retrieval", &self.retrieval),
            ("summarize", &self.summarize),
            ("report", &self.report),
        ]
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./papertrack.toml (current directory)
    /// 2. ~/.config/papertrack/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("papertrack.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "papertrack") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject settings a run cannot start with
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in self.retry.named() {
            if let Err(e) = policy.policy().validate() {
                bail!("retry.{name}: {e}");
            }
        }
        if self.workers.concurrency < 1 {
            bail!("workers.concurrency must be >= 1");
        }
        if self.search.max_results < 1 {
            bail!("search.max_results must be >= 1");
        }
        if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            bail!("LLM API key not configured: set llm.api_key or LLM_API_KEY");
        }
        self.classic.sort_order()?;
        Ok(())
    }
}
