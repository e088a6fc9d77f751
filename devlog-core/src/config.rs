use std::path::PathBuf;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::rate_limit::RateLimitSettings;

/// Settings for one model identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model name as the generation service knows it.
    pub model: String,
    #[serde(flatten)]
    pub limits: RateLimitSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Posts, titles and secondary summaries.
    #[serde(default = "default_content_model")]
    pub content: ModelSettings,
    /// Summaries of oversized diffs.
    #[serde(default = "default_summary_model")]
    pub summary: ModelSettings,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            content: default_content_model(),
            summary: default_summary_model(),
        }
    }
}

fn default_content_model() -> ModelSettings {
    ModelSettings {
        model: "gemini-1.5-pro".to_string(),
        limits: RateLimitSettings {
            capacity: 32_000,
            refill_per_minute: 32_000,
            requests_per_minute: 2,
        },
    }
}

fn default_summary_model() -> ModelSettings {
    ModelSettings {
        model: "gemini-1.5-flash".to_string(),
        limits: RateLimitSettings {
            capacity: 1_000_000,
            refill_per_minute: 1_000_000,
            requests_per_minute: 15,
        },
    }
}

/// Retry policy for prompts the service refuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further one.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetrySettings {
    /// Backoff before attempt `attempt + 1`, counting attempts from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizerSettings {
    /// Patches longer than this many characters are summarized remotely.
    #[serde(default = "default_patch_size_threshold")]
    pub patch_size_threshold: usize,
    /// Diff lines kept in a local excerpt.
    #[serde(default = "default_excerpt_lines")]
    pub excerpt_lines: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            patch_size_threshold: default_patch_size_threshold(),
            excerpt_lines: default_excerpt_lines(),
        }
    }
}

fn default_patch_size_threshold() -> usize {
    4_000
}

fn default_excerpt_lines() -> usize {
    5
}

/// Where run state is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Secondary summaries are kept only when this is set.
    #[serde(default = "default_summaries_dir")]
    pub summaries_dir: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            cache_dir: default_cache_dir(),
            summaries_dir: default_summaries_dir(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("processed_state.json")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("blog_cache")
}

fn default_summaries_dir() -> Option<PathBuf> {
    Some(PathBuf::from("linkedin_summaries"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishSettings {
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            tags: default_tags(),
            categories: default_categories(),
            status: default_status(),
        }
    }
}

fn default_tags() -> Vec<String> {
    vec!["automated".into(), "github".into(), "gemini".into()]
}

fn default_categories() -> Vec<String> {
    vec!["Development".into()]
}

fn default_status() -> String {
    "publish".to_string()
}

/// Export and deploy stage timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default = "default_export_timeout_secs")]
    pub export_timeout_secs: u64,
    #[serde(default = "default_deploy_message")]
    pub deploy_message: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            export_timeout_secs: default_export_timeout_secs(),
            deploy_message: default_deploy_message(),
        }
    }
}

impl SiteSettings {
    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}

fn default_export_timeout_secs() -> u64 {
    300
}

fn default_deploy_message() -> String {
    "Automated blog update from pipeline".to_string()
}

/// Everything the pipeline needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Case-insensitive regexes; a commit message matching any of them is skipped.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub summarizer: SummarizerSettings,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default)]
    pub site: SiteSettings,
    /// Trailing characters of earlier posts shown to the model as prior output.
    /// `0` leaves prior output out of the prompt.
    #[serde(default = "default_context_window_chars")]
    pub context_window_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
            models: ModelsConfig::default(),
            retry: RetrySettings::default(),
            summarizer: SummarizerSettings::default(),
            state: StateConfig::default(),
            publish: PublishSettings::default(),
            site: SiteSettings::default(),
            context_window_chars: default_context_window_chars(),
        }
    }
}

fn default_ignore_patterns() -> Vec<String> {
    vec![r"\bignore\b".to_string(), r"\[skip blog\]".to_string()]
}

fn default_context_window_chars() -> usize {
    8_000
}

impl PipelineConfig {
    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, settings) in [("content", &self.models.content), ("summary", &self.models.summary)] {
            if settings.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("models.{key}.model is empty")));
            }
            if settings.limits.capacity == 0 || settings.limits.refill_per_minute == 0 {
                return Err(ConfigError::Invalid(format!(
                    "models.{key}: capacity and refill_per_minute must be positive"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        self.ignore_matchers()?;
        Ok(())
    }

    /// Compiles `ignore_patterns`.
    pub fn ignore_matchers(&self) -> Result<Vec<Regex>, ConfigError> {
        self.ignore_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::IgnorePattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect()
    }

    pub fn trace_loaded(&self) {
        info!(
            content_model = %self.models.content.model,
            summary_model = %self.models.summary.model,
            ledger = %self.state.ledger_path.display(),
            cache_dir = %self.state.cache_dir.display(),
            ignore_patterns = self.ignore_patterns.len(),
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
