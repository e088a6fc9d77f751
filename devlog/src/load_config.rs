/// `load_config` module: Loads the static YAML run configuration and the secrets the adapters need from the environment.
///
/// This module is the only place where user-supplied YAML is parsed and mapped to typed structs.
///
/// # Responsibilities
/// - Parse the config file into [`CliConfig`]: source repository and run mode, optional notes
///   database, pipeline settings (models, limits, state paths, ignore patterns), the
///   publishing endpoint and the optional static-site stage.
/// - Validate pipeline settings up front so a bad pattern or limit fails before any fetch.
/// - Read secrets ([`Secrets::from_env`]) from the environment only; the YAML never holds them.
///
/// # Errors
/// All errors use `anyhow::Error` for context-rich diagnostics, surfaced at the CLI boundary.
/// Any failure here is fatal for the run.
use anyhow::{anyhow, Context, Result};
use devlog_core::config::PipelineConfig;
use devlog_core::contract::FetchMode;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub source: SourceSection,
    #[serde(default)]
    pub notes: Option<NotesSection>,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub wordpress: WordPressSection,
    /// Static export and deploy; both halves or neither.
    #[serde(default)]
    pub site: Option<SiteSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Full history.
    Batch,
    /// Commits from the last `since_days` days.
    Incremental,
}

#[derive(Debug, Deserialize)]
pub struct SourceSection {
    /// `owner/name` of the GitHub repository.
    pub repo: String,
    #[serde(default = "default_mode")]
    pub mode: RunMode,
    #[serde(default = "default_since_days")]
    pub since_days: u32,
    #[serde(default = "default_github_api")]
    pub api_url: String,
}

impl SourceSection {
    pub fn fetch_mode(&self) -> FetchMode {
        match self.mode {
            RunMode::Batch => FetchMode::Batch,
            RunMode::Incremental => FetchMode::Incremental {
                since_days: self.since_days,
            },
        }
    }
}

fn default_mode() -> RunMode {
    RunMode::Incremental
}

fn default_since_days() -> u32 {
    7
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Deserialize)]
pub struct NotesSection {
    pub database_id: String,
    #[serde(default = "default_notion_api")]
    pub api_url: String,
}

fn default_notion_api() -> String {
    "https://api.notion.com/v1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct GeminiSection {
    #[serde(default = "default_gemini_api")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            api_url: default_gemini_api(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GeminiSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_gemini_api() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize)]
pub struct WordPressSection {
    /// Site root, e.g. `https://blog.example.com`.
    pub url: String,
    #[serde(default = "default_publish_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_publish_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_publish_attempts() -> u32 {
    3
}

fn default_publish_retry_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize)]
pub struct SiteSection {
    pub export: ExportSection,
    pub deploy: DeploySection,
}

#[derive(Debug, Deserialize)]
pub struct ExportSection {
    pub trigger_url: String,
    /// Directory the export plugin writes into; also the deploy working tree.
    pub export_path: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct DeploySection {
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "gh-pages".to_string()
}

/// Credentials read from the environment.
pub struct Secrets {
    pub github_token: String,
    pub gemini_api_key: String,
    pub wp_username: String,
    pub wp_app_password: String,
    pub notion_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &"<redacted>")
            .field("gemini_api_key", &"<redacted>")
            .field("wp_username", &self.wp_username)
            .field("wp_app_password", &"<redacted>")
            .field("notion_token", &self.notion_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Secrets {
    /// Reads every required secret, failing on the first one missing.
    /// `NOTION_TOKEN` is required only when `with_notes` is set.
    pub fn from_env(with_notes: bool) -> Result<Self> {
        let secrets = Self {
            github_token: required("GITHUB_TOKEN")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            wp_username: required("WP_USERNAME")?,
            wp_app_password: required("WP_APP_PASSWORD")?,
            notion_token: if with_notes {
                Some(required("NOTION_TOKEN")?)
            } else {
                None
            },
        };
        info!(notes = with_notes, "Secrets loaded from environment");
        Ok(secrets)
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            error!(variable = name, "Required secret missing from environment");
            Err(anyhow!("Missing required environment variable {name}"))
        }
    }
}

/// Loads and validates the YAML config at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let config: CliConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, repo = %config.source.repo, "Parsed config YAML successfully");

    if config.source.repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
        return Err(anyhow!(
            "source.repo must be in owner/name form, got '{}'",
            config.source.repo
        ));
    }
    if config.wordpress.max_attempts == 0 {
        return Err(anyhow!("wordpress.max_attempts must be at least 1"));
    }
    config
        .pipeline
        .validate()
        .context("Invalid pipeline section")?;

    Ok(config)
}
