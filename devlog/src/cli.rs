/// # devlog CLI Interface (Module)
///
/// Command parsing and orchestration glue for the `devlog` binary.
///
/// All pipeline logic (rate limiting, generation, summarizing, ledger and cache)
/// lives in the [`devlog-core`] crate. This module loads the config, builds the
/// HTTP and process adapters, and wires them into the core pipeline.
///
/// ## How To Use
/// - For command-line users: use the installed `devlog` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`devlog-core`]: ../../devlog_core/
use crate::deploy::GitPagesDeployer;
use crate::export::SimplyStaticExporter;
use crate::gemini::GeminiService;
use crate::github::GithubEventSource;
use crate::load_config::{load_config, CliConfig, RunMode, Secrets};
use crate::notion::NotionNotesSource;
use crate::sanitize::HtmlSanitizer;
use crate::wordpress::WordPressPublisher;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use devlog_core::contract::{EventSource, NotesByCommit, NotesSource};
use devlog_core::generation::GenerationClient;
use devlog_core::pipeline::{publish_site, Pipeline, SiteOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI for devlog: turn repository commits into published blog posts.
#[derive(Parser)]
#[clap(
    name = "devlog",
    version,
    about = "Turn repository commits into published blog posts, once per commit"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch commits, generate and publish posts, then export and deploy the site
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override the configured fetch mode
        #[clap(long, value_enum)]
        mode: Option<RunMode>,
        /// Override the incremental lookback window, in days
        #[clap(long)]
        since_days: Option<u32>,
        /// Publish posts but skip the export and deploy stage
        #[clap(long)]
        skip_site: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            mode,
            since_days,
            skip_site,
        } => {
            let mut config = load_config(config)?;
            if let Some(mode) = mode {
                config.source.mode = mode;
            }
            if let Some(days) = since_days {
                config.source.since_days = days;
            }
            let secrets = Secrets::from_env(config.notes.is_some())?;
            tracing::info!(command = "run", repo = %config.source.repo, mode = ?config.source.mode, "Starting pipeline run");
            run_pipeline(config, secrets, skip_site).await
        }
    }
}

async fn run_pipeline(config: CliConfig, secrets: Secrets, skip_site: bool) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(config.gemini.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let fetch_mode = config.source.fetch_mode();
    let source = GithubEventSource::new(
        http.clone(),
        &config.source.api_url,
        &config.source.repo,
        &secrets.github_token,
    );
    let events = source
        .fetch_events(fetch_mode)
        .await
        .map_err(|e| anyhow!("Failed to fetch commits: {e}"))?;

    let notes = match (&config.notes, &secrets.notion_token) {
        (Some(section), Some(token)) => {
            let notes_source = NotionNotesSource::new(http.clone(), &section.api_url, &section.database_id, token);
            match notes_source.fetch_notes(fetch_mode.window_start(Utc::now())).await {
                Ok(notes) => notes,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch notes, continuing without them");
                    NotesByCommit::new()
                }
            }
        }
        _ => NotesByCommit::new(),
    };

    let service = Arc::new(GeminiService::new(http.clone(), &config.gemini.api_url, &secrets.gemini_api_key));
    let generator = GenerationClient::new(service, &config.pipeline.models, config.pipeline.retry.clone());
    let publisher = WordPressPublisher::new(
        http.clone(),
        &config.wordpress.url,
        &secrets.wp_username,
        &secrets.wp_app_password,
        config.wordpress.max_attempts,
        Duration::from_millis(config.wordpress.retry_delay_ms),
    );

    let site_settings = config.pipeline.site.clone();
    let mut pipeline = Pipeline::new(config.pipeline, generator, publisher)?.with_sanitizer(HtmlSanitizer::new());
    let report = pipeline.run(&events, &notes).await;
    tracing::info!(
        command = "run",
        events = report.events.len(),
        published = report.published_count(),
        "Pipeline run complete"
    );

    match (&config.site, skip_site) {
        (_, true) => tracing::info!("Site stage skipped by --skip-site"),
        (None, false) => tracing::info!("No site section configured, skipping export and deploy"),
        (Some(site), false) => {
            let exporter = SimplyStaticExporter::new(
                http,
                &site.export.trigger_url,
                &site.export.export_path,
                Duration::from_secs(site.export.poll_interval_secs),
            );
            let deployer = GitPagesDeployer::new(&site.export.export_path, &site.deploy.repo_url, &site.deploy.branch);
            let outcome = publish_site(&report, &exporter, &deployer, &site_settings).await;
            match outcome {
                SiteOutcome::Deployed | SiteOutcome::Skipped => {
                    tracing::info!(?outcome, "Site stage finished")
                }
                _ => tracing::error!(?outcome, "Site stage failed, published posts are unaffected"),
            }
        }
    }
    Ok(())
}
