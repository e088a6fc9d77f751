//! High-level pipeline: turns commits into published posts, once each.
//!
//! [`Pipeline::run`] walks the events strictly in input order, one at a time:
//!
//! 1. a commit message matching an ignore pattern is skipped,
//! 2. a commit id seen earlier in the same run is skipped,
//! 3. a commit with cached content is replayed into the aggregated context
//!    without generating or publishing anything,
//! 4. a commit already in the [`ProcessedLedger`] is skipped,
//! 5. otherwise the post is generated and passed through the optional
//!    [`Sanitizer`], then its title and secondary summary are generated
//!    concurrently, and the post is published,
//! 6. after a confirmed publish the content is cached, the aggregated context
//!    grows, and the ledger is persisted before the next event starts.
//!
//! The cache is only written after a confirmed publish, so a cache entry
//! always means "published". The ledger is what keeps a commit whose cache
//! entry is gone from being published twice.
//!
//! Per-event failures (empty generation, publish failure) leave the ledger and
//! cache untouched so the commit is retried on a later run. A ledger write
//! that fails after a publish is logged and the run moves on: the cache entry
//! written just before it still marks the commit as published.
//!
//! [`publish_site`] runs the export and deploy collaborators afterwards, and
//! only when at least one post was published.
//!
//! # Navigation
//! - Main entrypoints: [`Pipeline::run`], [`publish_site`]
//! - Supporting types: [`EventOutcome`], [`PipelineReport`], [`SiteOutcome`].

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::cache::ContentCache;
use crate::config::{PipelineConfig, SiteSettings};
use crate::contract::{Deployer, Exporter, NewPost, NotesByCommit, Publisher, Sanitizer, SourceEvent};
use crate::error::PipelineError;
use crate::generation::{GenerationClient, ModelKey};
use crate::ledger::ProcessedLedger;
use crate::prompts::{self, PostInputs};
use crate::summarize::DiffSummarizer;

/// Where an event ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    SkippedIgnored,
    SkippedDuplicate,
    CacheHit,
    /// Primary content came back empty; nothing was persisted.
    Abandoned,
    PublishFailed { reason: String },
    Published { post_id: String },
}

#[derive(Debug, Clone)]
pub struct EventReport {
    pub id: String,
    pub short_id: String,
    pub outcome: EventOutcome,
}

/// Output of one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub events: Vec<EventReport>,
    /// Aggregated context at the end of the run.
    pub context: String,
}

impl PipelineReport {
    pub fn published_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, EventOutcome::Published { .. }))
    }

    pub fn count(&self, pred: impl Fn(&EventOutcome) -> bool) -> usize {
        self.events.iter().filter(|event| pred(&event.outcome)).count()
    }

    pub fn outcome_of(&self, id: &str) -> Option<&EventOutcome> {
        self.events
            .iter()
            .find(|event| event.id == id)
            .map(|event| &event.outcome)
    }
}

/// Run-scoped, append-only record of the posts produced or replayed so far.
#[derive(Debug, Default)]
pub struct AggregatedContext {
    text: String,
}

impl AggregatedContext {
    pub const SEPARATOR: &'static str = "\n\n";

    pub fn append(&mut self, content: &str) {
        if !self.text.is_empty() {
            self.text.push_str(Self::SEPARATOR);
        }
        self.text.push_str(content);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Generated pieces of one post.
struct Draft {
    content: String,
    title: String,
    summary: String,
}

pub struct Pipeline<P: Publisher> {
    config: PipelineConfig,
    ignore: Vec<Regex>,
    generator: GenerationClient,
    summarizer: DiffSummarizer,
    publisher: P,
    ledger: ProcessedLedger,
    cache: ContentCache,
    summaries: Option<ContentCache>,
    sanitizer: Option<Box<dyn Sanitizer>>,
}

impl<P: Publisher> Pipeline<P> {
    /// Validates `config` and opens the ledger and cache directories it names.
    pub fn new(
        config: PipelineConfig,
        generator: GenerationClient,
        publisher: P,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        config.trace_loaded();
        let ignore = config.ignore_matchers()?;
        let ledger = ProcessedLedger::load(&config.state.ledger_path).map_err(PipelineError::State)?;
        let cache = ContentCache::open(&config.state.cache_dir, "md").map_err(PipelineError::State)?;
        let summaries = match &config.state.summaries_dir {
            Some(dir) => Some(ContentCache::open(dir, "txt").map_err(PipelineError::State)?),
            None => None,
        };
        let summarizer = DiffSummarizer::new(generator.clone(), config.summarizer.clone());
        Ok(Self {
            config,
            ignore,
            generator,
            summarizer,
            publisher,
            ledger,
            cache,
            summaries,
            sanitizer: None,
        })
    }

    /// Runs every generated post through `sanitizer` before it is titled,
    /// published, cached or added to the context.
    pub fn with_sanitizer(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.sanitizer = Some(Box::new(sanitizer));
        self
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Processes `events` in order. `notes` are matched by short commit id.
    pub async fn run(
        &mut self,
        events: &[SourceEvent],
        notes: &NotesByCommit,
    ) -> PipelineReport {
        info!(events = events.len(), notes = notes.len(), "[PIPELINE] Starting run");
        let mut context = AggregatedContext::default();
        let mut seen = HashSet::new();
        let mut reports = Vec::with_capacity(events.len());

        for event in events {
            let outcome = self.process_event(event, notes, &mut seen, &mut context).await;
            reports.push(EventReport {
                id: event.id.clone(),
                short_id: event.short_id().to_string(),
                outcome,
            });
        }

        let report = PipelineReport {
            events: reports,
            context: context.into_string(),
        };
        info!(
            published = report.published_count(),
            cached = report.count(|o| *o == EventOutcome::CacheHit),
            failed = report.count(|o| matches!(o, EventOutcome::PublishFailed { .. } | EventOutcome::Abandoned)),
            "[PIPELINE] Run finished"
        );
        report
    }

    fn is_ignored(&self, event: &SourceEvent) -> bool {
        self.ignore.iter().any(|re| re.is_match(&event.message))
    }

    async fn process_event(
        &mut self,
        event: &SourceEvent,
        notes: &NotesByCommit,
        seen: &mut HashSet<String>,
        context: &mut AggregatedContext,
    ) -> EventOutcome {
        let short_id = event.short_id();
        info!(short_id, headline = event.headline(), "[PIPELINE] Processing commit");

        if self.is_ignored(event) {
            info!(short_id, "[PIPELINE] Commit matches an ignore pattern, skipping");
            return EventOutcome::SkippedIgnored;
        }

        if !seen.insert(event.id.clone()) {
            debug!(short_id, "[PIPELINE] Commit already handled in this run, skipping");
            return EventOutcome::SkippedDuplicate;
        }

        match self.cache.get(short_id) {
            Ok(Some(cached)) => {
                if self.ledger.contains(&event.id) {
                    info!(short_id, "[PIPELINE] Replaying cached post as context");
                } else {
                    warn!(
                        short_id,
                        "[PIPELINE] Cached post has no ledger entry, replaying it as context only"
                    );
                }
                context.append(&cached);
                return EventOutcome::CacheHit;
            }
            Ok(None) => {}
            Err(e) => {
                // Unreadable entry: the ledger check below still guards against republishing.
                warn!(short_id, error = %e, "[PIPELINE] Failed to read cache entry");
            }
        }

        if self.ledger.contains(&event.id) {
            debug!(short_id, "[PIPELINE] Already in processed ledger, skipping");
            return EventOutcome::SkippedDuplicate;
        }

        let Some(draft) = self.draft(event, notes, context.as_str()).await else {
            warn!(short_id, "[PIPELINE] Empty post generated, leaving commit for a later run");
            return EventOutcome::Abandoned;
        };

        let post = NewPost {
            title: draft.title.clone(),
            content: draft.content.clone(),
            tags: self.config.publish.tags.clone(),
            categories: self.config.publish.categories.clone(),
            status: self.config.publish.status.clone(),
        };
        let published = match self.publisher.publish(&post).await {
            Ok(published) => published,
            Err(e) => {
                error!(short_id, error = %e, "[PIPELINE][ERROR] Publish failed");
                return EventOutcome::PublishFailed {
                    reason: e.to_string(),
                };
            }
        };
        info!(short_id, post_id = %published.id, title = %draft.title, "[PIPELINE] Published post");

        self.commit(event, &draft, context);
        EventOutcome::Published {
            post_id: published.id,
        }
    }

    /// Generates the post, then its title and secondary summary side by side.
    async fn draft(&self, event: &SourceEvent, notes: &NotesByCommit, prior: &str) -> Option<Draft> {
        let short_id = event.short_id();
        let diff_summary = self.summarizer.summarize(event).await;
        let note = notes
            .get(short_id)
            .map(|note| format!("{}\n\n{}", note.title, note.content))
            .unwrap_or_default();
        if !note.is_empty() {
            debug!(short_id, "[PIPELINE] Using matched note");
        }
        let inputs = PostInputs {
            commit_message: &event.message,
            diff_summary: &diff_summary,
            note: &note,
        };

        let prior = prompts::context_tail(prior, self.config.context_window_chars);
        let content = self
            .generator
            .generate(ModelKey::Content, &prompts::blog_post(&inputs, prior))
            .await;
        let content = match &self.sanitizer {
            Some(sanitizer) if !content.trim().is_empty() => {
                let cleaned = sanitizer.sanitize(&content);
                debug!(short_id, before = content.len(), after = cleaned.len(), "[PIPELINE] Sanitized post");
                cleaned
            }
            _ => content,
        };
        if content.trim().is_empty() {
            return None;
        }

        let title_prompt = prompts::title_candidates(&event.message, &content);
        let summary_prompt = prompts::secondary_summary(&inputs);
        let (raw_title, summary) = tokio::join!(
            self.generator.generate(ModelKey::Content, &title_prompt),
            self.generator.generate(ModelKey::Content, &summary_prompt),
        );

        let title = prompts::pick_title(&raw_title).unwrap_or_else(|| {
            let headline = event.headline();
            warn!(short_id, "[PIPELINE] No usable title generated, using commit headline");
            if headline.is_empty() {
                prompts::DEFAULT_TITLE.to_string()
            } else {
                headline.to_string()
            }
        });

        Some(Draft {
            content,
            title,
            summary,
        })
    }

    /// Persists a confirmed publish: cache, context, ledger, then the side file.
    fn commit(
        &mut self,
        event: &SourceEvent,
        draft: &Draft,
        context: &mut AggregatedContext,
    ) {
        let short_id = event.short_id();
        if let Err(e) = self.cache.put(short_id, &draft.content) {
            error!(short_id, error = %e, "[PIPELINE][ERROR] Failed to cache published post");
        }
        context.append(&draft.content);

        if let Err(e) = self.ledger.record(&event.id) {
            error!(
                short_id,
                id = %event.id,
                error = %e,
                "[PIPELINE][ERROR] Failed to record published commit in the processed ledger"
            );
        }

        if let Some(summaries) = &self.summaries {
            if draft.summary.trim().is_empty() {
                debug!(short_id, "[PIPELINE] No secondary summary to keep");
            } else if let Err(e) = summaries.put(short_id, &draft.summary) {
                warn!(short_id, error = %e, "[PIPELINE] Failed to write secondary summary");
            }
        }
    }
}

/// How the export/deploy stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteOutcome {
    /// Nothing was published, so nothing was exported.
    Skipped,
    ExportNotTriggered,
    ExportTimedOut,
    DeployFailed,
    Deployed,
}

/// Exports and deploys the site when the run published anything.
pub async fn publish_site<E, D>(
    report: &PipelineReport,
    exporter: &E,
    deployer: &D,
    settings: &SiteSettings,
) -> SiteOutcome
where
    E: Exporter + ?Sized,
    D: Deployer + ?Sized,
{
    if report.published_count() == 0 {
        info!("[SITE] No posts published this run, skipping export and deploy");
        return SiteOutcome::Skipped;
    }

    info!(published = report.published_count(), "[SITE] Triggering static export");
    if !exporter.trigger_export().await {
        error!("[SITE][ERROR] Failed to trigger static export");
        return SiteOutcome::ExportNotTriggered;
    }
    if !exporter.wait_for_export_ready(settings.export_timeout()).await {
        error!(timeout_secs = settings.export_timeout_secs, "[SITE][ERROR] Static export did not complete in time");
        return SiteOutcome::ExportTimedOut;
    }
    if !deployer.deploy(&settings.deploy_message).await {
        error!("[SITE][ERROR] Deploy failed");
        return SiteOutcome::DeployFailed;
    }
    info!("[SITE] Static site deployed");
    SiteOutcome::Deployed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_joins_entries_with_blank_line() {
        let mut context = AggregatedContext::default();
        assert_eq!(context.as_str(), "");
        context.append("first");
        context.append("second");
        assert_eq!(context.into_string(), "first\n\nsecond");
    }

    #[test]
    fn report_counts_outcomes() {
        let event = |id: &str, outcome| EventReport {
            id: id.into(),
            short_id: id.into(),
            outcome,
        };
        let report = PipelineReport {
            events: vec![
                event("a", EventOutcome::Published { post_id: "1".into() }),
                event("b", EventOutcome::CacheHit),
                event("c", EventOutcome::Published { post_id: "2".into() }),
            ],
            context: String::new(),
        };
        assert_eq!(report.published_count(), 2);
        assert_eq!(report.outcome_of("b"), Some(&EventOutcome::CacheHit));
        assert_eq!(report.outcome_of("z"), None);
    }
}
