//! Bounded text digest of the files a commit changed.
//!
//! Small patches are excerpted locally. Patches over the size threshold are
//! summarized by the generation service under [`ModelKey::Summary`]; all such
//! calls for one commit run concurrently and the digest keeps the input file
//! order regardless of which call finishes first.

use futures::future::join_all;
use tracing::{debug, info};

use crate::config::SummarizerSettings;
use crate::contract::{ChangedFile, SourceEvent};
use crate::generation::{GenerationClient, ModelKey};
use crate::prompts;

pub const NO_CHANGES: &str = "No significant code changes detected.";
pub const NO_PATCH: &str = "(no patch content available)";

/// Keeps added, removed and context lines (minus the `+++`/`---` headers),
/// truncated to `max_lines` with a trailing `...` when cut.
pub fn excerpt_patch(patch: &str, max_lines: usize) -> String {
    let relevant: Vec<&str> = patch
        .lines()
        .filter(|line| line.starts_with(['+', '-', ' ']))
        .filter(|line| !line.starts_with("+++") && !line.starts_with("---"))
        .collect();
    let mut excerpt = relevant
        .iter()
        .take(max_lines)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if relevant.len() > max_lines {
        excerpt.push_str("...");
    }
    excerpt
}

#[derive(Clone)]
pub struct DiffSummarizer {
    client: GenerationClient,
    settings: SummarizerSettings,
}

impl DiffSummarizer {
    pub fn new(client: GenerationClient, settings: SummarizerSettings) -> Self {
        Self { client, settings }
    }

    /// Digest of every changed file in `event`, in input order.
    pub async fn summarize(&self, event: &SourceEvent) -> String {
        if event.changed_files.is_empty() {
            return NO_CHANGES.to_string();
        }

        let remote = event
            .changed_files
            .iter()
            .filter(|file| self.is_oversized(file))
            .count();
        if remote > 0 {
            info!(
                short_id = event.short_id(),
                files = event.changed_files.len(),
                remote,
                "Summarizing oversized patches"
            );
        }

        let sections = join_all(
            event
                .changed_files
                .iter()
                .map(|file| self.summarize_file(file, event.is_initial)),
        )
        .await;
        sections.join("\n\n")
    }

    fn is_oversized(&self, file: &ChangedFile) -> bool {
        file.patch
            .as_deref()
            .is_some_and(|patch| patch.chars().count() > self.settings.patch_size_threshold)
    }

    async fn summarize_file(&self, file: &ChangedFile, is_initial: bool) -> String {
        let header = format!("File: {} ({})", file.filename, file.status);
        let patch = match file.patch.as_deref() {
            Some(patch) if !patch.trim().is_empty() => patch,
            _ => return format!("{header}\n{NO_PATCH}"),
        };

        if !self.is_oversized(file) {
            return format!("{header}\n{}", excerpt_patch(patch, self.settings.excerpt_lines));
        }

        let prompt = if is_initial {
            prompts::diff_purpose_summary(&file.filename, patch)
        } else {
            prompts::diff_change_summary(&file.filename, &file.status, patch)
        };
        let summary = self.client.generate(ModelKey::Summary, &prompt).await;
        if summary.trim().is_empty() {
            debug!(file = %file.filename, "Remote summary empty, using local excerpt");
            return format!("{header}\n{}", excerpt_patch(patch, self.settings.excerpt_lines));
        }
        format!("{header}\n{}", summary.trim())
    }
}
