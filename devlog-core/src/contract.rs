//! # contract: interfaces to everything outside the pipeline
//!
//! The orchestrator talks to seven collaborators, each behind one trait:
//!
//! | trait | role |
//! |-------|------|
//! | [`EventSource`] | commits from the version-control host |
//! | [`NotesSource`] | optional notes keyed by short commit id |
//! | [`GenerationService`] | the quota-limited text generation API |
//! | [`Publisher`] | the content-management endpoint |
//! | [`Exporter`] | static-site export trigger and readiness check |
//! | [`Deployer`] | pushes exported files to the hosting branch |
//! | [`Sanitizer`] | cleans generated markup before it is kept or published |
//!
//! All async methods use `async_trait`. Fallible collaborator calls return a
//! boxed error ([`CollaboratorError`]); the generation service instead returns
//! a tagged [`GenerationOutcome`] so callers can branch on the failure kind.
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the mocks are exported under the
//! `test-export-mocks` feature so integration tests can drive the pipeline
//! without any network access.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::{Deserialize, Serialize};

/// Boxed error returned by collaborator calls.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Number of leading characters of a commit id used as its short form.
pub const SHORT_ID_LEN: usize = 7;

/// Returns the short form of a commit id (first seven characters).
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// One changed file within a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    /// Host-reported status such as `added`, `modified`, `removed`.
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    /// Unified diff text, absent for binary or oversized files.
    #[serde(default)]
    pub patch: Option<String>,
}

/// A source event: one commit and the files it touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    /// Full commit SHA.
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
    /// True for a root commit (no parents), i.e. the whole repository being added.
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub changed_files: Vec<ChangedFile>,
}

impl SourceEvent {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// First line of the commit message.
    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// Which commits to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FetchMode {
    /// Full history.
    Batch,
    /// Only commits from the last `since_days` days.
    Incremental { since_days: u32 },
}

impl FetchMode {
    /// Start of the lookback window relative to `now`, if the mode has one.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            FetchMode::Batch => None,
            FetchMode::Incremental { since_days } => {
                Some(now - chrono::Duration::days(i64::from(*since_days)))
            }
        }
    }
}

/// Enrichment note matched to a commit by short id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
}

/// Notes keyed by short commit id.
pub type NotesByCommit = HashMap<String, Note>;

/// Result of one call to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Generated text.
    Text(String),
    /// The service refused the prompt content.
    Blocked { reason: String },
    /// Generation stopped early (length, safety, recitation...).
    Stopped {
        reason: String,
        partial: Option<String>,
    },
    /// The response could not be interpreted or carried no text.
    Malformed(String),
    /// Transport or service failure.
    Error(String),
}

/// A post ready for publishing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub title: String,
    /// Post body, passed through as HTML-ready markup.
    pub content: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    /// Publish status, e.g. `publish` or `draft`.
    pub status: String,
}

/// Identifier returned by the content-management endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Fetches commits from the version-control host.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Commits in the window, ordered oldest first.
    async fn fetch_events(&self, mode: FetchMode) -> Result<Vec<SourceEvent>, CollaboratorError>;
}

/// Fetches optional enrichment notes.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait NotesSource: Send + Sync {
    /// Notes edited since `since` (all notes when `None`), keyed by short commit id.
    async fn fetch_notes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<NotesByCommit, CollaboratorError>;
}

/// The external text generation service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Runs one generation call against `model`.
    async fn generate(&self, model: &str, prompt: &str) -> GenerationOutcome;

    /// Estimated cost of `prompt` in budget units for `model`.
    fn estimate_cost(&self, model: &str, prompt: &str) -> u64;
}

/// Publishes finished posts. Implementations retry transient failures themselves.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &NewPost) -> Result<PublishedPost, CollaboratorError>;
}

/// Triggers and watches the static-site export.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Starts an export; `false` when the trigger was not accepted.
    async fn trigger_export(&self) -> bool;

    /// Waits until exported files are in place or `timeout` passes.
    async fn wait_for_export_ready(&self, timeout: std::time::Duration) -> bool;
}

/// Pushes the exported site to its hosting branch.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, message: &str) -> bool;
}

/// Cleans generated post content. Must not fail: on trouble return the input.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, content: &str) -> String;
}
