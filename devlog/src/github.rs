//! Commit source backed by the GitHub REST API.
//!
//! Lists the repository's commits page by page (newest first, as the API
//! returns them), fetches each commit's detail for its changed files and
//! patches, and hands the events back oldest first. A commit whose detail
//! cannot be fetched is logged and left out; a failed listing fails the fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devlog_core::contract::{ChangedFile, CollaboratorError, EventSource, FetchMode, SourceEvent};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

const PER_PAGE: usize = 100;

pub struct GithubEventSource {
    http: Client,
    api_url: String,
    repo: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CommitSummary {
    sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDetail {
    sha: String,
    commit: CommitInfo,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    parents: Vec<CommitSummary>,
    #[serde(default)]
    files: Vec<FileDetail>,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    message: String,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FileDetail {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    patch: Option<String>,
}

impl From<CommitDetail> for SourceEvent {
    fn from(detail: CommitDetail) -> Self {
        let (author, timestamp) = match detail.commit.author {
            Some(author) => (author.name, author.date),
            None => (None, None),
        };
        SourceEvent {
            id: detail.sha,
            message: detail.commit.message,
            author,
            timestamp,
            url: detail.html_url,
            is_initial: detail.parents.is_empty(),
            changed_files: detail
                .files
                .into_iter()
                .map(|file| ChangedFile {
                    filename: file.filename,
                    status: file.status,
                    additions: file.additions,
                    deletions: file.deletions,
                    patch: file.patch,
                })
                .collect(),
        }
    }
}

impl GithubEventSource {
    pub fn new(http: Client, api_url: &str, repo: &str, token: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollaboratorError> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "devlog")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, url = %url, "GitHub API returned error. Response body: {body}");
            return Err(format!("GitHub API error {status} for {url}").into());
        }
        Ok(resp.json::<T>().await?)
    }

    /// Every commit SHA in the window, newest first.
    async fn list_shas(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, CollaboratorError> {
        let url = format!("{}/repos/{}/commits", self.api_url, self.repo);
        let mut shas = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query = vec![("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            if let Some(since) = since {
                query.push(("since", since.to_rfc3339()));
            }
            let batch: Vec<CommitSummary> = self.get_json(&url, &query).await?;
            let size = batch.len();
            debug!(page, size, "Fetched commit listing page");
            shas.extend(batch.into_iter().map(|c| c.sha));
            if size < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(shas)
    }
}

#[async_trait]
impl EventSource for GithubEventSource {
    async fn fetch_events(&self, mode: FetchMode) -> Result<Vec<SourceEvent>, CollaboratorError> {
        let since = mode.window_start(Utc::now());
        info!(repo = %self.repo, ?mode, ?since, "Fetching GitHub commits");

        let shas = self.list_shas(since).await?;
        let mut events = Vec::with_capacity(shas.len());
        // Oldest first.
        for sha in shas.iter().rev() {
            let url = format!("{}/repos/{}/commits/{}", self.api_url, self.repo, sha);
            match self.get_json::<CommitDetail>(&url, &[]).await {
                Ok(detail) => events.push(SourceEvent::from(detail)),
                Err(e) => {
                    error!(sha = %sha, error = %e, "Failed to fetch commit detail, skipping commit");
                }
            }
        }
        info!(repo = %self.repo, listed = shas.len(), fetched = events.len(), "Fetched GitHub commits");
        Ok(events)
    }
}
