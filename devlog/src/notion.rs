//! Optional enrichment notes from a Notion database.
//!
//! A page becomes a note when its `Commit` rich-text property holds a commit
//! id; the note is keyed by that id's short form. The title property gives the
//! note title, and the text blocks of the page give its content.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devlog_core::contract::{short_id, CollaboratorError, Note, NotesByCommit, NotesSource};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

const NOTION_VERSION: &str = "2022-06-28";
const COMMIT_PROPERTY: &str = "Commit";
const TEXT_BLOCKS: &[&str] = &[
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "quote",
    "to_do",
    "code",
];

pub struct NotionNotesSource {
    http: Client,
    api_url: String,
    database_id: String,
    token: String,
}

/// Concatenated `plain_text` of a rich-text array.
fn plain_text(rich_text: Option<&Value>) -> String {
    rich_text
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// `(short commit id, title)` of a database page, if it names a commit.
pub(crate) fn page_header(page: &Value) -> Option<(String, String)> {
    let properties = page.get("properties")?.as_object()?;
    let commit = plain_text(properties.get(COMMIT_PROPERTY)?.get("rich_text"));
    let commit = commit.trim();
    if commit.is_empty() {
        return None;
    }
    let title = properties
        .values()
        .find(|prop| prop.get("type").and_then(Value::as_str) == Some("title"))
        .map(|prop| plain_text(prop.get("title")))
        .unwrap_or_default();
    Some((short_id(commit).to_string(), title.trim().to_string()))
}

/// Text of the supported blocks in a `blocks/{id}/children` response, one per line.
pub(crate) fn blocks_text(children: &Value) -> String {
    children
        .get("results")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| {
                    let kind = block.get("type")?.as_str()?;
                    if !TEXT_BLOCKS.contains(&kind) {
                        return None;
                    }
                    let text = plain_text(block.get(kind)?.get("rich_text"));
                    (!text.trim().is_empty()).then_some(text)
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

impl NotionNotesSource {
    pub fn new(http: Client, api_url: &str, database_id: &str, token: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            database_id: database_id.to_string(),
            token: token.to_string(),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &str) -> Result<Value, CollaboratorError> {
        let resp = req
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, url = %url, "Notion API returned error. Response body: {body}");
            return Err(format!("Notion API error {status} for {url}").into());
        }
        Ok(resp.json::<Value>().await?)
    }

    async fn query_pages(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Value>, CollaboratorError> {
        let url = format!("{}/databases/{}/query", self.api_url, self.database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "page_size": 100 });
            if let Some(since) = since {
                body["filter"] = json!({
                    "timestamp": "last_edited_time",
                    "last_edited_time": { "on_or_after": since.to_rfc3339() }
                });
            }
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }
            let resp = self.send(self.http.post(&url).json(&body), &url).await?;
            if let Some(results) = resp.get("results").and_then(Value::as_array) {
                pages.extend(results.iter().cloned());
            }
            cursor = match resp.get("has_more").and_then(Value::as_bool) {
                Some(true) => resp.get("next_cursor").and_then(Value::as_str).map(str::to_string),
                _ => None,
            };
            if cursor.is_none() {
                break;
            }
        }
        Ok(pages)
    }

    async fn page_content(&self, page_id: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/blocks/{}/children", self.api_url, page_id);
        let children = self
            .send(self.http.get(&url).query(&[("page_size", "100")]), &url)
            .await?;
        Ok(blocks_text(&children))
    }
}

#[async_trait]
impl NotesSource for NotionNotesSource {
    async fn fetch_notes(&self, since: Option<DateTime<Utc>>) -> Result<NotesByCommit, CollaboratorError> {
        info!(database_id = %self.database_id, ?since, "Fetching Notion notes");
        let pages = self.query_pages(since).await?;

        let mut notes = NotesByCommit::new();
        for page in &pages {
            let Some((commit, title)) = page_header(page) else {
                debug!("Notion page without a commit reference, skipping");
                continue;
            };
            let Some(page_id) = page.get("id").and_then(Value::as_str) else {
                continue;
            };
            let content = match self.page_content(page_id).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(short_id = %commit, error = %e, "Failed to read Notion page content, using title only");
                    String::new()
                }
            };
            notes.insert(commit, Note { title, content });
        }
        info!(pages = pages.len(), notes = notes.len(), "Fetched Notion notes");
        Ok(notes)
    }
}
