//! Publisher backed by the WordPress REST API (`wp-json/wp/v2`).
//!
//! Authenticates with an application password over basic auth. Tag and
//! category names are resolved to term ids, creating missing terms, and the
//! ids are remembered for the rest of the run. Transport errors, `429` and
//! `5xx` responses are retried a bounded number of times with doubling delay;
//! other client errors fail at once.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use devlog_core::contract::{CollaboratorError, NewPost, PublishedPost, Publisher};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Taxonomy {
    Tags,
    Categories,
}

impl Taxonomy {
    fn path(self) -> &'static str {
        match self {
            Taxonomy::Tags => "tags",
            Taxonomy::Categories => "categories",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Term {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: u64,
    #[serde(default)]
    link: Option<String>,
}

pub struct WordPressPublisher {
    http: Client,
    api_base: String,
    username: String,
    app_password: String,
    max_attempts: u32,
    retry_delay: Duration,
    terms: Mutex<HashMap<(Taxonomy, String), u64>>,
}

/// Whether a failed response is worth another attempt.
pub(crate) fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl WordPressPublisher {
    pub fn new(
        http: Client,
        site_url: &str,
        username: &str,
        app_password: &str,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            http,
            api_base: format!("{}/wp-json/wp/v2", site_url.trim_end_matches('/')),
            username: username.to_string(),
            app_password: app_password.to_string(),
            max_attempts: max_attempts.max(1),
            retry_delay,
            terms: Mutex::new(HashMap::new()),
        }
    }

    /// Sends one request with retries, returning the decoded JSON body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, CollaboratorError> {
        let url = format!("{}/{}", self.api_base, path);
        let mut delay = self.retry_delay;
        let mut last_err = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                debug!(attempt, max_attempts = self.max_attempts, delay_ms = delay.as_millis() as u64, url = %url, "Retrying WordPress request");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }

            let mut req = self
                .http
                .request(method.clone(), &url)
                .query(query)
                .basic_auth(&self.username, Some(&self.app_password));
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<Value>().await?);
                    }
                    let text = resp.text().await.unwrap_or_default();
                    if !is_retryable(status) {
                        error!(status = %status, url = %url, "WordPress API returned error. Response body: {text}");
                        return Err(format!("WordPress API error {status}: {text}").into());
                    }
                    warn!(status = %status, url = %url, attempt, "WordPress API unavailable");
                    last_err = format!("HTTP {status}");
                }
                Err(e) => {
                    warn!(error = %e, url = %url, attempt, "WordPress request failed");
                    last_err = e.to_string();
                }
            }
        }
        Err(format!("WordPress request to {url} failed after {} attempts: {last_err}", self.max_attempts).into())
    }

    async fn term_id(&self, taxonomy: Taxonomy, name: &str) -> Result<u64, CollaboratorError> {
        let key = (taxonomy, name.to_lowercase());
        if let Some(id) = self.terms.lock().await.get(&key) {
            return Ok(*id);
        }

        let found = self
            .request(Method::GET, taxonomy.path(), &[("search", name), ("per_page", "100")], None)
            .await?;
        let terms: Vec<Term> = serde_json::from_value(found)?;
        let id = match terms.iter().find(|t| t.name.eq_ignore_ascii_case(name)) {
            Some(term) => term.id,
            None => {
                info!(taxonomy = taxonomy.path(), name, "Creating missing WordPress term");
                let created = self
                    .request(Method::POST, taxonomy.path(), &[], Some(&json!({ "name": name })))
                    .await?;
                let term: Term = serde_json::from_value(created)?;
                term.id
            }
        };
        self.terms.lock().await.insert(key, id);
        Ok(id)
    }

    /// Ids for `names`; a term that cannot be resolved is left off the post.
    async fn term_ids(&self, taxonomy: Taxonomy, names: &[String]) -> Vec<u64> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            match self.term_id(taxonomy, name).await {
                Ok(id) => ids.push(id),
                Err(e) => warn!(taxonomy = taxonomy.path(), name = %name, error = %e, "Could not resolve WordPress term"),
            }
        }
        ids
    }
}

#[async_trait]
impl Publisher for WordPressPublisher {
    async fn publish(&self, post: &NewPost) -> Result<PublishedPost, CollaboratorError> {
        info!(title = %post.title, status = %post.status, "Publishing post to WordPress");
        let tags = self.term_ids(Taxonomy::Tags, &post.tags).await;
        let categories = self.term_ids(Taxonomy::Categories, &post.categories).await;

        let body = json!({
            "title": post.title,
            "content": post.content,
            "status": post.status,
            "tags": tags,
            "categories": categories,
        });
        let created: CreatedPost = serde_json::from_value(self.request(Method::POST, "posts", &[], Some(&body)).await?)?;
        info!(post_id = created.id, link = ?created.link, "WordPress post created");
        Ok(PublishedPost {
            id: created.id.to_string(),
            link: created.link,
        })
    }
}
