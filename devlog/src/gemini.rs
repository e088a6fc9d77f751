//! Generation service backed by the Gemini `generateContent` endpoint.
//!
//! The adapter makes exactly one HTTP call per [`GenerationService::generate`]
//! and classifies the response; budgeting, spacing and retries stay in
//! [`devlog_core::generation::GenerationClient`].

use async_trait::async_trait;
use devlog_core::contract::{GenerationOutcome, GenerationService};
use devlog_core::generation::estimate_tokens;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

pub struct GeminiService {
    http: Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Maps a decoded response onto a [`GenerationOutcome`].
///
/// A prompt-level block wins over everything else. Otherwise the first
/// candidate decides: any finish reason other than `STOP` is an early stop,
/// and a candidate without text is malformed.
pub(crate) fn classify(response: GenerateResponse) -> GenerationOutcome {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return GenerationOutcome::Blocked { reason };
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return GenerationOutcome::Malformed("response has no candidates".into());
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    match candidate.finish_reason.as_deref() {
        Some(reason) if reason != "STOP" => GenerationOutcome::Stopped {
            reason: reason.to_string(),
            partial: (!text.is_empty()).then_some(text),
        },
        _ if text.trim().is_empty() => GenerationOutcome::Malformed("candidate has no text".into()),
        _ => GenerationOutcome::Text(text),
    }
}

impl GeminiService {
    pub fn new(http: Client, api_url: &str, api_key: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl GenerationService for GeminiService {
    async fn generate(&self, model: &str, prompt: &str) -> GenerationOutcome {
        let url = format!("{}/models/{}:generateContent", self.api_url, model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        let resp = match self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!(model, error = ?e, "Gemini request failed");
                return GenerationOutcome::Error(e.to_string());
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(model, status = %status, "Gemini API returned error. Response body: {text}");
            return GenerationOutcome::Error(format!("HTTP {status}"));
        }

        match resp.json::<GenerateResponse>().await {
            Ok(decoded) => {
                let outcome = classify(decoded);
                if let GenerationOutcome::Text(text) = &outcome {
                    debug!(model, chars = text.len(), "Gemini returned text");
                }
                outcome
            }
            Err(e) => GenerationOutcome::Malformed(format!("undecodable response: {e}")),
        }
    }

    fn estimate_cost(&self, _model: &str, prompt: &str) -> u64 {
        estimate_tokens(prompt)
    }
}
