use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devlog_core::config::{ModelSettings, ModelsConfig, RetrySettings, SummarizerSettings};
use devlog_core::contract::{
    ChangedFile, GenerationOutcome, GenerationService, MockGenerationService, SourceEvent,
};
use devlog_core::generation::GenerationClient;
use devlog_core::rate_limit::RateLimitSettings;
use devlog_core::summarize::{DiffSummarizer, NO_CHANGES, NO_PATCH};
use tokio::time::Instant;

/// Sleeps per file before answering, so later files finish first.
struct SlowService {
    finished: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl GenerationService for SlowService {
    async fn generate(&self, _model: &str, prompt: &str) -> GenerationOutcome {
        let name = if prompt.contains("`first.rs`") { "first.rs" } else { "second.rs" };
        let delay = if name == "first.rs" { 3 } else { 1 };
        tokio::time::sleep(Duration::from_secs(delay)).await;
        self.finished.lock().unwrap().push(name.to_string());
        GenerationOutcome::Text(format!("- summary of {name}"))
    }

    fn estimate_cost(&self, _model: &str, prompt: &str) -> u64 {
        (prompt.len() as u64).div_ceil(4)
    }
}

fn models() -> ModelsConfig {
    let limits = RateLimitSettings {
        capacity: 1_000_000,
        refill_per_minute: 1_000_000,
        requests_per_minute: 600,
    };
    ModelsConfig {
        content: ModelSettings {
            model: "content-model".into(),
            limits: limits.clone(),
        },
        summary: ModelSettings {
            model: "summary-model".into(),
            limits,
        },
    }
}

fn settings() -> SummarizerSettings {
    SummarizerSettings {
        patch_size_threshold: 100,
        excerpt_lines: 5,
    }
}

fn big_patch() -> String {
    (0..50).map(|i| format!("+let value_{i} = {i};\n")).collect()
}

fn file(name: &str, patch: Option<String>) -> ChangedFile {
    ChangedFile {
        filename: name.into(),
        status: "modified".into(),
        additions: 50,
        deletions: 0,
        patch,
    }
}

fn commit(files: Vec<ChangedFile>) -> SourceEvent {
    SourceEvent {
        id: "0123456789".into(),
        message: "feat: values".into(),
        author: None,
        timestamp: None,
        url: None,
        is_initial: false,
        changed_files: files,
    }
}

#[tokio::test(start_paused = true)]
async fn oversized_patches_are_summarized_concurrently_in_input_order() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let service = SlowService {
        finished: Arc::clone(&finished),
    };
    let client = GenerationClient::new(Arc::new(service), &models(), RetrySettings::default());
    let summarizer = DiffSummarizer::new(client, settings());

    let start = Instant::now();
    let digest = summarizer
        .summarize(&commit(vec![
            file("first.rs", Some(big_patch())),
            file("second.rs", Some(big_patch())),
        ]))
        .await;

    assert_eq!(
        digest,
        "File: first.rs (modified)\n- summary of first.rs\n\nFile: second.rs (modified)\n- summary of second.rs"
    );
    assert_eq!(*finished.lock().unwrap(), vec!["second.rs", "first.rs"]);
    // Overlapping calls: well under the 4s the two sleeps would take in sequence.
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn small_and_missing_patches_stay_local() {
    let mut service = MockGenerationService::new();
    service.expect_generate().never();
    let client = GenerationClient::new(Arc::new(service), &models(), RetrySettings::default());
    let summarizer = DiffSummarizer::new(client, settings());

    let digest = summarizer
        .summarize(&commit(vec![
            file("small.rs", Some("+print('hello')\n-print('goodbye')".into())),
            file("logo.png", None),
        ]))
        .await;
    assert_eq!(
        digest,
        format!("File: small.rs (modified)\n+print('hello')\n-print('goodbye')\n\nFile: logo.png (modified)\n{NO_PATCH}")
    );
}

#[tokio::test(start_paused = true)]
async fn commit_without_files_has_placeholder_digest() {
    let client = GenerationClient::new(
        Arc::new(MockGenerationService::new()),
        &models(),
        RetrySettings::default(),
    );
    let summarizer = DiffSummarizer::new(client, settings());
    assert_eq!(summarizer.summarize(&commit(vec![])).await, NO_CHANGES);
}

#[tokio::test(start_paused = true)]
async fn initial_commit_asks_for_purpose_and_falls_back_to_excerpt_when_empty() {
    let mut service = MockGenerationService::new();
    service.expect_estimate_cost().returning(|_, _| 10);
    service
        .expect_generate()
        .withf(|model, prompt| {
            model.to_string() == "summary-model" && prompt.contains("initial commit of a repository")
        })
        .times(1)
        .returning(|_, _| GenerationOutcome::Text(String::new()));
    let client = GenerationClient::new(Arc::new(service), &models(), RetrySettings::default());
    let summarizer = DiffSummarizer::new(client, settings());

    let mut event = commit(vec![file("lib.rs", Some(big_patch()))]);
    event.is_initial = true;
    let digest = summarizer.summarize(&event).await;

    assert!(digest.starts_with("File: lib.rs (modified)\n+let value_0 = 0;"));
    assert!(digest.ends_with("..."));
}
