use devlog::load_config::{load_config, RunMode, Secrets};
use devlog_core::contract::FetchMode;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn set_required_secrets() {
    env::set_var("GITHUB_TOKEN", "ghp_test");
    env::set_var("GEMINI_API_KEY", "gemini-test");
    env::set_var("WP_USERNAME", "editor");
    env::set_var("WP_APP_PASSWORD", "abcd efgh ijkl");
}

/// A minimal config fills every pipeline setting from defaults.
#[test]
#[serial]
fn minimal_config_uses_defaults() {
    let file = config_file(
        r#"
source:
  repo: octo/app
wordpress:
  url: https://blog.example.com
"#,
    );
    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.source.mode, RunMode::Incremental);
    assert_eq!(config.source.fetch_mode(), FetchMode::Incremental { since_days: 7 });
    assert!(config.notes.is_none());
    assert!(config.site.is_none());
    assert_eq!(config.pipeline.models.content.model, "gemini-1.5-pro");
    assert_eq!(config.pipeline.models.summary.limits.requests_per_minute, 15);
    assert_eq!(config.pipeline.state.ledger_path, PathBuf::from("processed_state.json"));
    assert_eq!(config.wordpress.max_attempts, 3);
}

/// Every section can be spelled out, including the site stage.
#[test]
#[serial]
fn full_config_loads_every_section() {
    let file = config_file(
        r#"
source:
  repo: octo/app
  mode: batch
notes:
  database_id: 0f1e2d3c
gemini:
  request_timeout_secs: 30
pipeline:
  ignore_patterns: ['\[no-post\]']
  context_window_chars: 2000
  models:
    content:
      model: gemini-1.5-flash
      capacity: 250000
      refill_per_minute: 250000
      requests_per_minute: 10
  state:
    ledger_path: state/processed.json
    cache_dir: state/posts
  publish:
    tags: [rust]
    categories: [Engineering]
    status: draft
  site:
    export_timeout_secs: 120
wordpress:
  url: https://blog.example.com
  max_attempts: 5
site:
  export:
    trigger_url: https://blog.example.com/?simply_static_export=1
    export_path: /var/www/static
  deploy:
    repo_url: https://github.com/octo/octo.github.io.git
"#,
    );
    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.source.fetch_mode(), FetchMode::Batch);
    assert_eq!(config.notes.as_ref().unwrap().database_id, "0f1e2d3c");
    assert_eq!(config.notes.as_ref().unwrap().api_url, "https://api.notion.com/v1");
    assert_eq!(config.pipeline.ignore_patterns, vec![r"\[no-post\]".to_string()]);
    assert_eq!(config.pipeline.models.content.limits.capacity, 250_000);
    // Unlisted model keeps its default.
    assert_eq!(config.pipeline.models.summary.model, "gemini-1.5-flash");
    assert_eq!(config.pipeline.publish.status, "draft");
    assert_eq!(config.pipeline.site.export_timeout_secs, 120);
    let site = config.site.expect("site section");
    assert_eq!(site.export.poll_interval_secs, 10);
    assert_eq!(site.deploy.branch, "gh-pages");
}

#[test]
#[serial]
fn invalid_yaml_is_reported_as_parse_error() {
    let file = config_file("not-yaml: [:::");
    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn missing_wordpress_section_fails() {
    let file = config_file("source:\n  repo: octo/app\n");
    assert!(load_config(file.path()).is_err());
}

#[test]
#[serial]
fn malformed_repo_name_fails() {
    let file = config_file("source:\n  repo: just-a-name\nwordpress:\n  url: http://localhost\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("owner/name"));
}

#[test]
#[serial]
fn bad_ignore_pattern_fails_at_load() {
    let file = config_file(
        "source:\n  repo: octo/app\nwordpress:\n  url: http://localhost\npipeline:\n  ignore_patterns: ['(unclosed']\n",
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("ignore pattern"));
}

#[test]
#[serial]
fn secrets_load_from_environment() {
    set_required_secrets();
    env::remove_var("NOTION_TOKEN");

    let secrets = Secrets::from_env(false).expect("all required secrets set");
    assert_eq!(secrets.github_token, "ghp_test");
    assert!(secrets.notion_token.is_none());
    assert!(!format!("{secrets:?}").contains("ghp_test"));

    let err = Secrets::from_env(true).unwrap_err();
    assert!(err.to_string().contains("NOTION_TOKEN"));
}

#[test]
#[serial]
fn missing_secret_is_fatal() {
    set_required_secrets();
    env::remove_var("GEMINI_API_KEY");
    let err = Secrets::from_env(false).unwrap_err();
    assert!(err.to_string().contains("GEMINI_API_KEY"));
}
