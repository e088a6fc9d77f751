use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

/// Creates a minimal config file for the CLI to read (no notes or site section).
fn create_minimal_config() -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"source:\n  repo: octo/app\n  mode: incremental\n  since_days: 7\nwordpress:\n  url: http://localhost/wordpress\n",
    )
    .expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_run_subcommand() {
    let mut cmd = Command::cargo_bin("devlog").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("run"));
}

#[test]
fn run_help_lists_overrides() {
    let mut cmd = Command::cargo_bin("devlog").expect("Binary exists");
    cmd.args(["run", "--help"]);
    cmd.assert().success().stdout(
        predicate::str::contains("--config")
            .and(predicate::str::contains("--mode"))
            .and(predicate::str::contains("--since-days"))
            .and(predicate::str::contains("--skip-site")),
    );
}

#[test]
fn run_fails_for_missing_config_file() {
    let mut cmd = Command::cargo_bin("devlog").expect("Binary exists");
    cmd.args(["run", "--config", "/definitely/not/here.yaml"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn run_fails_before_fetching_when_secrets_are_missing() {
    let config = create_minimal_config();
    let workdir = tempfile::tempdir().expect("temp dir");
    let mut cmd = Command::cargo_bin("devlog").expect("Binary exists");
    // Run from an empty directory so no .env file is picked up.
    cmd.current_dir(workdir.path())
        .arg("run")
        .arg("--config")
        .arg(config.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("GEMINI_API_KEY")
        .env_remove("WP_USERNAME")
        .env_remove("WP_APP_PASSWORD");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Missing required environment variable"));
    // No state was created: the pipeline never opened its ledger.
    assert!(!workdir.path().join("processed_state.json").exists());
}

#[test]
fn run_rejects_unknown_mode() {
    let config = create_minimal_config();
    let mut cmd = Command::cargo_bin("devlog").expect("Binary exists");
    cmd.arg("run")
        .arg("--config")
        .arg(config.path())
        .args(["--mode", "sometimes"]);
    cmd.assert().failure();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use devlog::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Run {
            config: std::path::PathBuf::from("dummy.yaml"),
            mode: None,
            since_days: None,
            skip_site: false,
        },
    };

    let result = run(cli).await;
    assert!(result.is_err(), "dummy.yaml does not exist");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
