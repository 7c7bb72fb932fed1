#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use procman_core::runner::{self, RunOutcome};
use procman_core::StateCell;
use procman_types::{JobDescriptor, JobState, JobType};
use tokio_util::sync::CancellationToken;

fn temp_logs_root(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("procman-runner-{tag}-{nanos}"))
}

fn descriptor(name: &str, command: &str) -> JobDescriptor {
    JobDescriptor {
        name: name.to_owned(),
        command: command.to_owned(),
        job_type: JobType::OneTime,
        schedule: String::new(),
    }
}

async fn run_once(
    descriptor: &JobDescriptor,
    logs_root: &Path,
    cancel: &CancellationToken,
) -> (RunOutcome, PathBuf) {
    tokio::fs::create_dir_all(logs_root.join(&descriptor.name))
        .await
        .unwrap();
    let log_path = runner::attempt_log_path(logs_root, &descriptor.name);
    let state = StateCell::default();
    let outcome = runner::run(descriptor, &log_path, &state, cancel)
        .await
        .unwrap();
    (outcome, log_path)
}

#[tokio::test]
async fn echo_exits_zero_and_logs_stdout() {
    let logs_root = temp_logs_root("echo");
    let job = descriptor("echo", "/bin/echo hi");

    let (outcome, log_path) = run_once(&job, &logs_root, &CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Exited(0));
    let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
    assert_eq!(contents, "hi\n");
}

#[tokio::test]
async fn multi_line_output_is_logged_in_order() {
    let logs_root = temp_logs_root("seq");
    let job = descriptor("seq", "/usr/bin/seq 1 3");

    let (outcome, log_path) = run_once(&job, &logs_root, &CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Exited(0));
    let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
    assert_eq!(contents, "1\n2\n3\n");
}

#[tokio::test]
async fn unterminated_final_line_gets_a_newline() {
    let logs_root = temp_logs_root("printf");
    let job = descriptor("printf", "/usr/bin/printf abc");

    let (outcome, log_path) = run_once(&job, &logs_root, &CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Exited(0));
    let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
    assert_eq!(contents, "abc\n");
}

#[tokio::test]
async fn nonzero_exit_code_is_reported() {
    let logs_root = temp_logs_root("false");
    let job = descriptor("false", "/bin/false");

    let (outcome, _) = run_once(&job, &logs_root, &CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Exited(1));
}

#[tokio::test]
async fn missing_executable_is_start_failed() {
    let logs_root = temp_logs_root("missing");
    let job = descriptor("missing", "/no/such/binary --flag");

    let (outcome, _) = run_once(&job, &logs_root, &CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::StartFailed);
}

#[tokio::test]
async fn empty_command_is_start_failed() {
    let logs_root = temp_logs_root("empty");
    let job = descriptor("empty", "");

    let (outcome, _) = run_once(&job, &logs_root, &CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::StartFailed);
}

#[tokio::test]
async fn cancel_terminates_and_reaps_the_child() {
    let logs_root = temp_logs_root("cancel");
    let job = descriptor("sleep", "/bin/sleep 30");
    tokio::fs::create_dir_all(logs_root.join(&job.name))
        .await
        .unwrap();
    let log_path = runner::attempt_log_path(&logs_root, &job.name);

    let state = StateCell::default();
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let run = tokio::spawn({
        let job = job.clone();
        let state = state.clone();
        let cancel = cancel.clone();
        async move { runner::run(&job, &log_path, &state, &cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.get(), JobState::Running);
    cancel.cancel();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn existing_log_file_is_truncated() {
    let logs_root = temp_logs_root("truncate");
    let job = descriptor("echo", "/bin/echo fresh");
    tokio::fs::create_dir_all(logs_root.join(&job.name))
        .await
        .unwrap();
    let log_path = runner::attempt_log_path(&logs_root, &job.name);
    tokio::fs::write(&log_path, "stale contents from a previous run\n")
        .await
        .unwrap();

    let state = StateCell::default();
    let outcome = runner::run(&job, &log_path, &state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Exited(0));
    let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
    assert_eq!(contents, "fresh\n");
}
