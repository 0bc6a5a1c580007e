//! Runs real processes, with `sh` standing in for the superuser shell.
#![cfg(unix)]

use pureroot::system::command::{CommandRunner, SuCommandRunner};
use pureroot::system::quote_shell_arg;
use pureroot::PureRootError;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

fn shell() -> SuCommandRunner {
    SuCommandRunner::new("sh").with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let outcome = assert_ok!(shell().run_elevated("echo hello").await);
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.stdout.trim(), "hello");
    assert!(outcome.stderr.is_empty());
}

#[tokio::test]
async fn stderr_only_output_keeps_exit_code() {
    let outcome = assert_ok!(shell().run_elevated("echo oops >&2; exit 4").await);
    assert_eq!(outcome.exit_code, 4);
    assert!(outcome.stdout.is_empty());
    assert_eq!(outcome.stderr.trim(), "oops");
    assert!(!outcome.success());
}

#[tokio::test]
async fn large_output_on_both_streams_does_not_deadlock() {
    let outcome = assert_ok!(
        shell()
            .run_elevated("i=0; while [ $i -lt 20000 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done")
            .await
    );
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.stdout.lines().count(), 20000);
    assert_eq!(outcome.stderr.lines().count(), 20000);
}

#[tokio::test]
async fn quoted_identifier_is_passed_literally() {
    let line = format!("printf '%s' {}", quote_shell_arg("it's; rm -rf /"));
    let outcome = assert_ok!(shell().run_elevated(&line).await);
    assert_eq!(outcome.stdout, "it's; rm -rf /");
}

#[tokio::test]
async fn missing_shell_is_a_spawn_error() {
    let runner = SuCommandRunner::new("/nonexistent/pureroot-su");
    let err = assert_err!(runner.run_elevated("id").await);
    assert!(matches!(err, PureRootError::Spawn(_)), "{:?}", err);
}

#[tokio::test]
async fn hung_command_times_out() {
    let runner = SuCommandRunner::new("sh").with_timeout(Duration::from_millis(300));
    let started = Instant::now();
    let err = assert_err!(runner.run_elevated("sleep 30").await);
    assert!(matches!(err, PureRootError::Timeout(_)), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn run_direct_skips_the_shell() {
    let outcome = assert_ok!(
        shell()
            .run_direct("sh", vec!["-c".to_string(), "echo direct; exit 2".to_string()])
            .await
    );
    assert_eq!(outcome.exit_code, 2);
    assert_eq!(outcome.stdout.trim(), "direct");
}

#[tokio::test]
async fn run_direct_missing_program_is_a_spawn_error() {
    let err = assert_err!(shell().run_direct("/nonexistent/pureroot-which", vec![]).await);
    assert!(matches!(err, PureRootError::Spawn(_)));
}
