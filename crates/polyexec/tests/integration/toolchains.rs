//! End-to-end runs against real toolchains
//!
//! Whether a toolchain is installed is decided by running its version command
//! with the host environment, independently of the runner. Tests for tools
//! the host lacks pass trivially; tools the host has must be reported
//! available and must run.

use std::process::Stdio;
use std::time::Duration;

use polyexec::config::Config;
use polyexec::runner::Runner;
use polyexec::types::{ExecutionRequest, ExecutionResponse, OutcomePhase};
use tempfile::TempDir;

use super::{fixture_source, leftover_workspaces};

fn default_runner() -> (Runner, TempDir) {
    let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
    let mut config = Config::default();
    config.scratch_root = scratch.path().join("scratch");
    (Runner::new(config), scratch)
}

/// Whether the language's version command succeeds with the host environment
async fn host_has_toolchain(runner: &Runner, language: &str) -> bool {
    let Some(argv) = runner.language(language).expect("known language").probe_command() else {
        return true;
    };
    let Some((program, args)) = argv.split_first() else {
        return false;
    };

    let status = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();
    matches!(
        tokio::time::timeout(Duration::from_secs(30), status).await,
        Ok(Ok(status)) if status.success()
    )
}

/// Skip when the host lacks the toolchain, otherwise require the runner to see it
async fn require_toolchain(runner: &Runner, language: &str) -> bool {
    if !host_has_toolchain(runner, language).await {
        eprintln!("skipping: {language} toolchain not installed");
        return false;
    }
    assert!(
        runner.is_available(language).await.expect("known language"),
        "{language} toolchain works on the host but the runner reports it missing"
    );
    true
}

/// Run a fixture, or return `None` when the host lacks the toolchain
async fn run_fixture(
    runner: &Runner,
    language: &str,
    fixture: &str,
    input: Option<&str>,
) -> Option<ExecutionResponse> {
    if !require_toolchain(runner, language).await {
        return None;
    }

    let mut request = ExecutionRequest::new(language, fixture_source(fixture));
    if let Some(input) = input {
        request = request.with_input(input);
    }
    let response = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(leftover_workspaces(runner), 0);
    Some(response)
}

#[tokio::test]
async fn test_availability_matches_host() {
    let (runner, _scratch) = default_runner();
    for id in runner.config().language_ids() {
        require_toolchain(&runner, id).await;
    }
}

#[tokio::test]
async fn test_python_hello() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "python", "hello.py", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
    assert_eq!(response.error, None);
}

#[tokio::test]
async fn test_python_stdin() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "python", "echo.py", Some("one\ntwo\n")).await
    else {
        return;
    };
    assert_eq!(response.output, "one\ntwo");
}

#[tokio::test]
async fn test_python_runtime_error() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "python", "divide_by_zero.py", None).await else {
        return;
    };
    assert_eq!(response.output, "before");
    let error = response.error.expect("runtime error expected");
    assert!(error.starts_with("Python Runtime Error:\n"), "{error}");
    assert!(error.contains("ZeroDivisionError"), "{error}");
}

#[tokio::test]
async fn test_javascript_hello() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "javascript", "hello.js", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
}

#[tokio::test]
async fn test_typescript_hello() {
    let (runner, _scratch) = default_runner();
    if !require_toolchain(&runner, "javascript").await {
        return;
    }
    let Some(response) = run_fixture(&runner, "typescript", "hello.ts", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
}

#[tokio::test]
async fn test_c_hello() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "c", "hello.c", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
}

#[tokio::test]
async fn test_cpp_hello() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "cpp", "hello.cpp", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
}

#[tokio::test]
async fn test_cpp_stdin() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "cpp", "echo.cpp", Some("test input\n")).await
    else {
        return;
    };
    assert_eq!(response.output, "test input");
}

#[tokio::test]
async fn test_cpp_compile_error() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "cpp", "compile_error.cpp", None).await else {
        return;
    };
    assert_eq!(response.output, "");
    let error = response.error.expect("compile error expected");
    assert!(error.starts_with("C++ Compilation Error:\n"), "{error}");
}

#[tokio::test]
async fn test_java_class_name_entry() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "java", "Greeter.java", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello from Greeter");
}

#[tokio::test]
async fn test_java_entry_ignores_comments_and_literals() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "java", "CommentedMain.java", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello from Helper");
    assert_eq!(response.error, None);
}

#[tokio::test]
async fn test_go_hello() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "go", "hello.go", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
}

#[tokio::test]
async fn test_rust_hello() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "rust", "hello.rs", None).await else {
        return;
    };
    assert_eq!(response.output, "Hello, World!");
    assert_eq!(response.error, None);
}

#[tokio::test]
async fn test_rust_inline_source() {
    let (runner, _scratch) = default_runner();
    if !require_toolchain(&runner, "rust").await {
        return;
    }

    let request = ExecutionRequest::new("rust", "fn main() { println!(\"hi\"); }");
    let outcome = runner.execute_outcome(&request).await.expect("Execution failed");
    assert_eq!(outcome.phase, OutcomePhase::Succeeded);
    assert_eq!(polyexec::normalize(&outcome).output, "hi");
}

#[tokio::test]
async fn test_sql_select() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "sql", "select.sql", None).await else {
        return;
    };
    assert!(response.output.contains('2'), "{}", response.output);
    assert_eq!(response.error, None);
}

#[tokio::test]
async fn test_sql_malformed() {
    let (runner, _scratch) = default_runner();
    let Some(response) = run_fixture(&runner, "sql", "malformed.sql", None).await else {
        return;
    };
    let error = response.error.expect("SQL error expected");
    assert!(error.starts_with("SQL Execution Error:"), "{error}");
}
