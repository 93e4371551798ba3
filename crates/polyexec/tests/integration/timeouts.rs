use std::time::{Duration, Instant};

use polyexec::types::{
    COMPILE_TIMEOUT_MESSAGE, EXECUTION_TIMEOUT_MESSAGE, ExecutionRequest, OutcomePhase,
};

use super::{leftover_workspaces, shell_runner};

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "echo started\nsleep 30").with_timeout(500);

    let started = Instant::now();
    let response = runner.execute(&request).await.expect("Execution failed");
    let elapsed = started.elapsed();

    assert_eq!(response.output, "started");
    assert_eq!(response.error.as_deref(), Some(EXECUTION_TIMEOUT_MESSAGE));
    assert!(response.duration >= 500, "duration {}", response.duration);
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "while :; do :; done").with_timeout(300);

    let outcome = runner.execute_outcome(&request).await.expect("Execution failed");
    assert_eq!(outcome.phase, OutcomePhase::TimedOut);
    assert!(outcome.timed_out);
    assert!(outcome.duration_ms < 3000, "duration {}", outcome.duration_ms);
}

#[tokio::test]
async fn test_language_default_timeout_applies() {
    let (runner, _scratch) = shell_runner();
    // shell.toml sets run_ms = 3000
    let request = ExecutionRequest::new("shell", "sleep 30");

    let response = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(response.error.as_deref(), Some(EXECUTION_TIMEOUT_MESSAGE));
    assert!(response.duration >= 3000, "duration {}", response.duration);
    assert!(response.duration < 6000, "duration {}", response.duration);
}

#[tokio::test]
async fn test_zero_timeout_uses_default() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "sleep 0.2\necho ok").with_timeout(0);

    let response = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(response.output, "ok");
    assert_eq!(response.error, None);
}

#[tokio::test]
async fn test_requested_timeout_is_clamped() {
    let (runner, _scratch) = shell_runner();
    let language = runner.language("shell").unwrap();

    assert_eq!(
        runner.config().run_timeout(language, Some(u64::MAX)),
        Duration::from_millis(runner.config().max_timeout_ms)
    );
}

#[tokio::test]
async fn test_compile_timeout() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("slowbuild", "echo never");

    let started = Instant::now();
    let outcome = runner.execute_outcome(&request).await.expect("Execution failed");

    assert_eq!(outcome.phase, OutcomePhase::CompileFailed);
    assert!(outcome.timed_out);
    assert!(started.elapsed() < Duration::from_secs(3));

    let response = polyexec::normalize(&outcome);
    assert_eq!(response.output, "");
    assert_eq!(response.error.as_deref(), Some(COMPILE_TIMEOUT_MESSAGE));
    assert_eq!(leftover_workspaces(&runner), 0);
}

#[tokio::test]
async fn test_background_child_does_not_hold_request() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "sleep 30 &\necho parent done");

    let started = Instant::now();
    let response = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(response.output, "parent done");
    assert_eq!(response.error, None);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Field after the parenthesized command name is the state
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_descendants() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "sleep 60 &\necho $!\nsleep 60").with_timeout(300);

    let response = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(response.error.as_deref(), Some(EXECUTION_TIMEOUT_MESSAGE));

    let pid: u32 = response.output.trim().parse().expect("background pid");
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!process_alive(pid), "background process {pid} survived");
}

#[tokio::test]
async fn test_cleanup_after_timeout() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "touch leftover\nsleep 30").with_timeout(200);

    let response = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(response.error.as_deref(), Some(EXECUTION_TIMEOUT_MESSAGE));
    assert_eq!(leftover_workspaces(&runner), 0);
}
