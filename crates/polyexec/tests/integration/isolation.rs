use std::time::{Duration, Instant};

use polyexec::runner::Runner;
use polyexec::types::ExecutionRequest;

use super::{leftover_workspaces, shell_config, shell_runner};

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let (runner, _scratch) = shell_runner();

    let mut handles = Vec::new();
    for id in 0..8 {
        let runner = runner.clone();
        handles.push(tokio::spawn(async move {
            let code = format!("echo {id} > marker\nls | wc -l\ncat marker");
            let response = runner
                .execute(&ExecutionRequest::new("shell", code))
                .await
                .expect("Execution failed");
            (id, response)
        }));
    }

    for handle in handles {
        let (id, response) = handle.await.unwrap();
        let lines: Vec<&str> = response.output.lines().map(str::trim).collect();
        // main.sh and marker, nothing from other requests
        assert_eq!(lines, vec!["2", id.to_string().as_str()]);
        assert_eq!(response.error, None);
    }

    assert_eq!(leftover_workspaces(&runner), 0);
}

#[tokio::test]
async fn test_files_do_not_persist_between_requests() {
    let (runner, _scratch) = shell_runner();

    runner
        .execute(&ExecutionRequest::new("shell", "echo secret > stash.txt"))
        .await
        .expect("Execution failed");

    let response = runner
        .execute(&ExecutionRequest::new(
            "shell",
            "cat stash.txt 2>/dev/null || echo missing",
        ))
        .await
        .expect("Execution failed");
    assert_eq!(response.output, "missing");
}

#[tokio::test]
async fn test_max_concurrent_serializes_requests() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = shell_config(&scratch);
    config.max_concurrent = Some(1);
    let runner = Runner::new(config);

    let request = ExecutionRequest::new("shell", "sleep 0.3\necho done");
    let started = Instant::now();
    let (first, second) = tokio::join!(runner.execute(&request), runner.execute(&request));

    assert_eq!(first.unwrap().output, "done");
    assert_eq!(second.unwrap().output, "done");
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(runner.workspaces().available(), Some(1));
}

#[tokio::test]
async fn test_output_is_capped() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = shell_config(&scratch);
    config.max_output = 1000;
    let runner = Runner::new(config);

    let request = ExecutionRequest::new("shell", "head -c 100000 /dev/zero | tr '\\000' a");
    let response = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(response.output.len(), 1000);
    assert!(response.output.chars().all(|c| c == 'a'));
}

#[tokio::test]
async fn test_home_points_into_workspace() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "echo \"$HOME\"\necho \"$TMPDIR\"");

    let response = runner.execute(&request).await.expect("Execution failed");
    let lines: Vec<&str> = response.output.lines().collect();
    let root = runner.config().scratch_root.to_string_lossy().into_owned();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&root), "HOME was {}", lines[0]);
    assert_eq!(lines[0], lines[1]);
}

#[tokio::test]
async fn test_environment_is_not_inherited() {
    let (runner, _scratch) = shell_runner();
    let request = ExecutionRequest::new("shell", "echo \"cargo=${CARGO_MANIFEST_DIR:-unset}\"");

    let response = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(response.output, "cargo=unset");
}

#[tokio::test]
async fn test_workspace_cannot_be_escaped_by_support_file_names() {
    let (runner, _scratch) = shell_runner();
    let workspace = runner.workspaces().acquire().await.unwrap();

    assert!(workspace.write_file("../escape.txt", b"x").await.is_err());
    assert!(workspace.write_file("/tmp/escape.txt", b"x").await.is_err());

    workspace.release().await.unwrap();
    assert_eq!(leftover_workspaces(&runner), 0);
}
