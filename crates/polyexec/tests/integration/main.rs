//! Integration tests for polyexec
//!
//! Engine tests drive `/bin/sh` through the whole pipeline and run on any
//! Unix host. Tests against real compilers and interpreters are gated behind
//! the `integration-tests` feature and skip toolchains that are not installed:
//!    cargo test -p polyexec --features integration-tests

use std::fs;
use std::path::PathBuf;

use polyexec::config::Config;
use polyexec::runner::Runner;
use tempfile::TempDir;

mod isolation;
mod timeouts;
#[cfg(feature = "integration-tests")]
mod toolchains;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

pub(crate) fn fixture_config(name: &str) -> PathBuf {
    PathBuf::from(format!("{FIXTURES_PATH}/configs/{name}"))
}

/// Shell-backed languages with a private scratch root
pub(crate) fn shell_config(scratch: &TempDir) -> Config {
    let mut config =
        Config::from_file(fixture_config("shell.toml")).expect("Failed to load shell config");
    config.scratch_root = scratch.path().join("scratch");
    config
}

pub(crate) fn shell_runner() -> (Runner, TempDir) {
    let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
    let runner = Runner::new(shell_config(&scratch));
    (runner, scratch)
}

/// Number of workspaces currently left under the scratch root
pub(crate) fn leftover_workspaces(runner: &Runner) -> usize {
    fs::read_dir(&runner.config().scratch_root)
        .map(|entries| entries.count())
        .unwrap_or(0)
}
