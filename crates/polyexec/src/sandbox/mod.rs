//! Process-level sandbox
//!
//! Per-request workspace directories, child process spawning with captured
//! output, and wall clock deadlines that kill the whole process group.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use crate::sandbox::command::SandboxCommand;
pub use crate::sandbox::process::{ProcessOutput, run};
pub use crate::sandbox::workspace::{Workspace, WorkspaceManager};

mod command;
mod process;
mod workspace;

/// Errors that occur during sandbox operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create workspace under {root}: {source}")]
    WorkspaceCreation {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("command '{0}' not found in PATH")]
    CommandNotFound(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("concurrency limiter closed")]
    LimiterClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve a program name to a path.
///
/// Children run with a cleared environment, so bare names (like `g++`) are
/// looked up on the host's `search_path` here. Paths containing a `/` are
/// resolved against `working_dir` when relative, and must exist.
pub fn resolve_program(
    program: &str,
    search_path: Option<&OsStr>,
    working_dir: Option<&Path>,
) -> Result<PathBuf, SandboxError> {
    if program.is_empty() {
        return Err(SandboxError::EmptyCommand);
    }

    if program.contains('/') {
        let path = Path::new(program);
        let resolved = match working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        if resolved.is_file() {
            return Ok(resolved);
        }
        return Err(SandboxError::CommandNotFound(program.to_owned()));
    }

    let search_path = search_path.unwrap_or_default();
    for dir in std::env::split_paths(search_path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(SandboxError::CommandNotFound(program.to_owned()))
}
