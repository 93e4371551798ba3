//! Command builder for sandboxed child processes

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::sandbox::{SandboxError, resolve_program};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_OUTPUT: usize = 1024 * 1024;

/// Builder for a child process run inside a workspace
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    /// Program followed by its arguments
    argv: Vec<String>,
    working_dir: Option<PathBuf>,
    /// Explicit variables, applied after inherited ones
    env: HashMap<String, String>,
    /// Host variables copied into the otherwise empty environment
    env_inherit: Vec<String>,
    timeout: Duration,
    /// Per-stream capture limit in bytes
    max_output: usize,
}

impl SandboxCommand {
    /// Create a new command from a program and its arguments
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: HashMap::new(),
            env_inherit: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Inherit environment variables from the parent process
    pub fn env_inherit(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.env_inherit.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Set the wall clock deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-stream capture limit in bytes
    pub fn max_output(mut self, bytes: u64) -> Self {
        self.max_output = usize::try_from(bytes).unwrap_or(usize::MAX);
        self
    }

    /// Program and arguments
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The program to run, if any
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// The wall clock deadline
    pub fn deadline(&self) -> Duration {
        self.timeout
    }

    /// Per-stream capture limit in bytes
    pub fn output_limit(&self) -> usize {
        self.max_output
    }

    /// The environment the child will see
    fn environment(&self) -> Vec<(String, OsString)> {
        let mut vars: Vec<(String, OsString)> = self
            .env_inherit
            .iter()
            .filter(|key| !self.env.contains_key(*key))
            .filter_map(|key| std::env::var_os(key).map(|value| (key.clone(), value)))
            .collect();
        vars.extend(
            self.env
                .iter()
                .map(|(key, value)| (key.clone(), OsString::from(value))),
        );
        vars
    }

    /// Build the tokio command
    ///
    /// The child gets a cleared environment, piped stdout/stderr, stdin piped
    /// only when `pipe_stdin` is set, and its own process group.
    pub fn build(&self, pipe_stdin: bool) -> Result<Command, SandboxError> {
        let (program, args) = self.argv.split_first().ok_or(SandboxError::EmptyCommand)?;
        let environment = self.environment();

        let search_path = environment
            .iter()
            .find(|(key, _)| key == "PATH")
            .map(|(_, value)| value.as_os_str());
        let program = resolve_program(program, search_path, self.working_dir.as_deref())?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(environment)
            .stdin(if pipe_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }
}
