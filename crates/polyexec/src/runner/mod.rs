//! Code runner for polyexec
//!
//! Drives a request through the generic compile-then-run pipeline: language
//! lookup, toolchain probe, workspace, compile, run, outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::runner::compile::{CompileStatus, compile};
pub use crate::runner::execute::{classify, execute};
pub use crate::runner::markup::{MarkupSummary, render};
pub use crate::runner::probe::ToolchainProbe;

mod compile;
mod execute;
mod markup;
mod probe;

use crate::{
    config::{Config, Language, LanguageMode},
    normalize::normalize,
    sandbox::{SandboxCommand, SandboxError, Workspace, WorkspaceManager},
    types::{ExecutionOutcome, ExecutionRequest, ExecutionResponse},
};

/// Errors that stop a request before it produces an outcome
///
/// Failures of the submitted program are not errors; they are reported
/// through [`ExecutionOutcome`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unsupported language: '{0}'")]
    UnsupportedLanguage(String),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// High-level runner for code execution
///
/// Cheap to clone; clones share the configuration and the workspace limiter.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    workspaces: Arc<WorkspaceManager>,
    probe: ToolchainProbe,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        let workspaces = WorkspaceManager::new(&config.scratch_root, config.max_concurrent);
        Self {
            config: Arc::new(config),
            workspaces: Arc::new(workspaces),
            probe: ToolchainProbe::new(),
        }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the workspace manager
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Look up a language by ID
    pub fn language(&self, id: &str) -> Result<&Language, RunnerError> {
        if id.is_empty() {
            return Err(RunnerError::UnsupportedLanguage(id.to_owned()));
        }
        self.config
            .get_language(id)
            .map_err(|_| RunnerError::UnsupportedLanguage(id.to_owned()))
    }

    /// Starter code for a language
    pub fn template(&self, id: &str) -> Result<&str, RunnerError> {
        Ok(&self.language(id)?.template)
    }

    /// Whether the toolchain for a language is installed
    pub async fn is_available(&self, id: &str) -> Result<bool, RunnerError> {
        let language = self.language(id)?;
        if !language.needs_toolchain() {
            return Ok(true);
        }
        Ok(self.probe.is_available(&self.config, language).await)
    }

    /// Execute a request and normalize the result
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResponse, RunnerError> {
        let outcome = self.execute_outcome(request).await?;
        Ok(normalize(&outcome))
    }

    /// Execute a request and return the raw outcome
    ///
    /// The workspace, if one was needed, is removed before this returns.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute_outcome(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, RunnerError> {
        let started = Instant::now();
        let language = self.language(&request.language)?;

        let mut outcome = if language.mode == LanguageMode::Markup {
            render(&request.code)
        } else if !self.probe.is_available(&self.config, language).await {
            info!(language = %language.name, "toolchain not available");
            ExecutionOutcome::toolchain_missing(&language.name)
        } else {
            let workspace = self.workspaces.acquire().await?;
            let result = self.run_in_workspace(&workspace, language, request).await;
            if let Err(e) = workspace.release().await {
                warn!(error = %e, "failed to remove workspace");
            }
            result?
        };

        outcome.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            phase = ?outcome.phase,
            duration_ms = outcome.duration_ms,
            "request finished"
        );
        Ok(outcome)
    }

    async fn run_in_workspace(
        &self,
        workspace: &Workspace,
        language: &Language,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, RunnerError> {
        for file in &language.support_files {
            workspace
                .write_file(&file.name, file.content.as_bytes())
                .await?;
        }

        let entry = language.resolve_entry(&request.code);
        workspace
            .write_file(&language.source_name(&entry), request.code.as_bytes())
            .await?;

        if let CompileStatus::Failed(outcome) =
            compile(workspace, &self.config, language, &entry).await?
        {
            return Ok(outcome);
        }

        execute(
            workspace,
            &self.config,
            language,
            &entry,
            request.input.as_deref(),
            request.timeout,
        )
        .await
    }
}

/// Toolchain state under the host's home directory: the variable, the
/// directory that must exist, and the variable's value relative to home.
const HOST_TOOLCHAIN_DIRS: [(&str, &str, &str); 4] = [
    ("RUSTUP_HOME", ".rustup", ".rustup"),
    ("CARGO_HOME", ".cargo", ".cargo"),
    ("DOTNET_CLI_HOME", ".dotnet", ""),
    ("NUGET_PACKAGES", ".nuget/packages", ".nuget/packages"),
];

/// Command for a step run inside a workspace
///
/// `env` is applied last, over the environment of [`isolated_command`].
pub(crate) fn sandbox_command(
    config: &Config,
    workspace: &Workspace,
    argv: Vec<String>,
    env: &HashMap<String, String>,
    timeout: Duration,
) -> SandboxCommand {
    isolated_command(config, workspace.path(), argv)
        .working_dir(workspace.path())
        .envs(env.clone())
        .timeout(timeout)
        .max_output(config.max_output)
}

/// Command with a cleared environment and `HOME`/`TMPDIR` set to `home`
///
/// Only `env_passthrough` variables are inherited. Toolchain homes the host
/// leaves unset are pinned to the host's real home directory, since moving
/// `HOME` would otherwise hide installations like `~/.rustup`.
pub(crate) fn isolated_command(config: &Config, home: &Path, argv: Vec<String>) -> SandboxCommand {
    let host_home = std::env::var_os("HOME").map(PathBuf::from);
    let is_set = |var: &str| std::env::var_os(var).is_some();
    let toolchain_env = host_toolchain_env(&config.env_passthrough, host_home.as_deref(), is_set);

    let home = home.to_string_lossy().into_owned();
    SandboxCommand::new(argv)
        .env_inherit(config.env_passthrough.iter().cloned())
        .envs(toolchain_env)
        .env("HOME", home.clone())
        .env("TMPDIR", home)
}

/// Values for passthrough toolchain variables that `is_set` reports missing
fn host_toolchain_env(
    passthrough: &[String],
    host_home: Option<&Path>,
    is_set: impl Fn(&str) -> bool,
) -> HashMap<String, String> {
    let Some(host_home) = host_home else {
        return HashMap::new();
    };

    HOST_TOOLCHAIN_DIRS
        .iter()
        .filter(|(var, _, _)| passthrough.iter().any(|name| name == var) && !is_set(var))
        .filter(|(_, marker, _)| host_home.join(marker).is_dir())
        .map(|(var, _, value)| {
            let path = if value.is_empty() {
                host_home.to_path_buf()
            } else {
                host_home.join(value)
            };
            ((*var).to_owned(), path.to_string_lossy().into_owned())
        })
        .collect()
}
