//! Compilation step for code execution
//!
//! Runs a language's compile command inside the workspace.

use tracing::{debug, instrument, warn};

use crate::config::{Config, Language};
use crate::runner::{RunnerError, sandbox_command};
use crate::sandbox::{self, ProcessOutput, SandboxError, Workspace};
use crate::types::{ExecutionOutcome, OutcomePhase};

/// Result of the compile step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileStatus {
    /// Artifact is ready (or the language has no compile step)
    Compiled,

    /// Execution ends here with the given outcome
    Failed(ExecutionOutcome),
}

/// Compile the source for `entry`, already written to the workspace
#[instrument(skip(workspace, config, language), fields(language = %language.name))]
pub async fn compile(
    workspace: &Workspace,
    config: &Config,
    language: &Language,
    entry: &str,
) -> Result<CompileStatus, RunnerError> {
    let Some(ref compile_config) = language.compile else {
        return Ok(CompileStatus::Compiled);
    };

    let source = language.source_name(entry);
    let binary = language.binary_name(entry);
    let argv = Language::expand_command(&compile_config.command, &source, &binary, entry);
    let timeout = config.compile_timeout(language);

    debug!(?argv, timeout_ms = timeout.as_millis() as u64, "compiling");

    let command = sandbox_command(config, workspace, argv, &compile_config.env, timeout);
    let output = match sandbox::run(&command, None).await {
        Ok(output) => output,
        Err(SandboxError::CommandNotFound(program)) => {
            warn!(%program, "compiler not found");
            return Ok(CompileStatus::Failed(ExecutionOutcome::toolchain_missing(
                &language.name,
            )));
        }
        Err(e) => return Err(e.into()),
    };

    debug!(
        exit_code = ?output.exit_code,
        timed_out = output.timed_out,
        elapsed_ms = output.elapsed.as_millis() as u64,
        "compilation complete"
    );

    if output.success() {
        return Ok(CompileStatus::Compiled);
    }

    Ok(CompileStatus::Failed(compile_failure(language, output)))
}

fn compile_failure(language: &Language, output: ProcessOutput) -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: output.stdout_lossy(),
        stderr: output.stderr_lossy(),
        exit_code: output.exit_code,
        signal: output.signal,
        timed_out: output.timed_out,
        label: Some(language.compile_error_label()),
        ..ExecutionOutcome::new(OutcomePhase::CompileFailed)
    }
}
