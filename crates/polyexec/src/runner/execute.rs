//! Execution step for code running
//!
//! Runs the compiled artifact or interpreter and classifies how it ended.

use nix::sys::signal::Signal;
use tracing::{debug, instrument, warn};

use crate::config::{Config, Language};
use crate::runner::{RunnerError, sandbox_command};
use crate::sandbox::{self, ProcessOutput, SandboxError, Workspace};
use crate::types::{ExecutionOutcome, OutcomePhase};

/// Run the program for `entry` in the workspace
///
/// The source (and artifact, for compiled languages) must already be in
/// place. `requested_timeout_ms` is clamped to the configured ceilings.
#[instrument(skip(workspace, config, language, input), fields(language = %language.name))]
pub async fn execute(
    workspace: &Workspace,
    config: &Config,
    language: &Language,
    entry: &str,
    input: Option<&str>,
    requested_timeout_ms: Option<u64>,
) -> Result<ExecutionOutcome, RunnerError> {
    let source = language.source_name(entry);
    let binary = language.binary_name(entry);
    let argv = Language::expand_command(&language.run.command, &source, &binary, entry);
    let timeout = config.run_timeout(language, requested_timeout_ms);

    debug!(?argv, timeout_ms = timeout.as_millis() as u64, "executing program");

    let command = sandbox_command(config, workspace, argv, &language.run.env, timeout);
    let output = match sandbox::run(&command, input.map(str::as_bytes)).await {
        Ok(output) => output,
        Err(SandboxError::CommandNotFound(program)) => {
            warn!(%program, "program not found");
            return Ok(ExecutionOutcome::toolchain_missing(&language.name));
        }
        Err(e) => return Err(e.into()),
    };

    let outcome = classify(language, output);
    debug!(phase = ?outcome.phase, exit_code = ?outcome.exit_code, "execution complete");
    Ok(outcome)
}

/// Map a finished run to an outcome phase
///
/// A non-zero exit only counts as a failure when the program wrote to
/// stderr. A signal death with nothing on stderr is reported by name.
pub fn classify(language: &Language, output: ProcessOutput) -> ExecutionOutcome {
    let stdout = output.stdout_lossy();
    let stderr = output.stderr_lossy();
    let has_stderr = !stderr.trim().is_empty();

    let (phase, message) = match (output.timed_out, output.exit_code, output.signal) {
        (true, _, _) => (OutcomePhase::TimedOut, None),
        (false, Some(0), _) => (OutcomePhase::Succeeded, None),
        _ if has_stderr => (OutcomePhase::RuntimeFailed, None),
        (false, _, Some(signal)) => (OutcomePhase::RuntimeFailed, Some(signal_message(signal))),
        _ => (OutcomePhase::Succeeded, None),
    };

    let label = (phase == OutcomePhase::RuntimeFailed).then(|| language.run_error_label());

    ExecutionOutcome {
        phase,
        stdout,
        stderr,
        exit_code: output.exit_code,
        signal: output.signal,
        timed_out: output.timed_out,
        duration_ms: 0,
        label,
        message,
    }
}

fn signal_message(signal: i32) -> String {
    match Signal::try_from(signal) {
        Ok(name) => format!("process terminated by signal {signal} ({})", name.as_str()),
        Err(_) => format!("process terminated by signal {signal}"),
    }
}
