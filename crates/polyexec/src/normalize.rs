//! Conversion of raw outcomes into caller-facing responses

use crate::types::{
    COMPILE_TIMEOUT_MESSAGE, EXECUTION_TIMEOUT_MESSAGE, ExecutionOutcome, ExecutionResponse,
    NO_OUTPUT_PLACEHOLDER, OutcomePhase,
};

/// Map an outcome to `{ output, error?, duration }`
///
/// Trailing whitespace is trimmed from both fields. A successful run with no
/// output reports [`NO_OUTPUT_PLACEHOLDER`].
pub fn normalize(outcome: &ExecutionOutcome) -> ExecutionResponse {
    let (output, error) = match outcome.phase {
        OutcomePhase::Succeeded | OutcomePhase::Rendered => {
            (non_empty_output(&outcome.stdout), None)
        }
        OutcomePhase::ToolchainMissing => {
            let message = outcome.message.as_deref().unwrap_or_default();
            (message.trim_end().to_owned(), None)
        }
        OutcomePhase::CompileFailed if outcome.timed_out => {
            (String::new(), Some(COMPILE_TIMEOUT_MESSAGE.to_owned()))
        }
        OutcomePhase::CompileFailed => {
            // Some compilers (tsc, dotnet) print diagnostics on stdout
            let diagnostics =
                first_non_blank(&[outcome.stderr.as_str(), outcome.stdout.as_str()]);
            (String::new(), Some(labelled(outcome, diagnostics)))
        }
        OutcomePhase::RuntimeFailed => {
            let message = outcome.message.as_deref().unwrap_or_default();
            let diagnostics = first_non_blank(&[outcome.stderr.as_str(), message]);
            (
                outcome.stdout.trim_end().to_owned(),
                Some(labelled(outcome, diagnostics)),
            )
        }
        OutcomePhase::TimedOut => (
            outcome.stdout.trim_end().to_owned(),
            Some(EXECUTION_TIMEOUT_MESSAGE.to_owned()),
        ),
    };

    ExecutionResponse {
        output,
        error,
        duration: outcome.duration_ms,
    }
}

fn non_empty_output(stdout: &str) -> String {
    let trimmed = stdout.trim_end();
    if trimmed.is_empty() {
        NO_OUTPUT_PLACEHOLDER.to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn first_non_blank<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|text| !text.trim().is_empty())
        .unwrap_or_default()
}

fn labelled(outcome: &ExecutionOutcome, diagnostics: &str) -> String {
    let label = outcome.label.as_deref().unwrap_or("Error");
    let diagnostics = diagnostics.trim_end();
    if diagnostics.is_empty() {
        format!("{label}:")
    } else {
        format!("{label}:\n{diagnostics}")
    }
}
