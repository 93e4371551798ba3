use serde::{Deserialize, Serialize};

/// Error reported when the run step exceeds its deadline
pub const EXECUTION_TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Error reported when the compile step exceeds its deadline
pub const COMPILE_TIMEOUT_MESSAGE: &str = "Compilation timed out";

/// Output reported when a successful program printed nothing
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output)";

/// Per-step wall clock timeouts in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Default run timeout when the request does not ask for one
    #[serde(default)]
    pub run_ms: Option<u64>,

    /// Ceiling for the run timeout, regardless of what the request asks for
    #[serde(default)]
    pub max_run_ms: Option<u64>,

    /// Compile step timeout
    #[serde(default)]
    pub compile_ms: Option<u64>,

    /// Toolchain probe timeout
    #[serde(default)]
    pub probe_ms: Option<u64>,
}

impl Timeouts {
    /// Create timeouts with the built-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeouts with every field unset
    pub fn unset() -> Self {
        Self {
            run_ms: None,
            max_run_ms: None,
            compile_ms: None,
            probe_ms: None,
        }
    }

    /// Set the default run timeout
    pub fn with_run_ms(mut self, ms: u64) -> Self {
        self.run_ms = Some(ms);
        self
    }

    /// Set the run timeout ceiling
    pub fn with_max_run_ms(mut self, ms: u64) -> Self {
        self.max_run_ms = Some(ms);
        self
    }

    /// Set the compile timeout
    pub fn with_compile_ms(mut self, ms: u64) -> Self {
        self.compile_ms = Some(ms);
        self
    }

    /// Set the probe timeout
    pub fn with_probe_ms(mut self, ms: u64) -> Self {
        self.probe_ms = Some(ms);
        self
    }

    /// Apply overrides from another Timeouts, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &Timeouts) -> Timeouts {
        Timeouts {
            run_ms: overrides.run_ms.or(self.run_ms),
            max_run_ms: overrides.max_run_ms.or(self.max_run_ms),
            compile_ms: overrides.compile_ms.or(self.compile_ms),
            probe_ms: overrides.probe_ms.or(self.probe_ms),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            run_ms: Some(5_000),
            max_run_ms: None,
            compile_ms: Some(30_000),
            probe_ms: Some(2_000),
        }
    }
}

/// A request to run one piece of source code
///
/// Field names follow the JSON payload accepted from the HTTP layer:
/// `{ "language": "...", "code": "...", "input": "...", "timeout": 1000 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language identifier (e.g. "python", "cpp")
    #[serde(default)]
    pub language: String,

    /// Untrusted source code
    pub code: String,

    /// Text fed to the program on stdin
    #[serde(default)]
    pub input: Option<String>,

    /// Requested run timeout in milliseconds, clamped by the engine
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: None,
            timeout: None,
        }
    }

    /// Set the stdin contents
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Set the requested timeout in milliseconds
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }
}

/// How an execution attempt concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomePhase {
    /// Program ran to completion
    Succeeded,

    /// Compile step exited non-zero or timed out
    CompileFailed,

    /// Program exited non-zero with diagnostics, or died from a signal
    RuntimeFailed,

    /// Program was killed after exceeding the run timeout
    TimedOut,

    /// Compiler or interpreter is not installed
    ToolchainMissing,

    /// Source was analyzed statically, no process was spawned
    Rendered,
}

/// Raw result of an execution, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub phase: OutcomePhase,

    /// Captured standard output (lossy UTF-8)
    pub stdout: String,

    /// Captured standard error (lossy UTF-8)
    pub stderr: String,

    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,

    /// Whether a deadline was hit (run or compile step)
    pub timed_out: bool,

    /// Wall clock time since the request was received
    pub duration_ms: u64,

    /// Prefix for the reported error, e.g. "C++ Compilation Error"
    pub label: Option<String>,

    /// Engine-generated text, e.g. the toolchain-missing notice
    pub message: Option<String>,
}

impl ExecutionOutcome {
    /// Create an outcome with empty streams
    pub fn new(phase: OutcomePhase) -> Self {
        Self {
            phase,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            signal: None,
            timed_out: false,
            duration_ms: 0,
            label: None,
            message: None,
        }
    }

    /// Outcome for a language whose toolchain is absent
    pub fn toolchain_missing(language_name: &str) -> Self {
        Self {
            message: Some(format!("{language_name} toolchain not available")),
            ..Self::new(OutcomePhase::ToolchainMissing)
        }
    }

    /// Whether the outcome should be reported without an error
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self.phase,
            OutcomePhase::Succeeded | OutcomePhase::Rendered | OutcomePhase::ToolchainMissing
        )
    }
}

/// Normalized response returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Program output, possibly partial
    pub output: String,

    /// Failure description, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall clock duration in milliseconds
    pub duration: u64,
}

impl ExecutionResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
