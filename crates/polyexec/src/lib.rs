//! A library for running untrusted code in many languages.
//!
//! polyexec takes a source file, a language ID and optional stdin, compiles
//! and runs the program in a throwaway workspace directory under a wall clock
//! deadline, and reports a normalized `{ output, error, duration }` result.
//!
//! # Features
//!
//! - **Multi-language**: compiled, interpreted and statically analyzed (HTML/CSS) languages from one table.
//! - **TOML configuration**: per-language commands, timeouts, support files and templates.
//! - **Workspace isolation**: a fresh directory per request, always removed afterwards.
//! - **Process-group timeouts**: the whole process tree is killed when the deadline passes.
//! - **Toolchain probing**: missing compilers are reported instead of failing the request.
//!
//! Isolation is process-level only; there are no namespaces or resource quotas.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use normalize::normalize;
pub use runner::{Runner, RunnerError, ToolchainProbe};
pub use sandbox::{SandboxError, Workspace, WorkspaceManager};
pub use types::{ExecutionOutcome, ExecutionRequest, ExecutionResponse, OutcomePhase, Timeouts};

pub mod config;
pub mod normalize;
pub mod runner;
pub mod sandbox;
pub mod types;
