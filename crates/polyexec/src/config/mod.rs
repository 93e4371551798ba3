use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, DEFAULT_ENTRY_NAME, EntryPoint, FileExtension, Language, LanguageMode,
    RunConfig, SupportFile, detect_class_name,
};
use crate::types::Timeouts;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Provides the default language table; library users can also write it out
/// as a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../polyexec.example.toml");

/// Prefix for environment variable overrides (e.g. `POLYEXEC_MAX_TIMEOUT_MS`)
pub const ENV_PREFIX: &str = "POLYEXEC";

const DEFAULT_MAX_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RUN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAX_OUTPUT: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for polyexec
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which per-request workspaces are created
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,

    /// Hard ceiling for any run timeout, in milliseconds
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Maximum number of executions holding a workspace at once
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Maximum bytes captured per output stream
    #[serde(default = "default_max_output")]
    pub max_output: u64,

    /// Host environment variables passed through to child processes
    #[serde(default = "default_env_passthrough")]
    pub env_passthrough: Vec<String>,

    /// Default timeouts, overridden per language
    #[serde(default)]
    pub default_timeouts: Timeouts,

    /// Language configurations keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            scratch_root: default_scratch_root(),
            max_timeout_ms: default_max_timeout_ms(),
            max_concurrent: None,
            max_output: default_max_output(),
            env_passthrough: default_env_passthrough(),
            default_timeouts: Timeouts::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Merge a language's timeouts with the defaults
    pub fn effective_timeouts(&self, language: &Language) -> Timeouts {
        match language.timeouts {
            Some(ref timeouts) => self.default_timeouts.with_overrides(timeouts),
            None => self.default_timeouts.clone(),
        }
    }

    /// Run timeout for a request, clamped to the language and global ceilings
    ///
    /// A requested timeout of zero is treated as absent.
    pub fn run_timeout(&self, language: &Language, requested_ms: Option<u64>) -> Duration {
        let timeouts = self.effective_timeouts(language);
        let ceiling = timeouts
            .max_run_ms
            .map_or(self.max_timeout_ms, |max| max.min(self.max_timeout_ms));
        let wanted = requested_ms
            .filter(|ms| *ms > 0)
            .or(timeouts.run_ms)
            .unwrap_or(DEFAULT_RUN_TIMEOUT_MS);
        Duration::from_millis(wanted.min(ceiling))
    }

    /// Timeout for the compile step
    pub fn compile_timeout(&self, language: &Language) -> Duration {
        let timeouts = self.effective_timeouts(language);
        Duration::from_millis(timeouts.compile_ms.unwrap_or(DEFAULT_COMPILE_TIMEOUT_MS))
    }

    /// Timeout for the toolchain probe
    pub fn probe_timeout(&self, language: &Language) -> Duration {
        let timeouts = self.effective_timeouts(language);
        Duration::from_millis(timeouts.probe_ms.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS))
    }

    /// Sorted language IDs
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("polyexec")
}

fn default_max_timeout_ms() -> u64 {
    DEFAULT_MAX_TIMEOUT_MS
}

fn default_max_output() -> u64 {
    DEFAULT_MAX_OUTPUT
}

fn default_env_passthrough() -> Vec<String> {
    [
        "PATH",
        "LANG",
        "RUSTUP_HOME",
        "CARGO_HOME",
        "DOTNET_CLI_HOME",
        "NUGET_PACKAGES",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
