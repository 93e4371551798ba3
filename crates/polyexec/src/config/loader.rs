//! Configuration file loading for polyexec
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, LanguageMode};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load layered configuration
    ///
    /// Sources, lowest precedence first: the embedded language table, the
    /// optional file at `path`, then `POLYEXEC_*` environment variables
    /// (nested keys separated by `__`, e.g. `POLYEXEC_DEFAULT_TIMEOUTS__RUN_MS`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("env_passthrough"),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "max_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        if self.max_concurrent == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent must be greater than zero".to_owned(),
            ));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.entry_name.is_empty() || !is_plain_file_name(&lang.entry_name) {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has invalid entry name '{}'",
                    lang.entry_name
                )));
            }
            if lang.mode == LanguageMode::Process && lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref compile) = lang.compile
                && compile.command.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty compile command"
                )));
            }
            if let Some(ref probe) = lang.probe
                && probe.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty probe command"
                )));
            }
            if let Some(file) = lang
                .support_files
                .iter()
                .find(|file| !is_relative_file_path(&file.name))
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has invalid support file name '{}'",
                    file.name
                )));
            }
            if let Some(ref timeouts) = lang.timeouts {
                let values = [
                    timeouts.run_ms,
                    timeouts.max_run_ms,
                    timeouts.compile_ms,
                    timeouts.probe_ms,
                ];
                if values.contains(&Some(0)) {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has a zero timeout"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.contains('/') && name != "." && name != ".."
}

fn is_relative_file_path(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && name.split('/').all(|part| !part.is_empty() && part != "..")
}
