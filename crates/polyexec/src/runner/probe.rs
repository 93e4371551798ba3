//! Toolchain availability checks

use tracing::{debug, instrument};

use crate::config::{Config, Language};
use crate::runner::isolated_command;
use crate::sandbox;

/// Bytes kept from a probe's output; only the exit status matters
const PROBE_OUTPUT_LIMIT: u64 = 4096;

/// Checks whether a language's compiler or interpreter is installed
///
/// A tool counts as available when its probe command is found on `PATH`,
/// exits with status zero, and does so within the probe timeout. Results are
/// not cached, so installing a toolchain takes effect on the next request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolchainProbe;

impl ToolchainProbe {
    pub fn new() -> Self {
        Self
    }

    /// Probe the toolchain for `language`
    ///
    /// Never fails: anything that prevents a clean probe run means the
    /// toolchain is unavailable.
    #[instrument(skip_all, fields(language = %language.name))]
    pub async fn is_available(&self, config: &Config, language: &Language) -> bool {
        let Some(argv) = language.probe_command() else {
            return true;
        };

        let command = isolated_command(config, &std::env::temp_dir(), argv)
            .timeout(config.probe_timeout(language))
            .max_output(PROBE_OUTPUT_LIMIT);

        match sandbox::run(&command, None).await {
            Ok(output) if output.success() => {
                debug!("toolchain available");
                true
            }
            Ok(output) => {
                debug!(
                    exit_code = ?output.exit_code,
                    timed_out = output.timed_out,
                    "toolchain probe failed"
                );
                false
            }
            Err(e) => {
                debug!(error = %e, "toolchain probe could not run");
                false
            }
        }
    }
}
