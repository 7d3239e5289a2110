//! Build collaborator used by the `build-succeeds` gate.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::io::config::BuildConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Lines that look like compiler or bundler diagnostics.
static DIAGNOSTIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\berror\b|\bERR!|\bfailed to\b|\bcannot find\b|\bis not defined\b)")
        .expect("diagnostic regex is valid")
});

/// Outcome of compiling the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub success: bool,
    pub errors: Vec<String>,
}

pub trait Builder {
    /// Attempt to build the project.
    ///
    /// `Err` means the build could not be attempted at all; a build that ran
    /// and failed is `Ok` with `success == false`.
    fn build(&self) -> Result<BuildReport>;
}

/// Runs a configured build command in the project directory.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    workdir: PathBuf,
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    max_errors: usize,
}

impl CommandBuilder {
    pub fn new(workdir: impl Into<PathBuf>, config: &BuildConfig) -> Self {
        Self {
            workdir: workdir.into(),
            argv: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            max_errors: config.max_reported_errors,
        }
    }
}

impl Builder for CommandBuilder {
    #[instrument(skip_all, fields(command = %self.argv.join(" ")))]
    fn build(&self) -> Result<BuildReport> {
        let mut cmd = command_from_argv(&self.argv)?;
        cmd.current_dir(&self.workdir);
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)?;

        if output.timed_out {
            return Ok(BuildReport {
                success: false,
                errors: vec![format!("build timed out after {:?}", self.timeout)],
            });
        }
        let success = output.status.success();
        info!(success, exit_code = ?output.status.code(), "build finished");
        if success {
            return Ok(BuildReport {
                success,
                errors: Vec::new(),
            });
        }

        let combined = format!("{}\n{}", output.stdout_lossy(), output.stderr_lossy());
        let mut errors = extract_diagnostics(&combined, self.max_errors);
        if errors.is_empty() {
            errors.push(output.tail(self.max_errors.max(1)));
        }
        Ok(BuildReport { success, errors })
    }
}

/// Pick out diagnostic-looking lines, deduplicated, in output order.
pub fn extract_diagnostics(output: &str, max: usize) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim) {
        if found.len() >= max {
            break;
        }
        if line.is_empty() || !DIAGNOSTIC_RE.is_match(line) {
            continue;
        }
        if !found.iter().any(|seen| seen == line) {
            found.push(line.to_string());
        }
    }
    found
}
