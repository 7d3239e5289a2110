//! Agent-call collaborator.
//!
//! The [`Agent`] trait decouples the loop from the model backend. An agent
//! call may run for a long time and do arbitrary work in the project (tool
//! calls, file edits, writing `.ralph/status.txt`); the loop only sees the
//! final text. Tests use scripted agents that return canned responses.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Lines of stderr quoted in a failure message.
const FAILURE_TAIL_LINES: usize = 20;

pub trait Agent {
    /// Run one agent turn on `prompt` and return its final response text.
    fn call(&self, prompt: &str) -> Result<String>;
}

impl<A: Agent + ?Sized> Agent for &A {
    fn call(&self, prompt: &str) -> Result<String> {
        (**self).call(prompt)
    }
}

/// Agent backed by a CLI: prompt on stdin, response on stdout.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    workdir: PathBuf,
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandAgent {
    pub fn new(workdir: impl Into<PathBuf>, config: &AgentConfig) -> Self {
        Self {
            workdir: workdir.into(),
            argv: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Agent for CommandAgent {
    #[instrument(skip_all, fields(program = ?self.argv.first(), timeout_secs = self.timeout.as_secs()))]
    fn call(&self, prompt: &str) -> Result<String> {
        info!(workdir = %self.workdir.display(), prompt_bytes = prompt.len(), "calling agent");
        let mut cmd = command_from_argv(&self.argv)?;
        cmd.current_dir(&self.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!("agent timed out");
            return Err(anyhow!("agent timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "agent exited with status {:?}: {}",
                output.status.code(),
                output.tail(FAILURE_TAIL_LINES)
            ));
        }

        let response = output.stdout_lossy();
        debug!(response_bytes = response.len(), "agent call completed");
        Ok(response)
    }
}
