//! Per-iteration artifacts under `.ralph/iterations/<n>/`.
//!
//! These are product artifacts for humans auditing a run. The loop never
//! reads them back, so failures to write them are reported to the caller to
//! log and otherwise ignored.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::layout;
use crate::core::types::GatesRunResult;
use crate::io::fs::ProjectFs;

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub prompt_path: PathBuf,
    pub response_path: PathBuf,
    pub error_path: PathBuf,
    pub gates_path: PathBuf,
}

impl IterationPaths {
    pub fn new(iteration: u32) -> Self {
        let dir = layout::iteration_dir(iteration);
        Self {
            prompt_path: dir.join("prompt.md"),
            response_path: dir.join("response.md"),
            error_path: dir.join("error.md"),
            gates_path: dir.join("gates.json"),
            dir,
        }
    }
}

/// Writes artifacts for one iteration.
pub struct IterationLog<'a> {
    fs: &'a dyn ProjectFs,
    paths: IterationPaths,
}

impl<'a> IterationLog<'a> {
    pub fn new(fs: &'a dyn ProjectFs, iteration: u32) -> Self {
        Self {
            fs,
            paths: IterationPaths::new(iteration),
        }
    }

    pub fn write_prompt(&self, prompt: &str) -> Result<()> {
        self.fs.mkdir(&self.paths.dir)?;
        self.fs.write_file(&self.paths.prompt_path, prompt)
    }

    pub fn write_response(&self, response: &str) -> Result<()> {
        self.fs.write_file(&self.paths.response_path, response)
    }

    pub fn write_error(&self, message: &str) -> Result<()> {
        self.fs
            .write_file(&self.paths.error_path, &format!("{message}\n"))
    }

    pub fn write_gates(&self, run: &GatesRunResult) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(run).context("serialize gate results")?;
        buf.push('\n');
        self.fs.write_file(&self.paths.gates_path, &buf)
    }
}
