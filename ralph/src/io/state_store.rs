//! Persistence of [`LoopState`] as one file per field under `.ralph/`.
//!
//! Each writer touches exactly one file, so a torn or failed write of one field
//! never affects another. Reads are total: a missing or unreadable file is the
//! field's default.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::layout;
use crate::core::types::{LoopState, LoopStatus};
use crate::io::fs::ProjectFs;

/// Typed store failures a caller may branch on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("loop state already exists in {dir} (use --force to discard it)")]
    AlreadyInitialized { dir: String },
}

/// Options for [`StateStore::init`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Discard any existing state.
    pub force: bool,
    /// Write `running` instead of `idle`, for callers that start a loop right away.
    pub start: bool,
}

const STATE_FILES: [&str; 5] = [
    layout::TASK_FILE,
    layout::PROGRESS_FILE,
    layout::FEEDBACK_FILE,
    layout::ITERATION_FILE,
    layout::STATUS_FILE,
];

pub struct StateStore<'a> {
    fs: &'a dyn ProjectFs,
}

impl<'a> StateStore<'a> {
    pub fn new(fs: &'a dyn ProjectFs) -> Self {
        Self { fs }
    }

    /// True if any state file exists.
    pub fn is_initialized(&self) -> bool {
        STATE_FILES.iter().any(|file| self.fs.exists(Path::new(file)))
    }

    /// Write fresh state for `task`.
    ///
    /// Fails with [`StoreError::AlreadyInitialized`] if state exists and
    /// `options.force` is not set.
    pub fn init(&self, task: &str, options: InitOptions) -> Result<()> {
        if self.is_initialized() && !options.force {
            return Err(StoreError::AlreadyInitialized {
                dir: layout::STATE_DIR.to_string(),
            }
            .into());
        }
        let status = if options.start {
            LoopStatus::Running
        } else {
            LoopStatus::Idle
        };
        info!(force = options.force, %status, "initializing loop state");

        self.fs.mkdir(Path::new(layout::STATE_DIR))?;
        self.write(layout::TASK_FILE, task)?;
        self.write(layout::PROGRESS_FILE, "")?;
        self.write(layout::FEEDBACK_FILE, "")?;
        self.write_iteration(0)?;
        self.write_status(status)
    }

    /// Reconstruct the full state from disk. Never fails.
    pub fn read(&self) -> LoopState {
        let state = LoopState {
            task: self.read_text(layout::TASK_FILE),
            progress: self.read_text(layout::PROGRESS_FILE),
            feedback: self.read_text(layout::FEEDBACK_FILE),
            iteration: self.read_iteration(),
            status: self.read_status(),
        };
        debug!(iteration = state.iteration, status = %state.status, "loop state read");
        state
    }

    pub fn read_status(&self) -> LoopStatus {
        LoopStatus::parse_lenient(&self.read_text(layout::STATUS_FILE))
    }

    pub fn read_iteration(&self) -> u32 {
        self.read_text(layout::ITERATION_FILE)
            .trim()
            .parse()
            .unwrap_or(0)
    }

    pub fn write_iteration(&self, n: u32) -> Result<()> {
        self.write(layout::ITERATION_FILE, &n.to_string())
    }

    pub fn append_progress(&self, entry: &str) -> Result<()> {
        debug!(bytes = entry.len(), "appending progress entry");
        self.fs
            .append_file(Path::new(layout::PROGRESS_FILE), entry)
            .with_context(|| format!("append {}", layout::PROGRESS_FILE))
    }

    pub fn write_feedback(&self, text: &str) -> Result<()> {
        self.write(layout::FEEDBACK_FILE, text)
    }

    pub fn write_status(&self, status: LoopStatus) -> Result<()> {
        debug!(%status, "writing status");
        self.write(layout::STATUS_FILE, status.as_str())
    }

    fn write(&self, file: &str, contents: &str) -> Result<()> {
        self.fs
            .write_file(Path::new(file), contents)
            .with_context(|| format!("write {file}"))
    }

    fn read_text(&self, file: &str) -> String {
        match self.fs.read_file(Path::new(file)) {
            Ok(text) => text,
            Err(err) => {
                debug!(file, err = %err, "state file unreadable, using default");
                String::new()
            }
        }
    }
}
