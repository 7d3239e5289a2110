//! Relative locations of every loop-owned artifact under the project root.

use std::path::PathBuf;

pub const STATE_DIR: &str = ".ralph";
pub const TASK_FILE: &str = ".ralph/task.md";
pub const PROGRESS_FILE: &str = ".ralph/progress.md";
pub const FEEDBACK_FILE: &str = ".ralph/feedback.md";
pub const ITERATION_FILE: &str = ".ralph/iteration.txt";
pub const STATUS_FILE: &str = ".ralph/status.txt";
pub const CONFIG_FILE: &str = ".ralph/config.toml";
pub const GITIGNORE_FILE: &str = ".ralph/.gitignore";
pub const ITERATIONS_DIR: &str = ".ralph/iterations";

/// Directory holding artifacts for iteration `n`.
pub fn iteration_dir(n: u32) -> PathBuf {
    PathBuf::from(ITERATIONS_DIR).join(n.to_string())
}
