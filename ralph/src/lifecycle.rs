//! Human-driven lifecycle commands: `init`, `resume`, `feedback`.
//!
//! The loop itself never calls these. They are how a person sets a loop up,
//! answers a `waiting` pause, or steers the next iteration.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::core::layout;
use crate::core::transitions;
use crate::core::types::LoopStatus;
use crate::io::config::{RalphConfig, write_config};
use crate::io::fs::ProjectFs;
use crate::io::state_store::{InitOptions, StateStore};

const STATE_GITIGNORE: &str = "iterations/\n";

/// What `init_project` wrote besides the state files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    /// A default `config.toml` was created (an existing one is never replaced).
    pub config_written: bool,
}

/// Create `.ralph/` for `task`.
///
/// Refuses to touch existing state unless `options.force` is set. A forced
/// init discards progress and feedback but keeps a hand-edited config.
pub fn init_project(fs: &dyn ProjectFs, task: &str, options: InitOptions) -> Result<InitReport> {
    StateStore::new(fs).init(task, options)?;
    fs.write_file(Path::new(layout::GITIGNORE_FILE), STATE_GITIGNORE)?;

    let config_written = !fs.exists(Path::new(layout::CONFIG_FILE));
    if config_written {
        write_config(fs, &RalphConfig::default())?;
    }
    info!(config_written, "project initialized");
    Ok(InitReport { config_written })
}

/// A `resume` against a loop that is neither paused nor failed.
#[derive(Debug, thiserror::Error)]
#[error("loop is {0}; only a waiting or errored loop can be resumed")]
pub struct NotResumable(pub LoopStatus);

/// Move a `waiting` or `error` loop back to `running`.
pub fn resume(fs: &dyn ProjectFs) -> Result<LoopStatus> {
    let store = StateStore::new(fs);
    let current = store.read_status();
    let next = transitions::resume(current).ok_or(NotResumable(current))?;
    store.write_status(next)?;
    info!(from = %current, to = %next, "loop resumed");
    Ok(next)
}

/// Replace the feedback the next iteration will see.
pub fn leave_feedback(fs: &dyn ProjectFs, text: &str) -> Result<()> {
    StateStore::new(fs).write_feedback(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;
    use crate::test_support::MemoryFs;

    #[test]
    fn init_writes_gitignore_and_default_config() {
        let fs = MemoryFs::new();
        let report = init_project(&fs, "build a todo list", InitOptions::default()).expect("init");
        assert!(report.config_written);
        assert_eq!(fs.get(layout::GITIGNORE_FILE).as_deref(), Some("iterations/\n"));
        assert_eq!(load_config(&fs).expect("config"), RalphConfig::default());
    }

    #[test]
    fn forced_init_keeps_edited_config() {
        let fs = MemoryFs::new();
        init_project(&fs, "first", InitOptions::default()).expect("init");
        fs.insert(layout::CONFIG_FILE, "[loop]\nmax_iterations = 2\n");

        let report = init_project(
            &fs,
            "second",
            InitOptions {
                force: true,
                start: false,
            },
        )
        .expect("init");
        assert!(!report.config_written);
        assert_eq!(load_config(&fs).expect("config").loop_.max_iterations, 2);
        assert_eq!(StateStore::new(&fs).read().task, "second");
    }

    #[test]
    fn resume_only_from_waiting_or_error() {
        let fs = MemoryFs::new();
        init_project(&fs, "task", InitOptions::default()).expect("init");

        let err = resume(&fs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NotResumable>(),
            Some(NotResumable(LoopStatus::Idle))
        ));

        fs.insert(layout::STATUS_FILE, "waiting");
        assert_eq!(resume(&fs).expect("resume"), LoopStatus::Running);
        assert_eq!(StateStore::new(&fs).read_status(), LoopStatus::Running);
    }

    #[test]
    fn feedback_is_replaced() {
        let fs = MemoryFs::new();
        init_project(&fs, "task", InitOptions::default()).expect("init");
        leave_feedback(&fs, "use a dark theme\n").expect("feedback");
        leave_feedback(&fs, "  use tailwind  ").expect("feedback");
        assert_eq!(StateStore::new(&fs).read().feedback, "use tailwind");
    }
}
