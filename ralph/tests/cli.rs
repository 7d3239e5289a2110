//! CLI tests: spawn the ralph binary and check exit codes and output.

use std::path::Path;
use std::process::{Command, Output};

use ralph::core::layout;
use ralph::exit_codes;
use ralph::gates::builtin::APP_EXISTS;
use ralph::io::config::{RalphConfig, write_config};
use ralph::io::fs::LocalFs;

fn ralph(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn ralph")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Restrict the project to the `app-exists` gate, optionally with a custom agent.
fn configure(root: &Path, agent_script: Option<&str>) {
    let mut cfg = RalphConfig::default();
    cfg.loop_.iteration_delay_ms = 0;
    cfg.gates.enabled = vec![APP_EXISTS.to_string()];
    if let Some(script) = agent_script {
        cfg.agent.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
    }
    write_config(&LocalFs::new(root), &cfg).expect("write config");
}

#[test]
fn init_twice_requires_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = ralph(temp.path(), &["init", "build a todo list"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(layout::TASK_FILE).is_file());
    assert!(temp.path().join(layout::CONFIG_FILE).is_file());

    let second = ralph(temp.path(), &["init", "another task"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&second.stderr).contains("--force"));

    let forced = ralph(temp.path(), &["init", "another task", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
    let task = std::fs::read_to_string(temp.path().join(layout::TASK_FILE)).expect("task");
    assert_eq!(task, "another task");
}

#[test]
fn status_reports_fresh_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    ralph(temp.path(), &["init", "build a todo list"]);

    let output = ralph(temp.path(), &["status"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("iteration: 0"), "{text}");
    assert!(text.contains("status: idle"), "{text}");
    assert!(text.contains("task: build a todo list"), "{text}");
}

#[test]
fn gates_exit_code_tracks_entry_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    ralph(temp.path(), &["init", "build a todo list"]);
    configure(temp.path(), None);

    let failing = ralph(temp.path(), &["gates"]);
    assert_eq!(failing.status.code(), Some(exit_codes::GATES_FAILED));
    let text = stdout(&failing);
    assert!(text.contains("### app-exists"), "{text}");
    assert!(
        text.contains("FAIL app-exists: The application entry file exists"),
        "{text}"
    );

    std::fs::create_dir_all(temp.path().join("src")).expect("mkdir");
    std::fs::write(temp.path().join("src/App.tsx"), "export default () => null;\n")
        .expect("write app");
    let passing = ralph(temp.path(), &["gates"]);
    assert_eq!(passing.status.code(), Some(exit_codes::OK));
}

#[test]
fn resume_only_accepts_waiting() {
    let temp = tempfile::tempdir().expect("tempdir");
    ralph(temp.path(), &["init", "build a todo list"]);

    let idle = ralph(temp.path(), &["resume"]);
    assert_eq!(idle.status.code(), Some(exit_codes::INVALID));

    std::fs::write(temp.path().join(layout::STATUS_FILE), "waiting").expect("status");
    let resumed = ralph(temp.path(), &["resume"]);
    assert_eq!(resumed.status.code(), Some(exit_codes::OK));
    let status = std::fs::read_to_string(temp.path().join(layout::STATUS_FILE)).expect("read");
    assert_eq!(status, "running");
}

#[test]
fn feedback_overwrites_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    ralph(temp.path(), &["init", "build a todo list"]);
    let output = ralph(temp.path(), &["feedback", "use a dark theme"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let feedback =
        std::fs::read_to_string(temp.path().join(layout::FEEDBACK_FILE)).expect("feedback");
    assert_eq!(feedback, "use a dark theme");
}

#[cfg(unix)]
#[test]
fn run_completes_with_shell_agent() {
    let temp = tempfile::tempdir().expect("tempdir");
    ralph(temp.path(), &["init", "build a todo list"]);
    configure(
        temp.path(),
        Some(
            "cat > /dev/null; mkdir -p src; echo 'export default () => null;' > src/App.tsx; \
             printf complete > .ralph/status.txt; echo 'created the app'",
        ),
    );

    let output = ralph(temp.path(), &["run", "--max-iterations", "3"]);
    let text = stdout(&output);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{text}");
    assert!(text.contains("iteration 1: complete"), "{text}");
    assert!(text.contains("1 iteration(s) run"), "{text}");

    let progress =
        std::fs::read_to_string(temp.path().join(layout::PROGRESS_FILE)).expect("progress");
    assert!(progress.contains("created the app"));
}

#[cfg(unix)]
#[test]
fn run_exhausts_budget_with_idle_agent() {
    let temp = tempfile::tempdir().expect("tempdir");
    ralph(temp.path(), &["init", "build a todo list"]);
    configure(temp.path(), Some("cat > /dev/null; echo 'still thinking'"));

    let output = ralph(temp.path(), &["run", "--max-iterations", "2"]);
    assert_eq!(output.status.code(), Some(exit_codes::BUDGET_EXHAUSTED));
    let status = std::fs::read_to_string(temp.path().join(layout::STATUS_FILE)).expect("read");
    assert_eq!(status, "idle");
}
