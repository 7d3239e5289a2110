//! Loop-level scenarios driven against a real project directory.
//!
//! The agent is scripted, but state lives on disk through `LocalFs`, so these
//! exercise the same file layout a real `ralph run` produces.

use ralph::core::progress::parse_entries;
use ralph::core::types::LoopStatus;
use ralph::gates::builtin::APP_EXISTS;
use ralph::io::config::RalphConfig;
use ralph::io::fs::LocalFs;
use ralph::io::state_store::{InitOptions, StateStore};
use ralph::lifecycle::init_project;
use ralph::looping::{LoopStop, run_loop};
use ralph::step::{LoopEnv, StepVerdict};
use ralph::test_support::{FakeBuilder, ScriptedAgent, ScriptedCall};

const TODO_APP: &str = r#"import { useState } from "react";

export default function App() {
  const [todos, setTodos] = useState<string[]>([]);
  const [draft, setDraft] = useState("");
  const add = () => {
    if (!draft.trim()) return;
    setTodos([...todos, draft.trim()]);
    setDraft("");
  };
  return (
    <main>
      <input value={draft} onChange={(e) => setDraft(e.target.value)} />
      <button onClick={add}>Add</button>
      <ul>{todos.map((t) => <li key={t}>{t}</li>)}</ul>
    </main>
  );
}
"#;

fn config() -> RalphConfig {
    let mut cfg = RalphConfig::default();
    cfg.loop_.iteration_delay_ms = 0;
    cfg
}

fn project() -> (tempfile::TempDir, LocalFs) {
    let temp = tempfile::tempdir().expect("tempdir");
    let fs = LocalFs::new(temp.path());
    init_project(&fs, "build a todo list", InitOptions::default()).expect("init");
    (temp, fs)
}

#[test]
fn happy_path_completes_in_one_iteration() {
    let (temp, fs) = project();
    let agent = ScriptedAgent::new(
        LocalFs::new(temp.path()),
        vec![
            ScriptedCall::respond("Built the todo app.")
                .writing("src/App.tsx", TODO_APP)
                .setting_status("complete"),
        ],
    );
    let builder = FakeBuilder::passing();
    let env = LoopEnv::new(&fs, &agent, config())
        .expect("env")
        .with_builder(&builder);

    let outcome = run_loop(&env, 10, |_| {}).expect("loop");
    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(outcome.iterations_run, 1);
    assert_eq!(builder.builds(), 1);

    let state = StateStore::new(&fs).read();
    assert_eq!(state.status, LoopStatus::Complete);
    assert_eq!(state.feedback, "");
    assert_eq!(parse_entries(&state.progress).len(), 1);
    assert!(temp.path().join(".ralph/iterations/1/gates.json").is_file());
    agent.assert_drained();
}

#[test]
fn gated_retry_feeds_back_missing_file() {
    let (temp, fs) = project();
    let mut cfg = config();
    cfg.gates.enabled = vec![APP_EXISTS.to_string()];
    let agent = ScriptedAgent::new(
        LocalFs::new(temp.path()),
        vec![
            ScriptedCall::respond("All done!").setting_status("complete"),
            ScriptedCall::respond("Created the entry file.")
                .writing("src/App.tsx", TODO_APP)
                .setting_status("complete"),
        ],
    );
    let env = LoopEnv::new(&fs, &agent, cfg).expect("env");

    let mut after_step = Vec::new();
    let outcome = run_loop(&env, 10, |step| {
        let state = StateStore::new(&fs).read();
        after_step.push((step.verdict.clone(), state.status, state.feedback));
    })
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(outcome.iterations_run, 2);

    let (verdict, status, feedback) = &after_step[0];
    assert_eq!(*verdict, StepVerdict::GatesFailed);
    assert_eq!(*status, LoopStatus::Running);
    assert!(feedback.contains("### app-exists"), "{feedback}");
    assert!(feedback.contains("src/App.tsx"), "{feedback}");
    assert_eq!(after_step[1].1, LoopStatus::Complete);

    assert!(agent.prompts()[1].contains("Missing src/App.tsx"));
    let state = StateStore::new(&fs).read();
    assert_eq!(parse_entries(&state.progress).len(), 2);
}

#[test]
fn waiting_on_third_iteration_pauses_the_loop() {
    let (temp, fs) = project();
    let agent = ScriptedAgent::new(
        LocalFs::new(temp.path()),
        vec![
            ScriptedCall::respond("set up vite"),
            ScriptedCall::respond("added list component"),
            ScriptedCall::respond("Should todos persist to localStorage?")
                .setting_status("waiting"),
        ],
    );
    let env = LoopEnv::new(&fs, &agent, config()).expect("env");

    let outcome = run_loop(&env, 10, |_| {}).expect("loop");
    assert_eq!(outcome.stop, LoopStop::Waiting);
    assert_eq!(outcome.iterations_run, 3);
    assert_eq!(outcome.final_iteration, 3);
    assert_eq!(StateStore::new(&fs).read_status(), LoopStatus::Waiting);
    agent.assert_drained();

    // A waiting loop does no work until someone changes the status.
    let again = run_loop(&env, 10, |_| {}).expect("loop");
    assert_eq!(again.stop, LoopStop::Waiting);
    assert_eq!(again.iterations_run, 0);
}

#[test]
fn agent_failure_stops_with_error_verbatim() {
    let (temp, fs) = project();
    let agent = ScriptedAgent::new(
        LocalFs::new(temp.path()),
        vec![
            ScriptedCall::respond("set up vite"),
            ScriptedCall::fail("agent exited with status Some(2): API key missing"),
            ScriptedCall::respond("never reached"),
        ],
    );
    let env = LoopEnv::new(&fs, &agent, config()).expect("env");

    let outcome = run_loop(&env, 10, |_| {}).expect("loop");
    assert_eq!(
        outcome.stop,
        LoopStop::Error {
            message: "agent exited with status Some(2): API key missing".to_string()
        }
    );
    assert_eq!(outcome.iterations_run, 2);
    assert_eq!(agent.call_count(), 2);

    let state = StateStore::new(&fs).read();
    assert_eq!(state.status, LoopStatus::Error);
    assert!(state.progress.contains("API key missing"));
}

#[test]
fn budget_is_respected_and_leaves_idle() {
    let (temp, fs) = project();
    let calls = (1..=4)
        .map(|n| ScriptedCall::respond(&format!("worked on part {n}")))
        .collect();
    let agent = ScriptedAgent::new(LocalFs::new(temp.path()), calls);
    let env = LoopEnv::new(&fs, &agent, config()).expect("env");

    let outcome = run_loop(&env, 4, |_| {}).expect("loop");
    assert_eq!(outcome.stop, LoopStop::BudgetExhausted { max_iterations: 4 });
    assert_eq!(outcome.iterations_run, 4);
    assert_eq!(StateStore::new(&fs).read_status(), LoopStatus::Idle);
    agent.assert_drained();
}

#[test]
fn already_complete_short_circuits() {
    let (temp, fs) = project();
    StateStore::new(&fs)
        .write_status(LoopStatus::Complete)
        .expect("status");
    let agent = ScriptedAgent::new(LocalFs::new(temp.path()), Vec::new());
    let env = LoopEnv::new(&fs, &agent, config()).expect("env");

    let outcome = run_loop(&env, 5, |_| {}).expect("loop");
    assert_eq!(outcome.stop, LoopStop::AlreadyComplete);
    assert_eq!(outcome.iterations_run, 0);
    assert_eq!(StateStore::new(&fs).read_iteration(), 0);
}

#[test]
fn iteration_counter_and_progress_grow_across_invocations() {
    let (temp, fs) = project();
    let calls = (1..=5)
        .map(|n| ScriptedCall::respond(&format!("step {n}")))
        .collect();
    let agent = ScriptedAgent::new(LocalFs::new(temp.path()), calls);
    let env = LoopEnv::new(&fs, &agent, config()).expect("env");

    run_loop(&env, 2, |_| {}).expect("first run");
    run_loop(&env, 3, |_| {}).expect("second run");

    let state = StateStore::new(&fs).read();
    assert_eq!(state.iteration, 5);
    let numbers: Vec<u32> = parse_entries(&state.progress)
        .iter()
        .map(|entry| entry.iteration)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert!(agent.prompts()[4].contains("step 4"));
    assert!(!agent.prompts()[4].contains("step 1"));
}
