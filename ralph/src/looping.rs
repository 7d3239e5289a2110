//! Multi-iteration driver for `ralph run`.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::transitions::{StartRefusal, start};
use crate::core::types::LoopStatus;
use crate::step::{LoopEnv, StepOutcome, StepVerdict, run_step};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The gates accepted the agent's completion claim.
    Complete,
    /// Status was already `complete`; nothing ran.
    AlreadyComplete,
    /// Paused for human input.
    Waiting,
    /// The agent call failed; status is `error`.
    Error { message: String },
    /// The iteration budget ran out; status is `idle`.
    BudgetExhausted { max_iterations: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Iterations executed by this invocation.
    pub iterations_run: u32,
    /// Value of the iteration counter when the loop stopped.
    pub final_iteration: u32,
    pub stop: LoopStop,
}

impl LoopOutcome {
    pub fn final_status(&self) -> LoopStatus {
        match self.stop {
            LoopStop::Complete | LoopStop::AlreadyComplete => LoopStatus::Complete,
            LoopStop::Waiting => LoopStatus::Waiting,
            LoopStop::Error { .. } => LoopStatus::Error,
            LoopStop::BudgetExhausted { .. } => LoopStatus::Idle,
        }
    }
}

/// Run iterations until the loop settles or `max_iterations` have run.
///
/// `on_step` sees every iteration as it finishes. Returns `Err` only when the
/// loop state itself cannot be persisted.
pub fn run_loop<F: FnMut(&StepOutcome)>(
    env: &LoopEnv<'_>,
    max_iterations: u32,
    mut on_step: F,
) -> Result<LoopOutcome> {
    let store = env.store();
    let stop_now = |iterations_run, stop| LoopOutcome {
        iterations_run,
        final_iteration: store.read_iteration(),
        stop,
    };

    match start(store.read_status()) {
        Ok(status) => store.write_status(status)?,
        Err(StartRefusal::AlreadyComplete) => {
            info!("loop already complete");
            return Ok(stop_now(0, LoopStop::AlreadyComplete));
        }
        Err(StartRefusal::Waiting) => {
            info!("loop is waiting for input");
            return Ok(stop_now(0, LoopStop::Waiting));
        }
    }

    let delay = Duration::from_millis(env.config().loop_.iteration_delay_ms);
    let mut iterations_run = 0u32;
    while iterations_run < max_iterations {
        let step = run_step(env)?;
        iterations_run += 1;
        on_step(&step);

        let stop = match step.verdict {
            StepVerdict::Continue | StepVerdict::GatesFailed => None,
            StepVerdict::Complete | StepVerdict::Halted(LoopStatus::Complete) => {
                Some(LoopStop::Complete)
            }
            StepVerdict::Waiting | StepVerdict::Halted(_) => Some(LoopStop::Waiting),
            StepVerdict::Failed { message } => Some(LoopStop::Error { message }),
        };
        if let Some(stop) = stop {
            info!(iterations_run, ?stop, "loop stopped");
            return Ok(stop_now(iterations_run, stop));
        }
        if !delay.is_zero() && iterations_run < max_iterations {
            thread::sleep(delay);
        }
    }

    warn!(max_iterations, "iteration budget exhausted");
    store.write_status(LoopStatus::Idle)?;
    Ok(stop_now(
        iterations_run,
        LoopStop::BudgetExhausted { max_iterations },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout;
    use crate::io::config::RalphConfig;
    use crate::io::state_store::{InitOptions, StateStore};
    use crate::test_support::{MemoryFs, ScriptedAgent, ScriptedCall, StaticGate};

    fn initialized() -> MemoryFs {
        let fs = MemoryFs::new();
        StateStore::new(&fs)
            .init("task", InitOptions::default())
            .expect("init");
        fs
    }

    fn config() -> RalphConfig {
        let mut cfg = RalphConfig::default();
        cfg.loop_.iteration_delay_ms = 0;
        cfg
    }

    #[test]
    fn stops_on_first_accepted_completion() {
        let fs = initialized();
        let agent = ScriptedAgent::new(
            fs.clone(),
            vec![ScriptedCall::respond("done").setting_status("complete")],
        );
        let env = LoopEnv::new(&fs, &agent, config())
            .expect("env")
            .with_gates(vec![Box::new(StaticGate::pass("ok"))]);

        let mut seen = Vec::new();
        let outcome = run_loop(&env, 5, |step| seen.push(step.iteration)).expect("loop");
        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(outcome.iterations_run, 1);
        assert_eq!(outcome.final_status(), LoopStatus::Complete);
        assert_eq!(seen, vec![1]);
        agent.assert_drained();
    }

    #[test]
    fn budget_exhaustion_leaves_idle() {
        let fs = initialized();
        let calls = (0..3).map(|i| ScriptedCall::respond(&format!("step {i}"))).collect();
        let agent = ScriptedAgent::new(fs.clone(), calls);
        let env = LoopEnv::new(&fs, &agent, config()).expect("env");

        let outcome = run_loop(&env, 3, |_| {}).expect("loop");
        assert_eq!(outcome.stop, LoopStop::BudgetExhausted { max_iterations: 3 });
        assert_eq!(outcome.iterations_run, 3);
        assert_eq!(outcome.final_iteration, 3);
        assert_eq!(env.store().read_status(), LoopStatus::Idle);
    }

    #[test]
    fn already_complete_runs_nothing() {
        let fs = initialized();
        fs.insert(layout::STATUS_FILE, "complete");
        let agent = ScriptedAgent::new(fs.clone(), Vec::new());
        let env = LoopEnv::new(&fs, &agent, config()).expect("env");

        let outcome = run_loop(&env, 5, |_| {}).expect("loop");
        assert_eq!(outcome.stop, LoopStop::AlreadyComplete);
        assert_eq!(outcome.iterations_run, 0);
        assert_eq!(env.store().read_iteration(), 0);
        assert_eq!(env.store().read_status(), LoopStatus::Complete);
    }

    #[test]
    fn waiting_refuses_to_start() {
        let fs = initialized();
        fs.insert(layout::STATUS_FILE, "waiting");
        let agent = ScriptedAgent::new(fs.clone(), Vec::new());
        let env = LoopEnv::new(&fs, &agent, config()).expect("env");

        let outcome = run_loop(&env, 5, |_| {}).expect("loop");
        assert_eq!(outcome.stop, LoopStop::Waiting);
        assert_eq!(agent.call_count(), 0);
    }

    #[test]
    fn gate_retry_consumes_budget() {
        let fs = initialized();
        let agent = ScriptedAgent::new(
            fs.clone(),
            vec![
                ScriptedCall::respond("done?").setting_status("complete"),
                ScriptedCall::respond("done?").setting_status("complete"),
            ],
        );
        let env = LoopEnv::new(&fs, &agent, config())
            .expect("env")
            .with_gates(vec![Box::new(StaticGate::fail("never", "still wrong"))]);

        let outcome = run_loop(&env, 2, |_| {}).expect("loop");
        assert_eq!(outcome.stop, LoopStop::BudgetExhausted { max_iterations: 2 });
        assert!(agent.prompts()[1].contains("still wrong"));
        assert_eq!(env.store().read_status(), LoopStatus::Idle);
    }

    #[test]
    fn errored_loop_restarts_as_running() {
        let fs = initialized();
        fs.insert(layout::STATUS_FILE, "error");
        fs.insert(layout::ITERATION_FILE, "4");
        let agent = ScriptedAgent::new(
            fs.clone(),
            vec![ScriptedCall::respond("back").setting_status("waiting")],
        );
        let env = LoopEnv::new(&fs, &agent, config()).expect("env");

        let outcome = run_loop(&env, 5, |_| {}).expect("loop");
        assert_eq!(outcome.stop, LoopStop::Waiting);
        assert_eq!(outcome.iterations_run, 1);
        assert_eq!(outcome.final_iteration, 5);
    }
}
