//! Orchestration for a single loop iteration.

use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::context::ContextBuilder;
use crate::core::layout;
use crate::core::progress::{render_entry, summarize};
use crate::core::transitions::{AfterCall, after_call, after_gates};
use crate::core::types::{GatesRunResult, LoopStatus};
use crate::gates::builtin::registry;
use crate::gates::{Gate, Project, generate_feedback, run_all};
use crate::io::agent::Agent;
use crate::io::build::Builder;
use crate::io::config::RalphConfig;
use crate::io::fs::ProjectFs;
use crate::io::git::SourceControl;
use crate::io::iteration_log::IterationLog;
use crate::io::state_store::StateStore;

/// Everything an iteration talks to, assembled once per invocation.
pub struct LoopEnv<'a> {
    fs: &'a dyn ProjectFs,
    agent: &'a dyn Agent,
    builder: Option<&'a dyn Builder>,
    scm: Option<&'a dyn SourceControl>,
    gates: Vec<Box<dyn Gate>>,
    config: RalphConfig,
    context: ContextBuilder,
}

impl<'a> LoopEnv<'a> {
    /// Environment with the configured built-in gates and no build or
    /// source-control collaborator.
    pub fn new(fs: &'a dyn ProjectFs, agent: &'a dyn Agent, config: RalphConfig) -> Result<Self> {
        let context = ContextBuilder::new(config.loop_.recent_progress_entries)?;
        Ok(Self {
            fs,
            agent,
            builder: None,
            scm: None,
            gates: registry(&config.gates),
            config,
            context,
        })
    }

    pub fn with_builder(mut self, builder: &'a dyn Builder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_source_control(mut self, scm: &'a dyn SourceControl) -> Self {
        self.scm = Some(scm);
        self
    }

    /// Replace the gate set.
    pub fn with_gates(mut self, gates: Vec<Box<dyn Gate>>) -> Self {
        self.gates = gates;
        self
    }

    pub fn config(&self) -> &RalphConfig {
        &self.config
    }

    /// Enabled gates, in the order they run.
    pub fn gates(&self) -> &[Box<dyn Gate>] {
        &self.gates
    }

    pub fn store(&self) -> StateStore<'a> {
        StateStore::new(self.fs)
    }

    /// Run the gate set once against the project.
    pub fn run_gates(&self) -> GatesRunResult {
        let mut project = Project::new(self.fs);
        if let Some(builder) = self.builder {
            project = project.with_builder(builder);
        }
        run_all(&self.gates, &project)
    }
}

/// What one iteration concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    /// The agent made progress without claiming completion.
    Continue,
    /// The agent claimed completion and every gate passed.
    Complete,
    /// The agent claimed completion; gate feedback was written and the loop goes on.
    GatesFailed,
    /// The loop is paused for a human.
    Waiting,
    /// Status was already terminal when the iteration began; the agent was not called.
    Halted(LoopStatus),
    /// The agent call failed. Status is now `error`.
    Failed { message: String },
}

impl StepVerdict {
    /// True when the loop must not run another iteration.
    pub fn stops_loop(&self) -> bool {
        !matches!(self, Self::Continue | Self::GatesFailed)
    }
}

/// Result of a periodic checkpoint attempt. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    NotDue,
    NotRepo,
    Committed,
    NothingToCommit,
    Failed(String),
}

/// Result of a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    pub verdict: StepVerdict,
    pub checkpoint: Checkpoint,
    /// Gate results when the agent claimed completion.
    pub gates: Option<GatesRunResult>,
}

impl StepOutcome {
    fn new(iteration: u32, verdict: StepVerdict) -> Self {
        Self {
            iteration,
            verdict,
            checkpoint: Checkpoint::NotDue,
            gates: None,
        }
    }
}

/// Execute one iteration.
///
/// Increments the counter before doing anything else, then re-reads the whole
/// state, so external edits between iterations are always honored. Only
/// failures to persist loop state are returned as `Err`; a failing agent call
/// is a [`StepVerdict::Failed`].
#[instrument(skip_all)]
pub fn run_step(env: &LoopEnv<'_>) -> Result<StepOutcome> {
    let store = env.store();
    let previous = store.read_iteration();
    let iteration = previous.checked_add(1).ok_or_else(|| {
        anyhow!(
            "iteration counter in {} is at its maximum ({previous})",
            layout::ITERATION_FILE
        )
    })?;
    store.write_iteration(iteration)?;

    let state = store.read();
    if state.status.halts_loop() {
        info!(iteration, status = %state.status, "status is terminal, not calling agent");
        return Ok(StepOutcome::new(iteration, StepVerdict::Halted(state.status)));
    }

    let prompt = env.context.build(&state, iteration)?;
    let log = env
        .config
        .loop_
        .log_iterations
        .then(|| IterationLog::new(env.fs, iteration));
    if let Some(log) = &log {
        record("prompt", log.write_prompt(&prompt));
    }

    info!(iteration, prompt_bytes = prompt.len(), "iteration started");
    let response = match env.agent.call(&prompt) {
        Ok(response) => response,
        Err(err) => {
            let message = format!("{err:#}");
            warn!(iteration, err = %message, "agent call failed");
            if let Some(log) = &log {
                record("error", log.write_error(&message));
            }
            store.write_status(LoopStatus::Error)?;
            store.append_progress(&render_entry(
                iteration,
                &timestamp(),
                &format!("Agent call failed: {message}"),
            ))?;
            return Ok(StepOutcome::new(iteration, StepVerdict::Failed { message }));
        }
    };
    if let Some(log) = &log {
        record("response", log.write_response(&response));
    }

    let summary = summarize(&response, env.config.loop_.summary_max_chars);
    store.append_progress(&render_entry(iteration, &timestamp(), &summary))?;
    let checkpoint = checkpoint(env, iteration);

    let mut outcome = StepOutcome::new(iteration, StepVerdict::Continue);
    outcome.checkpoint = checkpoint;
    match after_call(store.read_status()) {
        AfterCall::Continue => {
            // The agent may scribble idle/error into the status file; the loop owns those.
            store.write_status(LoopStatus::Running)?;
        }
        AfterCall::Waiting => {
            info!(iteration, "agent requested human input");
            outcome.verdict = StepVerdict::Waiting;
        }
        AfterCall::ClaimsCompletion => {
            info!(iteration, "agent claims completion, running gates");
            let run = env.run_gates();
            if let Some(log) = &log {
                record("gates", log.write_gates(&run));
            }
            if run.passed {
                store.write_feedback("")?;
                outcome.verdict = StepVerdict::Complete;
            } else {
                store.write_feedback(&generate_feedback(&run))?;
                outcome.verdict = StepVerdict::GatesFailed;
            }
            store.write_status(after_gates(run.passed))?;
            outcome.gates = Some(run);
        }
    }
    info!(iteration, verdict = ?outcome.verdict, "iteration finished");
    Ok(outcome)
}

fn checkpoint(env: &LoopEnv<'_>, iteration: u32) -> Checkpoint {
    let every = env.config.loop_.checkpoint_every;
    let Some(scm) = env.scm else {
        return Checkpoint::NotDue;
    };
    if every == 0 || iteration % every != 0 {
        return Checkpoint::NotDue;
    }
    if !scm.is_repo() {
        debug!(iteration, "project is not a repository, skipping checkpoint");
        return Checkpoint::NotRepo;
    }
    let cfg = &env.config.checkpoint;
    let message = format!("{}: checkpoint after iteration {iteration}", cfg.message_prefix);
    let result = scm
        .add_all()
        .and_then(|()| scm.commit(&message, &cfg.author));
    match result {
        Ok(true) => {
            info!(iteration, "checkpoint committed");
            Checkpoint::Committed
        }
        Ok(false) => Checkpoint::NothingToCommit,
        Err(err) => {
            warn!(iteration, err = %format!("{err:#}"), "checkpoint failed");
            Checkpoint::Failed(format!("{err:#}"))
        }
    }
}

fn record(artifact: &str, result: Result<()>) {
    if let Err(err) = result {
        warn!(artifact, err = %format!("{err:#}"), "failed to write iteration artifact");
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
