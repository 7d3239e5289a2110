//! Objective validation of an agent's completion claim.
//!
//! A [`Gate`] is a narrow predicate over the project tree. Gates never see
//! each other's results, and [`run_all`] always runs every gate so the agent
//! gets the complete list of what is still wrong in one pass.

pub mod builtin;

use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::types::{GateResult, GatesRunResult, NamedGateResult};
use crate::io::build::{BuildReport, Builder};
use crate::io::fs::ProjectFs;

/// Used when a gate fails without saying why.
pub const MISSING_FEEDBACK: &str = "Gate failed without specific feedback.";

/// The project as seen by gates.
pub struct Project<'a> {
    pub fs: &'a dyn ProjectFs,
    builder: Option<&'a dyn Builder>,
}

impl<'a> Project<'a> {
    pub fn new(fs: &'a dyn ProjectFs) -> Self {
        Self { fs, builder: None }
    }

    pub fn with_builder(mut self, builder: &'a dyn Builder) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Build the project through the configured build collaborator.
    pub fn build(&self) -> Result<BuildReport> {
        let builder = self
            .builder
            .ok_or_else(|| anyhow!("no build command configured for this project"))?;
        builder.build()
    }
}

pub trait Gate {
    /// Unique, stable identifier (e.g. `app-exists`).
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str;

    fn check(&self, project: &Project<'_>) -> Result<GateResult>;
}

/// Run every gate in order and aggregate.
///
/// A gate that returns `Err` or panics is recorded as failing with the error
/// text as its feedback. Nothing short-circuits.
pub fn run_all(gates: &[Box<dyn Gate>], project: &Project<'_>) -> GatesRunResult {
    let mut results = Vec::with_capacity(gates.len());
    for gate in gates {
        let result = run_one(gate.as_ref(), project);
        debug!(gate = gate.name(), pass = result.pass, "gate checked");
        results.push(NamedGateResult {
            gate: gate.name().to_string(),
            result,
        });
    }
    let run = GatesRunResult::from_results(results);
    info!(
        passed = run.passed,
        failed = run.failures().count(),
        total = run.results.len(),
        "gates finished"
    );
    run
}

fn run_one(gate: &dyn Gate, project: &Project<'_>) -> GateResult {
    match catch_unwind(AssertUnwindSafe(|| gate.check(project))) {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            warn!(gate = gate.name(), err = %format!("{err:#}"), "gate errored");
            GateResult::fail(format!("Gate errored: {err:#}"))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(gate = gate.name(), panic = %message, "gate panicked");
            GateResult::fail(format!("Gate panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}

/// Render failing gates as itemized markdown, in registry order.
///
/// Returns an empty string when every gate passed.
pub fn generate_feedback(run: &GatesRunResult) -> String {
    run.failures()
        .map(|failure| {
            let body = failure
                .result
                .feedback
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(MISSING_FEEDBACK);
            format!("### {}\n\n{}", failure.gate, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
