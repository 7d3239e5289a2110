//! Shared deterministic types for the loop core.
//!
//! These types define stable contracts between the state store, context
//! builder, gate runner and iteration controller. They carry no I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Disposition of the loop, persisted as plain text in `.ralph/status.txt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    /// Initialized, not yet started (also the state after budget exhaustion).
    #[default]
    Idle,
    /// Actively iterating.
    Running,
    /// Paused for a human. Not a failure.
    Waiting,
    /// Completion claimed and accepted by the gates.
    Complete,
    /// The agent call failed; a human or supervisor must restart.
    Error,
}

impl LoopStatus {
    pub const ALL: [LoopStatus; 5] = [
        LoopStatus::Idle,
        LoopStatus::Running,
        LoopStatus::Waiting,
        LoopStatus::Complete,
        LoopStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LoopStatus::Idle => "idle",
            LoopStatus::Running => "running",
            LoopStatus::Waiting => "waiting",
            LoopStatus::Complete => "complete",
            LoopStatus::Error => "error",
        }
    }

    /// Parse persisted text, falling back to `Idle` for anything unrecognized.
    ///
    /// Status files are edited by hand, so unknown text never fails a read.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    /// True for statuses that end a loop invocation when observed mid-run.
    pub fn halts_loop(self) -> bool {
        matches!(self, LoopStatus::Complete | LoopStatus::Waiting)
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the strict `FromStr` parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown loop status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for LoopStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        LoopStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.trim().to_string()))
    }
}

/// Snapshot of all persisted loop state, rebuilt from disk every iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    /// Original request. Written once at init.
    pub task: String,
    /// Append-only progress log.
    pub progress: String,
    /// Most recent actionable feedback. Empty means none.
    pub feedback: String,
    /// Number of iteration attempts made so far.
    pub iteration: u32,
    pub status: LoopStatus,
}

/// Outcome of a single gate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub pass: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl GateResult {
    pub fn pass() -> Self {
        Self {
            pass: true,
            feedback: None,
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            pass: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// One entry of a gate run, in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedGateResult {
    pub gate: String,
    #[serde(flatten)]
    pub result: GateResult,
}

/// Aggregate of a full gate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatesRunResult {
    /// AND of every gate's `pass`.
    pub passed: bool,
    pub results: Vec<NamedGateResult>,
}

impl GatesRunResult {
    pub fn from_results(results: Vec<NamedGateResult>) -> Self {
        let passed = results.iter().all(|r| r.result.pass);
        Self { passed, results }
    }

    pub fn failures(&self) -> impl Iterator<Item = &NamedGateResult> {
        self.results.iter().filter(|r| !r.result.pass)
    }
}
