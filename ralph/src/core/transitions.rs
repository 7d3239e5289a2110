//! Loop state machine decisions.
//!
//! ```text
//! idle ──start──▶ running ──gates pass──▶ complete
//!                  │  ▲  ╲
//!   agent/human ───┘  │   ╲──agent call fails──▶ error
//!   sets waiting      │
//!                     └── gates fail (feedback written, status reset)
//! ```
//!
//! Only the controller applies these; the functions here just decide.

use crate::core::types::LoopStatus;

/// Why a loop invocation refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRefusal {
    /// Already accepted by the gates. Re-opening requires a forced init.
    AlreadyComplete,
    /// Paused for a human; the status must change externally first.
    Waiting,
}

/// Decide what status a loop invocation starts from.
pub fn start(status: LoopStatus) -> Result<LoopStatus, StartRefusal> {
    match status {
        LoopStatus::Complete => Err(StartRefusal::AlreadyComplete),
        LoopStatus::Waiting => Err(StartRefusal::Waiting),
        // `running` here means a previous invocation crashed or was killed mid-iteration;
        // `error` means a supervisor is restarting after an agent failure.
        LoopStatus::Idle | LoopStatus::Running | LoopStatus::Error => Ok(LoopStatus::Running),
    }
}

/// Human-initiated `resume`: only a paused or failed loop can be resumed.
pub fn resume(status: LoopStatus) -> Option<LoopStatus> {
    match status {
        LoopStatus::Waiting | LoopStatus::Error => Some(LoopStatus::Running),
        LoopStatus::Idle | LoopStatus::Running | LoopStatus::Complete => None,
    }
}

/// What to do with the status observed right after an agent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterCall {
    /// Keep iterating.
    Continue,
    /// The agent claims completion; the gates decide.
    ClaimsCompletion,
    /// Paused for a human.
    Waiting,
}

pub fn after_call(status: LoopStatus) -> AfterCall {
    match status {
        LoopStatus::Complete => AfterCall::ClaimsCompletion,
        LoopStatus::Waiting => AfterCall::Waiting,
        // An agent writing `idle`/`error` to the status file has no meaning of its own;
        // the loop keeps ownership of those transitions.
        LoopStatus::Idle | LoopStatus::Running | LoopStatus::Error => AfterCall::Continue,
    }
}

/// Status to persist once the gates have judged a completion claim.
pub fn after_gates(passed: bool) -> LoopStatus {
    if passed {
        LoopStatus::Complete
    } else {
        LoopStatus::Running
    }
}
