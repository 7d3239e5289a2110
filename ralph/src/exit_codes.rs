//! Stable exit codes for ralph CLI commands.

/// Command succeeded, or the loop ended `complete`.
pub const OK: i32 = 0;
/// Invalid state or config, a failed agent call, or any other error.
pub const INVALID: i32 = 1;
/// The loop is paused waiting for human input.
pub const WAITING: i32 = 2;
/// `ralph run` used its whole iteration budget without completing.
pub const BUDGET_EXHAUSTED: i32 = 3;
/// `ralph gates` found at least one failing gate.
pub const GATES_FAILED: i32 = 4;
