//! Ralph: an iterative agent loop for building a project from one task.
//!
//! Each iteration re-reads the loop state from `.ralph/`, renders a prompt,
//! calls an external agent, and records a bounded summary. When the agent
//! claims the work is done, objective gates decide whether to accept that
//! claim or feed the failures back into the next iteration.
//!
//! - **[`core`]**: Pure logic (prompt rendering, progress parsing, state
//!   transitions). No I/O.
//! - **[`io`]**: Side-effecting collaborators (filesystem, agent process,
//!   build, git, config). Behind traits so tests can script them.
//! - **[`gates`]**: Completion gates and the runner that aggregates them.
//!
//! Orchestration modules ([`step`], [`looping`], [`lifecycle`]) wire core
//! logic to I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod gates;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
