//! I/O collaborators for loop commands.

pub mod agent;
pub mod build;
pub mod config;
pub mod fs;
pub mod git;
pub mod iteration_log;
pub mod process;
pub mod state_store;
