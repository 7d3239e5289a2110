//! Ralph agent loop CLI.
//!
//! Keeps `.ralph/` state for one task and drives an external agent over it
//! until the completion gates accept the result.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use ralph::core::progress::parse_entries;
use ralph::core::types::LoopStatus;
use ralph::exit_codes;
use ralph::gates::builtin::BUILD_SUCCEEDS;
use ralph::gates::generate_feedback;
use ralph::io::agent::CommandAgent;
use ralph::io::build::CommandBuilder;
use ralph::io::config::{RalphConfig, load_config};
use ralph::io::fs::LocalFs;
use ralph::io::git::Git;
use ralph::io::state_store::{InitOptions, StateStore};
use ralph::lifecycle::{init_project, leave_feedback, resume};
use ralph::logging;
use ralph::looping::{LoopOutcome, LoopStop, run_loop};
use ralph::step::{Checkpoint, LoopEnv, StepOutcome, StepVerdict};

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Iterative agent loop with objective completion gates"
)]
struct Cli {
    /// Project directory containing `.ralph/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.ralph/` state for a new task.
    Init {
        /// What the agent should build.
        task: String,
        /// Discard existing state.
        #[arg(short, long)]
        force: bool,
        /// Mark the loop running right away.
        #[arg(long)]
        start: bool,
    },
    /// Run iterations until complete, waiting, failed, or out of budget.
    Run {
        /// Override `loop.max_iterations`.
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Run exactly one iteration.
    Step,
    /// Show the current loop state.
    Status,
    /// Run the enabled gates now and print their feedback.
    Gates,
    /// Replace the feedback the next iteration sees.
    Feedback { text: String },
    /// Continue a waiting or errored loop.
    Resume,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let fs = LocalFs::new(&cli.root);
    match cli.command {
        Command::Init { task, force, start } => {
            let report = init_project(&fs, &task, InitOptions { force, start })?;
            println!("initialized {}", cli.root.join(".ralph").display());
            if report.config_written {
                println!("wrote default config to .ralph/config.toml");
            }
            Ok(exit_codes::OK)
        }
        Command::Run { max_iterations } => {
            let cfg = load_config(&fs)?;
            let budget = max_iterations.unwrap_or(cfg.loop_.max_iterations);
            cmd_loop(&cli.root, &fs, cfg, budget, false)
        }
        Command::Step => {
            let cfg = load_config(&fs)?;
            cmd_loop(&cli.root, &fs, cfg, 1, true)
        }
        Command::Status => cmd_status(&cli.root, &fs),
        Command::Gates => cmd_gates(&cli.root, &fs),
        Command::Feedback { text } => {
            leave_feedback(&fs, &text)?;
            println!("feedback recorded");
            Ok(exit_codes::OK)
        }
        Command::Resume => {
            let status = resume(&fs)?;
            println!("status: {status}");
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_loop(root: &Path, fs: &LocalFs, cfg: RalphConfig, budget: u32, single: bool) -> Result<i32> {
    let agent = CommandAgent::new(root, &cfg.agent);
    let builder = CommandBuilder::new(root, &cfg.build);
    let git = Git::new(root);
    let build_gate = cfg.gates.enabled.iter().any(|name| name == BUILD_SUCCEEDS);

    let mut env = LoopEnv::new(fs, &agent, cfg)?.with_source_control(&git);
    if build_gate {
        env = env.with_builder(&builder);
    }

    let outcome = run_loop(&env, budget, print_step)?;
    print_report(&outcome);
    Ok(match outcome.stop {
        LoopStop::Complete | LoopStop::AlreadyComplete => exit_codes::OK,
        LoopStop::Waiting => exit_codes::WAITING,
        LoopStop::Error { .. } => exit_codes::INVALID,
        LoopStop::BudgetExhausted { .. } if single => exit_codes::OK,
        LoopStop::BudgetExhausted { .. } => exit_codes::BUDGET_EXHAUSTED,
    })
}

fn print_step(step: &StepOutcome) {
    let verdict = match &step.verdict {
        StepVerdict::Continue => "continuing".to_string(),
        StepVerdict::Complete => "complete, all gates passed".to_string(),
        StepVerdict::GatesFailed => {
            let failed = step.gates.as_ref().map_or(0, |run| run.failures().count());
            format!("completion rejected, {failed} gate(s) failed")
        }
        StepVerdict::Waiting => "waiting for input".to_string(),
        StepVerdict::Halted(status) => format!("not run, status is {status}"),
        StepVerdict::Failed { message } => format!("agent call failed: {message}"),
    };
    println!("iteration {}: {verdict}", step.iteration);
    match &step.checkpoint {
        Checkpoint::Committed => println!("  checkpoint committed"),
        Checkpoint::Failed(message) => println!("  warning: checkpoint failed: {message}"),
        Checkpoint::NotDue | Checkpoint::NotRepo | Checkpoint::NothingToCommit => {}
    }
}

fn print_report(outcome: &LoopOutcome) {
    let message = match &outcome.stop {
        LoopStop::Complete => "complete".to_string(),
        LoopStop::AlreadyComplete => "already complete".to_string(),
        LoopStop::Waiting => {
            "waiting for input (answer, then run `ralph resume`)".to_string()
        }
        LoopStop::Error { message } => format!("error: {message}"),
        LoopStop::BudgetExhausted { max_iterations } => {
            format!("iteration budget of {max_iterations} exhausted")
        }
    };
    println!(
        "{message}: {} iteration(s) run, iteration {}, status {}",
        outcome.iterations_run,
        outcome.final_iteration,
        outcome.final_status()
    );
}

fn cmd_status(root: &Path, fs: &LocalFs) -> Result<i32> {
    let store = StateStore::new(fs);
    if !store.is_initialized() {
        println!("no loop state in {} (run `ralph init`)", root.display());
        return Ok(exit_codes::INVALID);
    }
    let state = store.read();
    println!("iteration: {}", state.iteration);
    println!("status: {}", state.status);
    let task_head = state.task.lines().find(|line| !line.trim().is_empty());
    println!("task: {}", task_head.unwrap_or("(none)").trim());
    match parse_entries(&state.progress).last() {
        Some(entry) => println!("latest progress:\n{}", entry.render()),
        None => println!("latest progress: (none)"),
    }
    let feedback = if state.feedback.trim().is_empty() {
        "none"
    } else {
        "pending"
    };
    println!("feedback: {feedback}");

    let git = Git::new(root);
    if let Ok(entries) = git.status_porcelain() {
        println!("uncommitted changes: {}", entries.len());
    }
    Ok(match state.status {
        LoopStatus::Waiting => exit_codes::WAITING,
        _ => exit_codes::OK,
    })
}

fn cmd_gates(root: &Path, fs: &LocalFs) -> Result<i32> {
    let cfg = load_config(fs)?;
    let agent = CommandAgent::new(root, &cfg.agent);
    let builder = CommandBuilder::new(root, &cfg.build);
    let env = LoopEnv::new(fs, &agent, cfg)?.with_builder(&builder);

    let run = env.run_gates();
    for (gate, result) in env.gates().iter().zip(&run.results) {
        let mark = if result.result.pass { "pass" } else { "FAIL" };
        println!("{mark} {}: {}", result.gate, gate.description());
    }
    if run.passed {
        println!("all {} gate(s) passed", run.results.len());
        return Ok(exit_codes::OK);
    }
    println!("\n{}", generate_feedback(&run));
    Ok(exit_codes::GATES_FAILED)
}
