//! Loop configuration stored under `.ralph/config.toml`.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::layout;
use crate::gates::builtin::GATE_NAMES;
use crate::io::fs::ProjectFs;

/// Loop configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that work for a typical web app project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RalphConfig {
    #[serde(rename = "loop")]
    pub loop_: LoopConfig,
    pub agent: AgentConfig,
    pub build: BuildConfig,
    pub gates: GateConfig,
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Iteration budget for one `ralph run`.
    pub max_iterations: u32,
    /// Commit a checkpoint every N iterations. 0 disables checkpoints.
    pub checkpoint_every: u32,
    /// Pause between iterations.
    pub iteration_delay_ms: u64,
    /// Progress entries are cut to this many characters.
    pub summary_max_chars: usize,
    /// How many of the newest progress entries the prompt shows.
    pub recent_progress_entries: usize,
    /// Write prompt/response/gate artifacts under `.ralph/iterations/`.
    pub log_iterations: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            checkpoint_every: 5,
            iteration_delay_ms: 1_000,
            summary_max_chars: 500,
            recent_progress_entries: 3,
            log_iterations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent command. The prompt is written to stdin; stdout is the response.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Command that compiles the project (e.g. `["npm","run","build"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Cap on diagnostics quoted back to the agent.
    pub max_reported_errors: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 200_000,
            max_reported_errors: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Gates to run, by name. Registry order always wins over list order.
    pub enabled: Vec<String>,
    /// Main application source file that must exist and carry real content.
    pub entry_file: String,
    /// Directory scanned for disallowed declarations.
    pub source_dir: String,
    /// File extensions (without dot) scanned under `source_dir`.
    pub source_extensions: Vec<String>,
    /// Strings that only appear in untouched starter templates.
    pub scaffold_markers: Vec<String>,
    /// Minimum non-blank, non-comment lines in `entry_file`.
    pub min_content_lines: usize,
    /// Literal patterns that must not appear in generated source.
    pub disallowed_declarations: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: GATE_NAMES.iter().map(|name| name.to_string()).collect(),
            entry_file: "src/App.tsx".to_string(),
            source_dir: "src".to_string(),
            source_extensions: ["ts", "tsx", "js", "jsx"]
                .into_iter()
                .map(String::from)
                .collect(),
            scaffold_markers: [
                "Vite + React",
                "Edit <code>src/App.tsx</code> and save to test HMR",
                "Click on the Vite and React logos to learn more",
                "TODO: implement",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_content_lines: 10,
            disallowed_declarations: vec![
                "declare module".to_string(),
                "declare global".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckpointConfig {
    /// `Name <email>` passed to `git commit --author`.
    pub author: String,
    pub message_prefix: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            author: "Ralph <ralph@localhost>".to_string(),
            message_prefix: "chore(ralph)".to_string(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.loop_.max_iterations == 0 {
            return Err(anyhow!("loop.max_iterations must be > 0"));
        }
        if self.loop_.summary_max_chars == 0 {
            return Err(anyhow!("loop.summary_max_chars must be > 0"));
        }
        if self.loop_.recent_progress_entries == 0 {
            return Err(anyhow!("loop.recent_progress_entries must be > 0"));
        }
        validate_command("agent.command", &self.agent.command)?;
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.build_gate_enabled() {
            validate_command("build.command", &self.build.command)?;
            if self.build.timeout_secs == 0 {
                return Err(anyhow!("build.timeout_secs must be > 0"));
            }
        }
        for name in &self.gates.enabled {
            if !GATE_NAMES.contains(&name.as_str()) {
                return Err(anyhow!(
                    "gates.enabled: unknown gate '{name}' (known: {})",
                    GATE_NAMES.join(", ")
                ));
            }
        }
        if self.gates.entry_file.trim().is_empty() {
            return Err(anyhow!("gates.entry_file must not be empty"));
        }
        if self.checkpoint.author.trim().is_empty() {
            return Err(anyhow!("checkpoint.author must not be empty"));
        }
        Ok(())
    }

    fn build_gate_enabled(&self) -> bool {
        self.gates.enabled.iter().any(|name| name == "build-succeeds")
    }
}

fn validate_command(field: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{field} must be a non-empty array")),
    }
}

/// Load `.ralph/config.toml` through the project filesystem.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(fs: &dyn ProjectFs) -> Result<RalphConfig> {
    let path = Path::new(layout::CONFIG_FILE);
    if !fs.exists(path) {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs.read_file(path)?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", layout::CONFIG_FILE))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", layout::CONFIG_FILE))?;
    Ok(cfg)
}

/// Validate and write `.ralph/config.toml`.
pub fn write_config(fs: &dyn ProjectFs, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    fs.write_file(Path::new(layout::CONFIG_FILE), &buf)
}
