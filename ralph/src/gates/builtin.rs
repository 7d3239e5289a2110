//! Compiled gate registry.
//!
//! Order here is the order gates run and report in. Configuration can switch
//! gates off but cannot reorder them.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::types::GateResult;
use crate::gates::{Gate, Project};
use crate::io::config::GateConfig;

pub const APP_EXISTS: &str = "app-exists";
pub const NO_SCAFFOLD_MARKERS: &str = "no-scaffold-markers";
pub const HAS_REAL_CONTENT: &str = "has-real-content";
pub const NO_DISALLOWED_DECLARATIONS: &str = "no-disallowed-declarations";
pub const BUILD_SUCCEEDS: &str = "build-succeeds";

pub const GATE_NAMES: [&str; 5] = [
    APP_EXISTS,
    NO_SCAFFOLD_MARKERS,
    HAS_REAL_CONTENT,
    NO_DISALLOWED_DECLARATIONS,
    BUILD_SUCCEEDS,
];

/// Findings quoted per gate before summarizing the rest.
const MAX_FINDINGS: usize = 20;

/// Instantiate the enabled gates, in registry order.
pub fn registry(config: &GateConfig) -> Vec<Box<dyn Gate>> {
    let entry = PathBuf::from(&config.entry_file);
    let all: Vec<Box<dyn Gate>> = vec![
        Box::new(AppExists {
            entry: entry.clone(),
        }),
        Box::new(NoScaffoldMarkers {
            entry: entry.clone(),
            markers: config.scaffold_markers.clone(),
        }),
        Box::new(HasRealContent {
            entry,
            min_lines: config.min_content_lines,
        }),
        Box::new(NoDisallowedDeclarations {
            source_dir: PathBuf::from(&config.source_dir),
            extensions: config.source_extensions.clone(),
            patterns: config.disallowed_declarations.clone(),
        }),
        Box::new(BuildSucceeds),
    ];
    all.into_iter()
        .filter(|gate| config.enabled.iter().any(|name| name == gate.name()))
        .collect()
}

/// Read the entry file, or produce the failing result explaining it is absent.
fn read_entry(project: &Project<'_>, entry: &Path) -> Result<Result<String, GateResult>> {
    if !project.fs.exists(entry) {
        return Ok(Err(GateResult::fail(format!(
            "{} does not exist yet, so it cannot be checked.",
            entry.display()
        ))));
    }
    Ok(Ok(project.fs.read_file(entry)?))
}

pub struct AppExists {
    entry: PathBuf,
}

impl Gate for AppExists {
    fn name(&self) -> &str {
        APP_EXISTS
    }

    fn description(&self) -> &str {
        "The application entry file exists"
    }

    fn check(&self, project: &Project<'_>) -> Result<GateResult> {
        if project.fs.exists(&self.entry) {
            return Ok(GateResult::pass());
        }
        Ok(GateResult::fail(format!(
            "Missing {}. Create the application entry file before claiming completion.",
            self.entry.display()
        )))
    }
}

pub struct NoScaffoldMarkers {
    entry: PathBuf,
    markers: Vec<String>,
}

impl Gate for NoScaffoldMarkers {
    fn name(&self) -> &str {
        NO_SCAFFOLD_MARKERS
    }

    fn description(&self) -> &str {
        "The entry file no longer contains starter-template text"
    }

    fn check(&self, project: &Project<'_>) -> Result<GateResult> {
        let contents = match read_entry(project, &self.entry)? {
            Ok(contents) => contents,
            Err(missing) => return Ok(missing),
        };
        let found: Vec<&str> = self
            .markers
            .iter()
            .map(String::as_str)
            .filter(|marker| !marker.is_empty() && contents.contains(marker))
            .collect();
        if found.is_empty() {
            return Ok(GateResult::pass());
        }
        let mut msg = format!(
            "{} still contains starter-template content. Replace it with the real app:\n",
            self.entry.display()
        );
        for marker in found {
            msg.push_str(&format!("- \"{marker}\"\n"));
        }
        Ok(GateResult::fail(msg.trim_end()))
    }
}

pub struct HasRealContent {
    entry: PathBuf,
    min_lines: usize,
}

impl Gate for HasRealContent {
    fn name(&self) -> &str {
        HAS_REAL_CONTENT
    }

    fn description(&self) -> &str {
        "The entry file has substantive code, not a placeholder"
    }

    fn check(&self, project: &Project<'_>) -> Result<GateResult> {
        let contents = match read_entry(project, &self.entry)? {
            Ok(contents) => contents,
            Err(missing) => return Ok(missing),
        };
        let lines = count_code_lines(&contents);
        if lines >= self.min_lines {
            return Ok(GateResult::pass());
        }
        Ok(GateResult::fail(format!(
            "{} has only {lines} lines of code (need at least {}). It looks like a placeholder; implement the actual functionality.",
            self.entry.display(),
            self.min_lines
        )))
    }
}

/// Count lines that are neither blank nor comment-only.
pub fn count_code_lines(source: &str) -> usize {
    let mut in_block = false;
    let mut count = 0;
    for line in source.lines().map(str::trim) {
        if in_block {
            if let Some(rest) = after_block_comment(line) {
                in_block = false;
                if has_code(rest) {
                    count += 1;
                }
            }
            continue;
        }
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.starts_with("/*") || line.starts_with("{/*") {
            match after_block_comment(line) {
                Some(rest) if has_code(rest) => count += 1,
                Some(_) => {}
                None => in_block = true,
            }
            continue;
        }
        count += 1;
    }
    count
}

fn after_block_comment(line: &str) -> Option<&str> {
    line.find("*/").map(|end| &line[end + 2..])
}

/// Text after a closing `*/`; a lone `}` closes a JSX comment.
fn has_code(rest: &str) -> bool {
    let rest = rest.trim();
    let rest = rest.strip_prefix('}').unwrap_or(rest).trim();
    !rest.is_empty() && !rest.starts_with("//")
}

pub struct NoDisallowedDeclarations {
    source_dir: PathBuf,
    extensions: Vec<String>,
    patterns: Vec<String>,
}

impl NoDisallowedDeclarations {
    fn scans(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

impl Gate for NoDisallowedDeclarations {
    fn name(&self) -> &str {
        NO_DISALLOWED_DECLARATIONS
    }

    fn description(&self) -> &str {
        "Generated source contains no disallowed declarations"
    }

    fn check(&self, project: &Project<'_>) -> Result<GateResult> {
        let mut findings = Vec::new();
        for path in project.fs.list_files(&self.source_dir)? {
            if !self.scans(&path) {
                continue;
            }
            let contents = project.fs.read_file(&path)?;
            for (idx, line) in contents.lines().enumerate() {
                for pattern in self.patterns.iter().filter(|p| !p.is_empty()) {
                    if line.contains(pattern.as_str()) {
                        findings.push(format!("{}:{}: {pattern}", path.display(), idx + 1));
                    }
                }
            }
        }
        if findings.is_empty() {
            return Ok(GateResult::pass());
        }
        let mut msg = String::from(
            "Remove these declarations; add real modules or typed imports instead:\n",
        );
        for finding in findings.iter().take(MAX_FINDINGS) {
            msg.push_str(&format!("- {finding}\n"));
        }
        if findings.len() > MAX_FINDINGS {
            msg.push_str(&format!("- ...and {} more\n", findings.len() - MAX_FINDINGS));
        }
        Ok(GateResult::fail(msg.trim_end()))
    }
}

pub struct BuildSucceeds;

impl Gate for BuildSucceeds {
    fn name(&self) -> &str {
        BUILD_SUCCEEDS
    }

    fn description(&self) -> &str {
        "The project builds without errors"
    }

    fn check(&self, project: &Project<'_>) -> Result<GateResult> {
        let report = project.build()?;
        if report.success {
            return Ok(GateResult::pass());
        }
        let mut msg = String::from("The build failed. Fix these errors:\n");
        for error in report.errors.iter().take(MAX_FINDINGS) {
            msg.push_str(&format!("- {error}\n"));
        }
        if report.errors.is_empty() {
            msg.push_str("- (the build reported no diagnostics)\n");
        }
        Ok(GateResult::fail(msg.trim_end()))
    }
}
