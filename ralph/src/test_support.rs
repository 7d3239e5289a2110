//! Test doubles for the loop's collaborators.
//!
//! Enabled for unit tests and, through the `test-support` feature, for the
//! integration tests under `tests/`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::core::types::GateResult;
use crate::gates::{Gate, Project};
use crate::io::agent::Agent;
use crate::io::build::{BuildReport, Builder};
use crate::io::fs::ProjectFs;
use crate::io::git::SourceControl;

/// In-memory [`ProjectFs`]. Clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: Rc<RefCell<BTreeMap<PathBuf, String>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, contents: &str) {
        self.files
            .borrow_mut()
            .insert(PathBuf::from(path), contents.to_string());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.borrow().get(Path::new(path)).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl ProjectFs for MemoryFs {
    fn read_file(&self, path: &Path) -> Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("read {}: no such file", path.display()))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn append_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .borrow_mut()
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.borrow();
        files.contains_key(path) || files.keys().any(|file| file.starts_with(path))
    }

    fn mkdir(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|file| file.starts_with(dir) && file.as_path() != dir)
            .cloned()
            .collect())
    }
}

/// One scripted agent turn.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    /// Response text, or the error message the call fails with.
    pub response: Result<String, String>,
    /// Files the agent "writes" during the turn, as (path, contents).
    pub writes: Vec<(String, String)>,
}

impl ScriptedCall {
    pub fn respond(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            writes: Vec::new(),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            writes: Vec::new(),
        }
    }

    pub fn writing(mut self, path: &str, contents: &str) -> Self {
        self.writes.push((path.to_string(), contents.to_string()));
        self
    }

    /// Shorthand for writing `.ralph/status.txt`.
    pub fn setting_status(self, status: &str) -> Self {
        self.writing(crate::core::layout::STATUS_FILE, status)
    }
}

/// [`Agent`] that plays back a fixed script and records every prompt.
pub struct ScriptedAgent {
    fs: Box<dyn ProjectFs>,
    calls: RefCell<VecDeque<ScriptedCall>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(fs: impl ProjectFs + 'static, calls: Vec<ScriptedCall>) -> Self {
        Self {
            fs: Box::new(fs),
            calls: RefCell::new(calls.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn assert_drained(&self) {
        let remaining = self.calls.borrow().len();
        assert_eq!(remaining, 0, "{remaining} scripted agent calls were never made");
    }
}

impl Agent for ScriptedAgent {
    fn call(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let call = self
            .calls
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent has no more calls"))?;
        for (path, contents) in &call.writes {
            self.fs.write_file(Path::new(path), contents)?;
        }
        call.response.map_err(|message| anyhow!(message))
    }
}

/// [`Builder`] returning queued reports. The last report repeats.
pub struct FakeBuilder {
    reports: RefCell<VecDeque<BuildReport>>,
    builds: Cell<usize>,
}

impl FakeBuilder {
    pub fn new(reports: Vec<BuildReport>) -> Self {
        Self {
            reports: RefCell::new(reports.into()),
            builds: Cell::new(0),
        }
    }

    pub fn passing() -> Self {
        Self::new(vec![BuildReport {
            success: true,
            errors: Vec::new(),
        }])
    }

    pub fn builds(&self) -> usize {
        self.builds.get()
    }
}

impl Builder for FakeBuilder {
    fn build(&self) -> Result<BuildReport> {
        self.builds.set(self.builds.get() + 1);
        let mut reports = self.reports.borrow_mut();
        let report = if reports.len() > 1 {
            reports.pop_front()
        } else {
            reports.front().cloned()
        };
        report.ok_or_else(|| anyhow!("fake builder has no reports"))
    }
}

/// [`SourceControl`] that records commits instead of making them.
#[derive(Default)]
pub struct RecordingSourceControl {
    pub repo: bool,
    pub fail_commits: bool,
    commits: RefCell<Vec<(String, String)>>,
}

impl RecordingSourceControl {
    pub fn repo() -> Self {
        Self {
            repo: true,
            ..Self::default()
        }
    }

    pub fn not_a_repo() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            repo: true,
            fail_commits: true,
            ..Self::default()
        }
    }

    /// Recorded (message, author) pairs.
    pub fn commits(&self) -> Vec<(String, String)> {
        self.commits.borrow().clone()
    }
}

impl SourceControl for RecordingSourceControl {
    fn is_repo(&self) -> bool {
        self.repo
    }

    fn add_all(&self) -> Result<()> {
        Ok(())
    }

    fn commit(&self, message: &str, author: &str) -> Result<bool> {
        if self.fail_commits {
            return Err(anyhow!("git commit failed: index.lock exists"));
        }
        self.commits
            .borrow_mut()
            .push((message.to_string(), author.to_string()));
        Ok(true)
    }
}

/// Gate with a fixed verdict.
pub struct StaticGate {
    name: String,
    result: GateResult,
}

impl StaticGate {
    pub fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: GateResult::pass(),
        }
    }

    pub fn fail(name: &str, feedback: &str) -> Self {
        Self {
            name: name.to_string(),
            result: GateResult::fail(feedback),
        }
    }

    /// Fails without any feedback text.
    pub fn silent_fail(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: GateResult {
                pass: false,
                feedback: None,
            },
        }
    }
}

impl Gate for StaticGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "static test gate"
    }

    fn check(&self, _project: &Project<'_>) -> Result<GateResult> {
        Ok(self.result.clone())
    }
}
