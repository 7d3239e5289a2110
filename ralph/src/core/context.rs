//! Per-iteration prompt rendering.
//!
//! The prompt is rebuilt from [`LoopState`] and the iteration number every
//! time. Nothing from earlier prompts or agent conversations is carried over,
//! so context size stays bounded no matter how many iterations have run.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;

use crate::core::layout;
use crate::core::progress::recent_entries;
use crate::core::types::LoopState;

const ITERATION_TEMPLATE: &str = include_str!("../prompts/iteration.md");

const MISSING_TASK: &str = "No task description was found in .ralph/task.md. \
Write `waiting` to .ralph/status.txt and explain that a task is needed.";

/// Feedback bodies that are scaffolding rather than real feedback.
const FEEDBACK_PLACEHOLDERS: [&str; 4] = ["none", "none.", "n/a", "no feedback yet."];

/// A feedback file that is nothing but one unrendered template expression.
static TEMPLATE_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*\w+\s*\}\}$").expect("template placeholder regex is valid")
});

/// Renders the iteration prompt. Holds only the compiled template.
#[derive(Debug)]
pub struct ContextBuilder {
    env: Environment<'static>,
    recent_progress: usize,
}

impl ContextBuilder {
    /// `recent_progress` bounds how many progress entries are shown verbatim.
    pub fn new(recent_progress: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("iteration", ITERATION_TEMPLATE)
            .context("compile iteration template")?;
        Ok(Self {
            env,
            recent_progress,
        })
    }

    /// Render the prompt for `iteration` from `state`. Performs no I/O.
    pub fn build(&self, state: &LoopState, iteration: u32) -> Result<String> {
        let task = state.task.trim();
        let task = if task.is_empty() { MISSING_TASK } else { task };

        let progress: Vec<String> = recent_entries(&state.progress, self.recent_progress)
            .iter()
            .map(|entry| entry.render())
            .collect();

        let feedback = state.feedback.trim();
        let feedback = (!is_placeholder_feedback(feedback)).then_some(feedback);

        let template = self.env.get_template("iteration")?;
        let rendered = template
            .render(context! {
                iteration => iteration,
                task => task,
                progress => progress,
                feedback => feedback,
                status_path => layout::STATUS_FILE,
                progress_path => layout::PROGRESS_FILE,
            })
            .context("render iteration template")?;
        Ok(rendered)
    }
}

/// True when `feedback` carries nothing the agent should act on.
///
/// Catches empty files, markdown-heading or comment-only stubs, known
/// placeholder sentences and a lone unrendered template expression.
pub fn is_placeholder_feedback(feedback: &str) -> bool {
    let trimmed = feedback.trim();
    if trimmed.is_empty() {
        return true;
    }
    if TEMPLATE_ONLY_RE.is_match(trimmed) {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if FEEDBACK_PLACEHOLDERS.contains(&lowered.as_str()) {
        return true;
    }
    let without_comments = strip_html_comments(trimmed);
    without_comments
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .all(is_markdown_heading)
}

/// `# Title` or `##`, but not `#1 priority`.
fn is_markdown_heading(line: &str) -> bool {
    let rest = line.trim_start_matches('#');
    let level = line.len() - rest.len();
    (1..=6).contains(&level) && (rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn strip_html_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::render_entry;
    use crate::core::types::LoopStatus;

    fn state(progress: String, feedback: &str) -> LoopState {
        LoopState {
            task: "build a todo list".to_string(),
            progress,
            feedback: feedback.to_string(),
            iteration: 0,
            status: LoopStatus::Running,
        }
    }

    fn builder() -> ContextBuilder {
        ContextBuilder::new(3).expect("builder")
    }

    /// Verifies prompt sections appear in deterministic order.
    #[test]
    fn sections_render_in_order() {
        let progress = render_entry(1, "ts", "scaffolded app");
        let prompt = builder()
            .build(&state(progress, "app-exists failed"), 2)
            .expect("build");

        let header = prompt.find("# Iteration 2").expect("header");
        let task = prompt.find("## Task").expect("task");
        let progress = prompt.find("## Progress").expect("progress");
        let feedback = prompt.find("## Feedback").expect("feedback");
        let instructions = prompt.find("## Instructions").expect("instructions");
        assert!(header < task);
        assert!(task < progress);
        assert!(progress < feedback);
        assert!(feedback < instructions);
        assert!(prompt.contains("build a todo list"));
        assert!(prompt.contains("scaffolded app"));
        assert!(prompt.contains("app-exists failed"));
    }

    #[test]
    fn only_three_most_recent_entries_are_shown() {
        let progress: String = (1..=6)
            .map(|i| render_entry(i, "ts", &format!("did thing {i}")))
            .collect();
        let prompt = builder().build(&state(progress, ""), 7).expect("build");
        for hidden in 1..=3 {
            assert!(!prompt.contains(&format!("did thing {hidden}")));
        }
        for shown in 4..=6 {
            assert!(prompt.contains(&format!("did thing {shown}")));
        }
    }

    #[test]
    fn unparseable_progress_is_first_iteration() {
        let prompt = builder()
            .build(&state("random scribbles".to_string(), ""), 4)
            .expect("build");
        assert!(prompt.contains("This is the first iteration"));
        assert!(!prompt.contains("random scribbles"));
    }

    #[test]
    fn feedback_section_omitted_when_empty_or_placeholder() {
        let placeholders = [
            "",
            "  \n",
            "# Feedback\n",
            "<!-- write feedback here -->",
            "{{ feedback }}",
            "None.",
        ];
        for feedback in placeholders {
            let prompt = builder()
                .build(&state(String::new(), feedback), 1)
                .expect("build");
            assert!(!prompt.contains("## Feedback"), "feedback {feedback:?} leaked");
        }
    }

    #[test]
    fn empty_task_uses_fallback_message() {
        let mut s = state(String::new(), "");
        s.task = "   ".to_string();
        let prompt = builder().build(&s, 1).expect("build");
        assert!(prompt.contains("No task description was found"));
    }

    #[test]
    fn build_is_deterministic() {
        let s = state(render_entry(1, "ts", "x"), "fix it");
        let b = builder();
        assert_eq!(b.build(&s, 2).expect("a"), b.build(&s, 2).expect("b"));
    }

    #[test]
    fn placeholder_detection_keeps_real_feedback() {
        assert!(!is_placeholder_feedback("## app-exists\n\nsrc/App.tsx is missing"));
        assert!(!is_placeholder_feedback("please use tailwind"));
        assert!(is_placeholder_feedback("# Feedback\n\n<!-- none -->\n"));
        assert!(is_placeholder_feedback("{{feedback}}"));
    }

    #[test]
    fn braces_and_hash_prefixed_feedback_reach_the_prompt() {
        let real = [
            "Use style={{ padding: 8 }} on the list",
            "#1 priority: dark mode",
            "Render {{ count }} items in the footer",
        ];
        for feedback in real {
            let prompt = builder()
                .build(&state(String::new(), feedback), 2)
                .expect("build");
            let section = prompt.find("## Feedback").expect("feedback section");
            assert!(prompt[section..].contains(feedback), "feedback {feedback:?} dropped");
        }
    }
}
