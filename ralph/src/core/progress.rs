//! Progress log entry format.
//!
//! `progress.md` is append-only markdown with one section per iteration:
//!
//! ```text
//! ## Iteration 3 (2026-10-14T09:30:00Z)
//!
//! <bounded summary of the agent response>
//! ```
//!
//! Anything before the first recognized heading is ignored. A log with no
//! recognized heading at all is treated as empty.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^## Iteration (\d+)\b[^\n]*$").expect("progress heading regex is valid")
});

const TRUNCATION_MARKER: &str = "\n[truncated]";

/// One parsed section of the progress log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry<'a> {
    pub iteration: u32,
    /// The full heading line.
    pub heading: &'a str,
    /// Section body with surrounding whitespace trimmed.
    pub body: &'a str,
}

impl ProgressEntry<'_> {
    /// Render the entry back to markdown (heading + body).
    pub fn render(&self) -> String {
        if self.body.is_empty() {
            return self.heading.to_string();
        }
        format!("{}\n\n{}", self.heading, self.body)
    }
}

/// Render a new progress section ready to append.
///
/// Heading lines inside `body` are quoted so they stay part of this entry.
pub fn render_entry(iteration: u32, timestamp: &str, body: &str) -> String {
    let body = HEADING_RE.replace_all(body.trim(), "> $0");
    format!("## Iteration {iteration} ({timestamp})\n\n{body}\n\n")
}

/// Bound an agent response to at most `max_chars` characters.
///
/// Cuts on a char boundary and marks the cut.
pub fn summarize(response: &str, max_chars: usize) -> String {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return "(agent returned no output)".to_string();
    }
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((cut, _)) => {
            let mut out = trimmed[..cut].trim_end().to_string();
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}

/// Split a progress log into its recognized entries, oldest first.
pub fn parse_entries(progress: &str) -> Vec<ProgressEntry<'_>> {
    let headings: Vec<_> = HEADING_RE.captures_iter(progress).collect();
    let mut entries = Vec::with_capacity(headings.len());
    for (i, caps) in headings.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(iteration) = caps.get(1).and_then(|m| m.as_str().parse().ok()) else {
            continue;
        };
        let end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(progress.len());
        entries.push(ProgressEntry {
            iteration,
            heading: whole.as_str().trim_end(),
            body: progress[whole.end()..end].trim(),
        });
    }
    entries
}

/// Return the newest `limit` entries, oldest of those first.
pub fn recent_entries(progress: &str, limit: usize) -> Vec<ProgressEntry<'_>> {
    let entries = parse_entries(progress);
    let skip = entries.len().saturating_sub(limit);
    entries.into_iter().skip(skip).collect()
}
