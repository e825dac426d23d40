//! Grouping of `*Thinking:` lines into collapsible containers.

use std::sync::LazyLock;

use regex::Regex;

use super::placeholders::{PlaceholderTable, TokenKind};
use super::render_simple;

static THINKING_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*Thinking:(.*)$").expect("valid thinking regex"));

const THOUGHT_ICON: &str = r#"<svg class="chatz-thought-icon" width="14" height="14" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><circle cx="12" cy="12" r="3"></circle><path d="M12 2v4m0 12v4M4.93 4.93l2.83 2.83m8.48 8.48l2.83 2.83M2 12h4m12 0h4M4.93 19.07l2.83-2.83m8.48-8.48l2.83-2.83"></path></svg>"#;

/// Consecutive thoughts, possibly separated by blank lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThoughtGroup {
    thoughts: Vec<String>,
}

impl ThoughtGroup {
    pub fn push(&mut self, thought: &str) {
        let thought = thought.trim();
        if !thought.is_empty() {
            self.thoughts.push(thought.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.thoughts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
    }

    pub fn label(&self) -> String {
        if self.thoughts.len() == 1 {
            "Thought".to_string()
        } else {
            format!("Thoughts ({})", self.thoughts.len())
        }
    }

    pub fn to_html(&self) -> String {
        let items: String = self
            .thoughts
            .iter()
            .map(|t| format!(r#"<div class="chatz-thought-item">{}</div>"#, render_simple(t)))
            .collect();
        format!(
            r#"<details open class="chatz-thought-container"><summary class="chatz-thought-header">{THOUGHT_ICON}<span>{label}</span></summary><div class="chatz-thought-list">{items}</div></details>"#,
            label = self.label(),
        )
    }
}

/// Replaces each run of thinking lines with a single thought token line.
///
/// Blank lines inside a run are dropped. Blank lines before ordinary
/// content are kept unless a thought line or a closed group intervened.
pub fn group_thoughts(text: &str, table: &mut PlaceholderTable) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut group = ThoughtGroup::default();
    let mut pending_blank: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if let Some(caps) = THINKING_LINE_RE.captures(line) {
            group.push(&caps[1]);
            pending_blank.clear();
        } else if line.trim().is_empty() {
            pending_blank.push(line);
        } else {
            if group.is_empty() {
                out.extend(pending_blank.drain(..).map(str::to_string));
            } else {
                out.push(close_group(&mut group, table));
                pending_blank.clear();
            }
            out.push(line.to_string());
        }
    }

    if !group.is_empty() {
        out.push(close_group(&mut group, table));
    }

    out.join("\n")
}

fn close_group(group: &mut ThoughtGroup, table: &mut PlaceholderTable) -> String {
    let closed = std::mem::take(group);
    table.insert(TokenKind::Thought, closed.to_html())
}
