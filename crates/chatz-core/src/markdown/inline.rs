//! Code, bold and italic transforms over already-escaped text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::placeholders::{PlaceholderTable, TokenKind};

static FENCED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").expect("valid fenced code regex"));
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid inline code regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid bold regex"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("valid italic regex"));

/// Applies fenced code, inline code, bold, then italic.
///
/// Code spans are swapped for [`TokenKind::Code`] tokens as soon as they
/// are matched, so later transforms never see their contents. Callers
/// restore those tokens.
pub fn apply_inline(escaped: &str, table: &mut PlaceholderTable) -> String {
    let text = protect(&FENCED_CODE_RE, escaped, table, |inner| {
        format!("<pre><code>{inner}</code></pre>")
    });
    let text = protect(&INLINE_CODE_RE, &text, table, |inner| {
        format!("<code>{inner}</code>")
    });
    let text = BOLD_RE.replace_all(&text, "<strong>${1}</strong>");
    ITALIC_RE.replace_all(&text, "<em>${1}</em>").into_owned()
}

fn protect(
    re: &Regex,
    text: &str,
    table: &mut PlaceholderTable,
    wrap: impl Fn(&str) -> String,
) -> String {
    re.replace_all(text, |caps: &Captures<'_>| {
        table.insert(TokenKind::Code, wrap(&caps[1]))
    })
    .into_owned()
}
