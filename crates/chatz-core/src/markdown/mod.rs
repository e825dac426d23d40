//! Markdown to HTML for assistant messages.
//!
//! Rendering is a pure function of the full text, so the caller can
//! re-render the running text after every delta. Supported syntax is a
//! small subset: fenced and inline code, bold, italic, links, bare URLs,
//! line breaks, and `*Thinking:` lines grouped into collapsible blocks.

mod inline;
mod links;
mod placeholders;
mod thoughts;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

pub use links::{is_internal_url, render_link, route_for};
pub use thoughts::ThoughtGroup;

use placeholders::{PlaceholderTable, TokenKind, neutralize_delimiters};

/// Route prefix the host application strips from internal links.
pub const DEFAULT_ROUTE_PREFIX: &str = "/app/";

static EXCESS_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// Host-page facts that affect link rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Page the widget is embedded in; same-host links count as internal.
    pub page_origin: Option<Url>,
    /// Prefix removed from internal link paths to form the in-app route.
    pub route_prefix: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page_origin: None,
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
        }
    }
}

/// Renders the full message text to HTML.
pub fn render_markdown(text: &str, options: &RenderOptions) -> String {
    let text = neutralize_delimiters(text.trim());
    if text.is_empty() {
        return String::new();
    }

    let mut table = PlaceholderTable::new();
    let text = thoughts::group_thoughts(&text, &mut table);
    let text = EXCESS_NEWLINES_RE.replace_all(&text, "\n\n");
    let text = links::extract_links(&text, options, &mut table);

    let html = escape_html(&text);
    let html = inline::apply_inline(&html, &mut table);

    // Code may hold URL tokens and any token may hold a thought token.
    let html = table.restore(&html, TokenKind::Code);
    let html = table.restore(&html, TokenKind::Url);
    let html = table.restore(&html, TokenKind::Thought);

    html.replace('\n', "<br>")
}

/// Escaping plus code/bold/italic/line breaks. Used for thought entries.
pub fn render_simple(text: &str) -> String {
    let mut table = PlaceholderTable::new();
    let html = escape_html(&neutralize_delimiters(text));
    let html = inline::apply_inline(&html, &mut table);
    table.restore(&html, TokenKind::Code).replace('\n', "<br>")
}

/// Escapes the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
