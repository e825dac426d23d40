//! Opaque tokens standing in for already-rendered HTML.
//!
//! Tokens are delimited by private-use code points that the renderer
//! strips from its input, so they cannot collide with user text. One
//! counter is shared by every kind, which keeps tokens unique per render.

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const TOKEN_OPEN: char = '\u{E000}';
pub const TOKEN_CLOSE: char = '\u{E001}';

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x{E000}([UTC])(\d+)\x{E001}").expect("valid token regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Url,
    Thought,
    Code,
}

impl TokenKind {
    fn tag(self) -> char {
        match self {
            TokenKind::Url => 'U',
            TokenKind::Thought => 'T',
            TokenKind::Code => 'C',
        }
    }
}

/// Placeholder table for one render call.
#[derive(Debug, Default)]
pub struct PlaceholderTable {
    entries: Vec<(TokenKind, String)>,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `html` and returns the token that will be swapped for it.
    pub fn insert(&mut self, kind: TokenKind, html: String) -> String {
        let index = self.entries.len();
        self.entries.push((kind, html));
        format!("{TOKEN_OPEN}{}{index}{TOKEN_CLOSE}", kind.tag())
    }

    /// Replaces every token of `kind` with its recorded HTML.
    ///
    /// Tokens of other kinds are left in place for a later pass.
    pub fn restore(&self, text: &str, kind: TokenKind) -> String {
        TOKEN_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let entry = caps[2]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.entries.get(index))
                    .filter(|(entry_kind, _)| entry_kind.tag().to_string() == caps[1]);
                match entry {
                    Some((_, html)) => html.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replaces stray delimiter code points so input cannot forge a token.
pub fn neutralize_delimiters(text: &str) -> String {
    text.replace([TOKEN_OPEN, TOKEN_CLOSE], "\u{FFFD}")
}
