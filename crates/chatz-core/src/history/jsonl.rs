//! JSONL-backed history store.
//!
//! Each conversation is one file, `<conversation_id>.jsonl`:
//!
//! ```jsonl
//! { "type": "meta", "schema_version": 1, "user": "jane@example.com", "ts": "2025-06-15T12:00:00.000Z" }
//! { "type": "message", "role": "user", "content": "...", "api_used": "openai", "ts": "..." }
//! { "type": "message", "role": "assistant", "content": "...", "api_used": "openai", "ts": "..." }
//! ```

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConversationSummary, HistoryStore, NO_PREVIEW, StoredMessage, is_valid_conversation_id};
use crate::config::paths;
use crate::core::conversation::PageContext;

/// Current schema version for new conversation files.
pub const SCHEMA_VERSION: u32 = 1;

/// One line of a conversation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// First line of every file.
    Meta {
        schema_version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        ts: String,
    },
    Message {
        role: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_used: Option<String>,
        ts: String,
    },
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// History store writing one JSONL file per conversation.
#[derive(Debug, Clone)]
pub struct JsonlHistoryStore {
    dir: PathBuf,
    user: Option<String>,
}

impl JsonlHistoryStore {
    pub fn new(dir: impl Into<PathBuf>, user: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            user,
        }
    }

    /// Store rooted at `$CHATZ_HOME/history`.
    pub fn open_default(user: Option<String>) -> Self {
        Self::new(paths::history_dir(), user)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn conversation_path(&self, conversation_id: &str) -> Result<PathBuf> {
        if !is_valid_conversation_id(conversation_id) {
            bail!("Invalid conversation id '{conversation_id}'");
        }
        Ok(self.dir.join(format!("{conversation_id}.jsonl")))
    }

    /// Appends a message with an explicit timestamp.
    pub fn save_message_at(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        context: Option<&PageContext>,
        api_used: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.conversation_path(conversation_id)?;
        if role != "user" && role != "assistant" {
            bail!("Invalid role '{role}': must be 'user' or 'assistant'");
        }
        if content.trim().is_empty() {
            bail!("Message content is required");
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        if is_new {
            write_event(
                &mut file,
                &HistoryEvent::Meta {
                    schema_version: SCHEMA_VERSION,
                    user: self.user.clone(),
                    ts: timestamp(at),
                },
            )?;
        }

        let context = match context.filter(|c| !c.is_empty()) {
            Some(c) => Some(serde_json::to_value(c).context("Failed to serialize page context")?),
            None => None,
        };
        write_event(
            &mut file,
            &HistoryEvent::Message {
                role: role.to_string(),
                content: content.to_string(),
                context,
                api_used: api_used.map(str::to_string),
                ts: timestamp(at),
            },
        )
    }

    /// Every message of a conversation, oldest first.
    pub fn read_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let path = self.conversation_path(conversation_id)?;
        Ok(messages_from_events(read_events(&path)?))
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn save_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        context: Option<&PageContext>,
        api_used: Option<&str>,
    ) -> Result<()> {
        self.save_message_at(conversation_id, role, content, context, api_used, Utc::now())
    }

    fn conversation_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let mut messages = self.read_messages(conversation_id)?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    fn list_conversations(&self, limit: usize, api_filter: Option<&str>) -> Result<Vec<ConversationSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut conversations = Vec::new();
        for entry in fs::read_dir(&self.dir).context("Failed to read history directory")? {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            let messages = match read_events(&path) {
                Ok(events) => messages_from_events(events),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable conversation");
                    continue;
                }
            };
            let Some(last) = messages.last() else {
                continue;
            };

            if let Some(filter) = api_filter
                && last.api_used.as_deref() != Some(filter)
            {
                continue;
            }

            let first_message = messages
                .iter()
                .find(|m| m.role == "user")
                .map_or_else(|| NO_PREVIEW.to_string(), |m| m.content.clone());

            conversations.push(ConversationSummary {
                conversation_id: id,
                first_message,
                created_at: last.created_at,
                api_used: last.api_used.clone(),
            });
        }

        conversations.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.conversation_id.cmp(&a.conversation_id))
        });
        conversations.truncate(limit);
        Ok(conversations)
    }
}

fn write_event(file: &mut fs::File, event: &HistoryEvent) -> Result<()> {
    let json = serde_json::to_string(event).context("Failed to serialize history event")?;
    writeln!(file, "{json}").context("Failed to write history event")
}

/// Reads events from a file; unparseable lines are skipped.
fn read_events(path: &Path) -> Result<Vec<HistoryEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::debug!(error = %e, "skipping unparseable history line"),
        }
    }
    Ok(events)
}

fn messages_from_events(events: Vec<HistoryEvent>) -> Vec<StoredMessage> {
    events
        .into_iter()
        .filter_map(|event| match event {
            HistoryEvent::Message {
                role,
                content,
                context,
                api_used,
                ts,
            } => Some(StoredMessage {
                role,
                content,
                context,
                api_used,
                created_at: parse_timestamp(&ts),
            }),
            HistoryEvent::Meta { .. } => None,
        })
        .collect()
}
