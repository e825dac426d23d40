//! Request message assembly.
//!
//! The outbound conversation is always: one system message (base prompt
//! plus a "Current Information" block), then prior turns in chronological
//! order, then the new user message. Windowing is the caller's job.

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ApiProfile;

/// Base instructions used when a profile has no system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const DATE_TIME_FORMAT: &str = "%A, %B %-d, %Y at %I:%M:%S %p %Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Maps a stored role label onto a request role.
    ///
    /// Only the literal `"user"` maps to [`Role::User`]; everything else is
    /// replayed as the assistant.
    pub fn from_history_label(label: &str) -> Self {
        if label == "user" {
            Role::User
        } else {
            Role::Assistant
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A previously persisted turn, as read back from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorMessage {
    pub role: String,
    pub content: String,
}

impl PriorMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// What the user is looking at when they send a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    /// Snapshot of the open document's field values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_data: Option<Value>,
}

impl PageContext {
    pub fn is_empty(&self) -> bool {
        self == &PageContext::default()
    }

    fn write_into(&self, out: &mut String) {
        let document_type = non_empty(self.document_type.as_deref());
        let document_name = non_empty(self.document_name.as_deref());

        match (document_type, document_name) {
            (Some(doc_type), Some(doc_name)) => {
                out.push_str(&format!("- Document: {doc_type} ({doc_name})\n"));
                if let Some(data) = &self.document_data
                    && let Ok(pretty) = serde_json::to_string_pretty(data)
                {
                    out.push_str("\nDocument Data:\n```json\n");
                    out.push_str(&pretty);
                    out.push_str("\n```\n");
                }
            }
            (Some(doc_type), None) => {
                out.push_str(&format!("- List View: {doc_type}\n"));
                if let Some(filter) = non_empty(self.list_filter.as_deref()) {
                    out.push_str(&format!("- Filters: {filter}\n"));
                }
            }
            _ => {}
        }

        if document_type.is_none()
            && let Some(title) = non_empty(self.page_title.as_deref())
        {
            out.push_str(&format!("- Page: {title}\n"));
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Builds the ordered request message list for one turn.
#[derive(Debug, Clone, Default)]
pub struct ConversationBuilder {
    system_prompt: Option<String>,
    user: Option<String>,
    now: Option<DateTime<FixedOffset>>,
}

impl ConversationBuilder {
    pub fn new(system_prompt: Option<&str>) -> Self {
        Self {
            system_prompt: system_prompt.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn from_profile(profile: &ApiProfile, user: Option<&str>) -> Self {
        Self::new(profile.system_prompt.as_deref()).with_user(user)
    }

    pub fn with_user(mut self, user: Option<&str>) -> Self {
        self.user = user.map(str::to_string);
        self
    }

    /// Pins the timestamp written into the system message.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    /// Renders the system message content.
    pub fn system_message(&self, context: Option<&PageContext>) -> String {
        let mut prompt = non_empty(self.system_prompt.as_deref())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();

        let now = self.now.unwrap_or_else(|| Local::now().fixed_offset());
        prompt.push_str("\n\nCurrent Information:\n");
        prompt.push_str(&format!(
            "- Current Date & Time: {}\n",
            now.format(DATE_TIME_FORMAT)
        ));

        if let Some(user) = non_empty(self.user.as_deref()) {
            prompt.push_str(&format!("- User: {user}\n"));
        }

        if let Some(context) = context {
            context.write_into(&mut prompt);
        }

        prompt
    }

    /// Returns system message, prior turns, then the new user message.
    pub fn build(
        &self,
        prior: &[PriorMessage],
        new_user_text: &str,
        context: Option<&PageContext>,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(Message::new(Role::System, self.system_message(context)));
        messages.extend(
            prior
                .iter()
                .map(|m| Message::new(Role::from_history_label(&m.role), m.content.clone())),
        );
        messages.push(Message::new(Role::User, new_user_text));
        messages
    }
}
