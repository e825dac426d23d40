//! Conversation history persistence.
//!
//! Signed-in users persist through a [`HistoryStore`]; guests keep a single
//! conversation in the [`LocalStore`] via [`GuestHistory`].

mod guest;
mod jsonl;
mod local_store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use guest::{GUEST_CONVERSATION_KEY, GuestEntry, GuestHistory};
pub use jsonl::{HistoryEvent, JsonlHistoryStore, SCHEMA_VERSION};
pub use local_store::LocalStore;

use crate::core::conversation::{PageContext, PriorMessage};

/// Preview text for conversations without a user message.
pub const NO_PREVIEW: &str = "No preview";

/// One persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&StoredMessage> for PriorMessage {
    fn from(message: &StoredMessage) -> Self {
        PriorMessage::new(message.role.clone(), message.content.clone())
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub first_message: String,
    /// Time of the latest message.
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_used: Option<String>,
}

/// Backend for signed-in conversation history.
pub trait HistoryStore: Send + Sync {
    /// Appends one message to a conversation, creating it if needed.
    ///
    /// # Errors
    /// Fails for an invalid conversation id, a role other than `user` or
    /// `assistant`, empty content, or an I/O error.
    fn save_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        context: Option<&PageContext>,
        api_used: Option<&str>,
    ) -> Result<()>;

    /// The latest `limit` messages of a conversation, oldest first.
    fn conversation_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Conversations by latest activity, newest first.
    fn list_conversations(&self, limit: usize, api_filter: Option<&str>) -> Result<Vec<ConversationSummary>>;
}

/// Generates `conv_<unix millis>_<9 base-36 chars>`.
pub fn new_conversation_id() -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut n = uuid::Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(9);
    for _ in 0..9 {
        suffix.push(char::from(ALPHABET[(n % 36) as usize]));
        n /= 36;
    }
    format!("conv_{}_{suffix}", Utc::now().timestamp_millis())
}

/// Whether `id` can name a history file.
pub fn is_valid_conversation_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Short relative age for conversation lists.
///
/// "just now", "Nm ago", "Nh ago" and "Nd ago" up to a week, then the
/// absolute `YYYY-MM-DD HH:MM`.
pub fn format_relative_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(time).num_seconds().max(0);

    let mins = seconds / 60;
    if mins < 1 {
        return "just now".to_string();
    }
    if mins < 60 {
        return format!("{mins}m ago");
    }

    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }

    let days = hours / 24;
    if days < 7 {
        return format!("{days}d ago");
    }

    time.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn test_new_conversation_id_shape() {
        let id = new_conversation_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "conv");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert!(is_valid_conversation_id(&id));
        assert_ne!(id, new_conversation_id());
    }

    #[test]
    fn test_conversation_id_validation() {
        assert!(is_valid_conversation_id("conv_1_abc"));
        assert!(!is_valid_conversation_id(""));
        assert!(!is_valid_conversation_id("../etc/passwd"));
        assert!(!is_valid_conversation_id("a/b"));
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_relative_time(now - Duration::days(6), now), "6d ago");
        assert_eq!(
            format_relative_time(now - Duration::days(10), now),
            "2025-06-05 12:00"
        );
    }
}
