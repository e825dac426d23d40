use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LocalStore;
use crate::core::conversation::PriorMessage;

/// Local store key holding the guest conversation.
pub const GUEST_CONVERSATION_KEY: &str = "chatz_guest_conversation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&GuestEntry> for PriorMessage {
    fn from(entry: &GuestEntry) -> Self {
        PriorMessage::new(entry.role.clone(), entry.content.clone())
    }
}

/// The single conversation kept for anonymous sessions.
#[derive(Debug, Clone)]
pub struct GuestHistory {
    store: LocalStore,
}

impl GuestHistory {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Vec<GuestEntry> {
        self.store
            .get_as(GUEST_CONVERSATION_KEY)
            .unwrap_or_default()
    }

    /// The latest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<GuestEntry> {
        let mut entries = self.load();
        let skip = entries.len().saturating_sub(limit);
        entries.split_off(skip)
    }

    pub fn append(&self, role: &str, content: &str) {
        let mut entries = self.load();
        entries.push(GuestEntry {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        self.store.set(GUEST_CONVERSATION_KEY, &entries);
    }

    pub fn clear(&self) {
        self.store.remove(GUEST_CONVERSATION_KEY);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_append_load_recent_clear() {
        let dir = tempdir().unwrap();
        let guest = GuestHistory::new(LocalStore::new(dir.path().join("ls.json")));

        assert!(guest.load().is_empty());
        guest.append("user", "hi");
        guest.append("assistant", "hello");
        guest.append("user", "bye");

        let all = guest.load();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].role, "user");
        assert_eq!(all[1].content, "hello");

        let recent: Vec<String> = guest.recent(2).into_iter().map(|e| e.content).collect();
        assert_eq!(recent, vec!["hello", "bye"]);

        guest.clear();
        assert!(guest.load().is_empty());
    }

    #[test]
    fn test_stored_shape() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("ls.json"));
        GuestHistory::new(store.clone()).append("user", "hi");

        let raw = store.get(GUEST_CONVERSATION_KEY).unwrap();
        let first = &raw.as_array().unwrap()[0];
        assert_eq!(first["role"], "user");
        assert_eq!(first["content"], "hi");
        assert!(first["timestamp"].is_string());
    }
}
