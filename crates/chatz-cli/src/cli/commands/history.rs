//! History command handlers.

use anyhow::{Context, Result, bail};
use chatz_core::config::Config;
use chatz_core::history::{
    GuestHistory, HistoryStore, JsonlHistoryStore, LocalStore, format_relative_time,
    is_valid_conversation_id,
};
use chrono::Utc;

pub fn list(config: &Config, limit: usize, api: Option<&str>) -> Result<()> {
    let now = Utc::now();

    if config.is_guest() {
        let entries = GuestHistory::new(LocalStore::open_default()).load();
        match entries.last() {
            None => println!("No conversations found."),
            Some(last) => println!(
                "guest  {}  {} messages",
                format_relative_time(last.timestamp, now),
                entries.len()
            ),
        }
        return Ok(());
    }

    let store = JsonlHistoryStore::open_default(config.user.clone());
    let conversations = store
        .list_conversations(limit, api)
        .context("list conversations")?;
    if conversations.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }

    for summary in conversations {
        println!(
            "{}  {}  {}  {}",
            summary.conversation_id,
            format_relative_time(summary.created_at, now),
            summary.api_used.as_deref().unwrap_or("-"),
            summary.first_message
        );
    }
    Ok(())
}

pub fn show(config: &Config, id: &str) -> Result<()> {
    if !is_valid_conversation_id(id) {
        bail!("Invalid conversation id '{id}'");
    }

    let store = JsonlHistoryStore::open_default(config.user.clone());
    let messages = store
        .read_messages(id)
        .with_context(|| format!("load conversation '{id}'"))?;
    if messages.is_empty() {
        println!("Conversation '{id}' is empty or not found.");
        return Ok(());
    }

    for message in messages {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d %H:%M"),
            message.role,
            message.content
        );
    }
    Ok(())
}
