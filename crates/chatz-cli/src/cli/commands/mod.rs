//! CLI command handlers.

use anyhow::{Context, Result};
use chatz_core::config::Config;
use chatz_core::core::{ChatSession, PageContext, TurnEvent, create_event_channel};

pub mod apis;
pub mod chat;
pub mod config;
pub mod exec;
pub mod history;
pub mod models;
pub mod render;

/// Validates the config and opens a session on the requested or saved API.
fn open_session(config: &Config, api: Option<&str>) -> Result<ChatSession> {
    config.validate().context("invalid config")?;
    ChatSession::open(config, api).context("open chat session")
}

/// Runs one turn, handing every event to `on_event` as it arrives.
///
/// Returns the final text, or `None` when the turn failed.
async fn run_turn(
    session: &ChatSession,
    text: &str,
    context: Option<&PageContext>,
    mut on_event: impl FnMut(&TurnEvent) -> Result<()>,
) -> Result<Option<String>> {
    let (tx, mut rx) = create_event_channel();
    let send = async move {
        let result = session.send_message(text, context, &tx).await;
        drop(tx);
        result
    };
    let receive = async {
        let mut outcome = None;
        while let Some(event) = rx.recv().await {
            on_event(&event)?;
            if event.is_terminal() {
                outcome = match event {
                    TurnEvent::Complete { text } => Some(text),
                    _ => None,
                };
            }
        }
        Ok::<_, anyhow::Error>(outcome)
    };

    let (sent, received) = tokio::join!(send, receive);
    sent?;
    received
}
