//! API selection command handlers.

use anyhow::Result;
use chatz_core::config::Config;
use chatz_core::history::LocalStore;

use super::open_session;

pub fn list(config: &Config) -> Result<()> {
    let apis = config.available_apis();
    if apis.is_empty() {
        println!("No APIs available.");
        return Ok(());
    }

    let saved = LocalStore::open_default()
        .get_string(&LocalStore::selected_api_key(config.user.as_deref()));
    let current = config.resolve_api(saved.as_deref()).ok().map(|r| r.name);

    for (name, profile) in apis {
        let marker = if current.as_deref() == Some(name) { "*" } else { " " };
        println!("{marker} {name}  {}  {}", profile.title(), profile.model_name);
    }
    Ok(())
}

pub fn select(config: &Config, name: &str) -> Result<()> {
    let mut session = open_session(config, None)?;
    let messages = session.switch_api(config, name)?;

    println!("Using {} ({name})", session.profile().title());
    if !messages.is_empty() {
        println!(
            "Latest conversation: {} ({} messages)",
            session.conversation_id(),
            messages.len()
        );
    }
    Ok(())
}
