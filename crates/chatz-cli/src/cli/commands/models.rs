//! Models command handlers.

use anyhow::{Context, Result};
use chatz_core::config::{Config, paths};
use chatz_core::providers::{ChatCompletionsConfig, fetch_available_models};

use super::open_session;

pub async fn fetch(config: &Config, api: Option<&str>, save: bool) -> Result<()> {
    let session = open_session(config, api)?;
    let client_config = ChatCompletionsConfig::from_profile(session.profile())?;

    let models = fetch_available_models(&client_config)
        .await
        .with_context(|| format!("fetch models for '{}'", session.api_name()))?;
    for model in &models {
        println!("{model}");
    }

    if save {
        Config::save_available_models(session.api_name(), &models)?;
        println!(
            "Saved {} models for '{}' to {}",
            models.len(),
            session.api_name(),
            paths::config_path().display()
        );
    }
    Ok(())
}
