//! Exec command handler.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chatz_core::config::Config;
use chatz_core::core::{PageContext, TurnEvent};
use chatz_core::markdown::render_markdown;

use super::chat::print_event;
use super::{open_session, run_turn};

pub struct ExecOptions<'a> {
    pub config: &'a Config,
    pub api: Option<&'a str>,
    pub prompt: &'a str,
    pub context: Option<&'a PageContext>,
    pub html: bool,
    pub watch_html: Option<&'a Path>,
}

pub async fn run(options: ExecOptions<'_>) -> Result<()> {
    let session = open_session(options.config, options.api)?;
    let render_options = options.config.render_options()?;

    let mut failure = None;
    let outcome = run_turn(&session, options.prompt, options.context, |event| {
        if let TurnEvent::Error { message } = event {
            failure = Some(message.clone());
            return Ok(());
        }
        if let (Some(path), TurnEvent::Chunk { running, .. }) = (options.watch_html, event) {
            fs::write(path, render_markdown(running, &render_options))
                .with_context(|| format!("write {}", path.display()))?;
        }
        // With --html only warnings go out while streaming.
        if options.html && !matches!(event, TurnEvent::PersistenceFailed { .. }) {
            return Ok(());
        }
        print_event(event)
    })
    .await?;

    if let Some(message) = failure {
        bail!("{message}");
    }
    if let Some(text) = outcome {
        if let Some(path) = options.watch_html {
            fs::write(path, render_markdown(&text, &render_options))
                .with_context(|| format!("write {}", path.display()))?;
        }
        if options.html {
            println!("{}", render_markdown(&text, &render_options));
        }
    }
    Ok(())
}
