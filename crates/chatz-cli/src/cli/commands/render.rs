//! Render command handler.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use chatz_core::config::Config;
use chatz_core::markdown::render_markdown;

pub fn run(config: &Config, file: Option<&Path>) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("read markdown from {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .lock()
                .read_to_string(&mut text)
                .context("read markdown from stdin")?;
            text
        }
    };

    let options = config.render_options()?;
    println!("{}", render_markdown(&text, &options));
    Ok(())
}
