//! Chat command handler.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use chatz_core::config::Config;
use chatz_core::core::{PageContext, TurnEvent};
use chatz_core::history::StoredMessage;

use super::{open_session, run_turn};

const QUIT: &str = ":q";
const NEW_CHAT: &str = ":new";

pub struct ChatOptions<'a> {
    pub config: &'a Config,
    pub api: Option<&'a str>,
    /// Conversation to continue; the latest one when unset.
    pub conversation: Option<&'a str>,
    pub context: Option<&'a PageContext>,
}

pub async fn run(opts: ChatOptions<'_>) -> Result<()> {
    let ChatOptions {
        config,
        api,
        conversation,
        context,
    } = opts;
    let mut session = open_session(config, api)?;

    let restored = match conversation {
        Some(id) => {
            let messages = session.resume_conversation(config, id)?;
            if messages.is_empty() {
                bail!("Conversation '{id}' not found");
            }
            messages
        }
        None => session.load_last_conversation()?,
    };
    tracing::info!(
        conversation = %session.conversation_id(),
        messages = restored.len(),
        "chat opened"
    );

    println!("{} ({})", session.profile().title(), session.api_name());
    if restored.is_empty() {
        println!("{}", session.greeting());
    } else {
        print_transcript(&restored);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush().context("flush stdout")?;

        line.clear();
        if stdin.lock().read_line(&mut line).context("read stdin")? == 0 {
            break;
        }
        let input = line.trim();
        match input {
            "" => continue,
            QUIT => break,
            NEW_CHAT => {
                let greeting = session.start_new_chat();
                tracing::info!(conversation = %session.conversation_id(), "started new chat");
                println!("{greeting}");
                continue;
            }
            _ => {}
        }

        let outcome = run_turn(&session, input, context, print_event).await;
        if let Err(e) = outcome {
            eprintln!("Error: {e:#}");
        }
    }

    Ok(())
}

fn print_transcript(messages: &[StoredMessage]) {
    for message in messages {
        println!("{}: {}", message.role, message.content);
    }
}

pub(super) fn print_event(event: &TurnEvent) -> Result<()> {
    match event {
        TurnEvent::Chunk { delta, .. } => {
            print!("{delta}");
            io::stdout().flush().context("flush stdout")?;
        }
        TurnEvent::Complete { .. } => println!(),
        TurnEvent::Error { message } => eprintln!("Error: {message}"),
        TurnEvent::PersistenceFailed { role, message } => {
            eprintln!("Warning: failed to save {role} message: {message}");
        }
    }
    Ok(())
}
