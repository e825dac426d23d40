//! CLI entry and dispatch.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use chatz_core::config::{self, paths};
use chatz_core::core::PageContext;
use chatz_core::logging;

mod commands;

#[derive(Parser)]
#[command(name = "chatz")]
#[command(version = "0.1")]
#[command(about = "Chat with OpenAI-compatible endpoints from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// API configuration to use (default: saved selection or config default)
    #[arg(long, global = true, env = "CHATZ_API", value_name = "NAME")]
    api: Option<String>,

    #[command(flatten)]
    context: ContextArgs,
}

/// Page context attached to each message, as the widget would send it.
#[derive(clap::Args, Debug, Clone, Default)]
struct ContextArgs {
    /// Type of the open document (e.g. Sales Invoice)
    #[arg(long, global = true, value_name = "TYPE")]
    doc_type: Option<String>,

    /// Name of the open document
    #[arg(long, global = true, value_name = "NAME")]
    doc_name: Option<String>,

    /// Active list filter
    #[arg(long, global = true, value_name = "FILTER")]
    list_filter: Option<String>,

    /// Title of the current page
    #[arg(long, global = true, value_name = "TITLE")]
    page_title: Option<String>,

    /// URL of the current page
    #[arg(long, global = true, value_name = "URL")]
    page_url: Option<String>,

    /// JSON file with the document's field values
    #[arg(long, global = true, value_name = "FILE")]
    doc_data: Option<PathBuf>,
}

impl ContextArgs {
    fn to_page_context(&self) -> Result<Option<PageContext>> {
        let document_data = match &self.doc_data {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("read document data from {}", path.display()))?;
                Some(
                    serde_json::from_str(&raw)
                        .with_context(|| format!("parse document data in {}", path.display()))?,
                )
            }
            None => None,
        };

        let context = PageContext {
            document_type: self.doc_type.clone(),
            document_name: self.doc_name.clone(),
            list_filter: self.list_filter.clone(),
            page_title: self.page_title.clone(),
            page_url: self.page_url.clone(),
            document_data,
        };
        Ok((!context.is_empty()).then_some(context))
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Continue this conversation instead of the latest one
        #[arg(long, value_name = "CONVERSATION_ID")]
        conversation: Option<String>,
    },
    /// Send one prompt and print the reply
    Exec {
        /// The prompt to send
        #[arg(short, long)]
        prompt: String,

        /// Print the rendered HTML of the reply instead of the raw text
        #[arg(long)]
        html: bool,

        /// Re-render the reply to FILE as it streams
        #[arg(long, value_name = "FILE")]
        watch_html: Option<PathBuf>,
    },
    /// Render markdown to widget HTML
    Render {
        /// Markdown file to render (default: stdin)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Browse saved conversations
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// List and select API configurations
    Apis {
        #[command(subcommand)]
        command: ApisCommands,
    },
    /// Query model lists from API endpoints
    Models {
        #[command(subcommand)]
        command: ModelsCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum HistoryCommands {
    /// Lists recent conversations
    List {
        /// Maximum number of conversations to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Shows the messages of a conversation
    Show {
        /// The ID of the conversation to show
        #[arg(value_name = "CONVERSATION_ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum ApisCommands {
    /// Lists the API configurations available to the current user
    List,
    /// Selects the API configuration for future sessions
    Use {
        /// Name of the API configuration
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(clap::Subcommand)]
enum ModelsCommands {
    /// Fetch the model list from an API's /models endpoint
    Fetch {
        /// Store the list as available_models in config.toml
        #[arg(long)]
        save: bool,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Generate a fresh config from Rust defaults (for xtask)
    Generate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.logging, &paths::logs_dir()).context("init logging")?;

    let Cli {
        command,
        api,
        context,
    } = cli;
    let api = api.as_deref();

    // default to chat mode
    let command = command.unwrap_or(Commands::Chat { conversation: None });

    match command {
        Commands::Chat { conversation } => {
            let page_context = context.to_page_context()?;
            commands::chat::run(commands::chat::ChatOptions {
                config: &config,
                api,
                conversation: conversation.as_deref(),
                context: page_context.as_ref(),
            })
            .await
        }
        Commands::Exec {
            prompt,
            html,
            watch_html,
        } => {
            let page_context = context.to_page_context()?;
            commands::exec::run(commands::exec::ExecOptions {
                config: &config,
                api,
                prompt: &prompt,
                context: page_context.as_ref(),
                html,
                watch_html: watch_html.as_deref(),
            })
            .await
        }
        Commands::Render { file } => commands::render::run(&config, file.as_deref()),

        Commands::History { command } => match command {
            HistoryCommands::List { limit } => commands::history::list(&config, limit, api),
            HistoryCommands::Show { id } => commands::history::show(&config, &id),
        },

        Commands::Apis { command } => match command {
            ApisCommands::List => commands::apis::list(&config),
            ApisCommands::Use { name } => commands::apis::select(&config, &name),
        },

        Commands::Models { command } => match command {
            ModelsCommands::Fetch { save } => commands::models::fetch(&config, api, save).await,
        },

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        },
    }
}
