use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

mod config;
mod conversation;
mod dispatcher;
mod error;
mod event_bus;
mod intent;
mod llm_manager;
mod logger;
mod providers;
mod todo_store;
mod ui;

use config::Config;
use conversation::ConversationLoop;
use dispatcher::IntentDispatcher;
use event_bus::EventBus;
use llm_manager::LLMManager;
use todo_store::SqliteTodoStore;
use ui::Console;

#[derive(Parser)]
#[command(name = "todo_assistant", about = "Manage a todo list in plain language")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Language model provider (gemini, ollama, local)
    #[arg(short, long)]
    provider: Option<String>,
    /// SQLite database path
    #[arg(short, long)]
    database: Option<String>,
    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logger::init(args.verbose);

    let mut config = Config::load(&args.config)?;
    config.merge_with_env();
    config.merge_with_args(args.provider.as_deref(), args.database.as_deref(), args.no_color);

    let event_bus = Arc::new(EventBus::new(256));
    event_bus::spawn_event_logger(&event_bus);

    let store = SqliteTodoStore::open(&config.database.url, config.database.busy_timeout())
        .with_context(|| format!("Failed to open todo database {}", config.database.url))?;
    let provider = providers::build(&config.llm)?;
    info!("Using {} ({})", provider.name(), provider.model_name());

    let llm = LLMManager::new(vec![provider], config.llm.timeout(), config.llm.max_retries)
        .with_retry_backoff(config.llm.retry_backoff())
        .with_event_bus(event_bus.clone());
    let dispatcher = IntentDispatcher::new(&store).with_event_bus(event_bus.clone());
    let console = Console::new(config.ui.colorful);

    let mut conversation = ConversationLoop::new(&llm, dispatcher, &config.llm)
        .with_event_bus(event_bus.clone())
        .with_raw_replies(config.ui.show_raw_replies);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    conversation.run(stdin, &console).await?;

    info!("Session metrics: {:?}", event_bus.get_metrics().await);
    Ok(())
}
