//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use admitbot_core::{
    AnswerEngine, ConversationController, Prepared, ProgressReporter, prepare,
};
use admitbot_crawler::{
    ChromeRenderer, ContentCache, PageFetcher, PageRenderer, PageSource, build_client,
};
use admitbot_documents::{DocumentSyncManager, acquirer_from_config};
use admitbot_gigachat::GigaChatClient;
use admitbot_shared::{
    AppConfig, Program, RemoteDocumentSet, RemoteDocumentStore, init_config, load_config,
    load_config_from, resolve_secret,
};

use crate::{console, telegram::TelegramBot};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// admitbot — admissions consultant for the AI master's programs.
#[derive(Parser)]
#[command(
    name = "admitbot",
    version,
    about = "Answer applicants' questions about the AI master's programs from their web pages and curricula.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.admitbot/admitbot.toml).
    #[arg(long, global = true, env = "ADMITBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the Telegram bot.
    Serve,

    /// Chat with the bot in the terminal.
    Chat,

    /// Ask a single question and print the answer.
    Ask {
        /// The question.
        question: String,

        /// Do not fetch program pages; answer from the documents only.
        #[arg(long)]
        no_context: bool,
    },

    /// Fetch a page and print its extracted text.
    Fetch {
        /// Page URL.
        url: String,
    },

    /// Re-acquire the curriculum documents and replace the remote copies.
    Sync,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "admitbot=info",
        1 => "admitbot=debug",
        _ => "admitbot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Serve => cmd_serve(config_path).await,
        Command::Chat => cmd_chat(config_path).await,
        Command::Ask {
            question,
            no_context,
        } => cmd_ask(config_path, &question, no_context).await,
        Command::Fetch { url } => cmd_fetch(config_path, &url).await,
        Command::Sync => cmd_sync(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn gigachat(config: &AppConfig) -> Result<Arc<GigaChatClient>> {
    let credentials = resolve_secret(&config.gigachat.credentials_env)?;
    Ok(Arc::new(GigaChatClient::new(&config.gigachat, credentials)?))
}

fn content_cache(config: &AppConfig) -> Result<ContentCache> {
    Ok(ContentCache::new(Box::new(PageFetcher::new(&config.fetch)?)))
}

fn sync_manager(
    config: &AppConfig,
    store: Arc<dyn RemoteDocumentStore>,
) -> Result<DocumentSyncManager> {
    let client = build_client(Duration::from_secs(config.fetch.timeout_secs))?;
    let renderer: Option<Box<dyn PageRenderer>> = if config.fetch.render_enabled {
        Some(Box::new(ChromeRenderer::from_config(&config.fetch)))
    } else {
        None
    };
    let acquirer = acquirer_from_config(&config.documents, client, renderer)?;
    Ok(DocumentSyncManager::from_config(&config.documents, acquirer, store))
}

/// Run the startup pipeline and build the conversation controller.
async fn bootstrap(config: &AppConfig) -> Result<ConversationController> {
    let mut programs = config.programs()?;
    let client = gigachat(config)?;
    let mut cache = content_cache(config)?;
    let mut sync = sync_manager(config, client.clone())?;

    let reporter = CliProgress::new();
    let prepared = prepare(&mut programs, &mut cache, &mut sync, &reporter).await?;

    let engine = AnswerEngine::new(client, prepared.sync.remote, config.gigachat.temperature);
    Ok(ConversationController::new(
        engine,
        prepared.context,
        program_names(&programs),
    ))
}

fn program_names(programs: &[Program]) -> Vec<String> {
    programs.iter().map(|p| p.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let token = resolve_secret(&config.telegram.token_env)?;
    let bot = TelegramBot::new(&config.telegram, &token)?;

    let mut controller = bootstrap(&config).await?;
    bot.run(&mut controller).await?;
    Ok(())
}

async fn cmd_chat(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let mut controller = bootstrap(&config).await?;
    console::run(&mut controller).await?;
    Ok(())
}

/// One-shot question. Attaches the documents already in the remote store
/// instead of re-syncing them.
async fn cmd_ask(config_path: Option<&Path>, question: &str, no_context: bool) -> Result<()> {
    let config = load(config_path)?;
    let programs = config.programs()?;
    let client = gigachat(&config)?;

    let context = if no_context {
        String::new()
    } else {
        let mut cache = content_cache(&config)?;
        cache.collect_all(&programs).await.to_string()
    };

    let attachments: RemoteDocumentSet = client.list().await?.into_iter().map(|f| f.id).collect();
    info!(attachments = attachments.len(), no_context, "asking");

    let engine = AnswerEngine::new(client, attachments, config.gigachat.temperature);
    println!("{}", engine.answer(question, &context).await);
    Ok(())
}

async fn cmd_fetch(config_path: Option<&Path>, url: &str) -> Result<()> {
    let config = load(config_path)?;
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let fetcher = PageFetcher::new(&config.fetch)?;
    let text = fetcher
        .fetch(&parsed)
        .await
        .ok_or_else(|| eyre!("no content could be extracted from {url}"))?;

    println!("{text}");
    Ok(())
}

async fn cmd_sync(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let mut programs = config.programs()?;
    let client = gigachat(&config)?;
    let mut sync = sync_manager(&config, client)?;

    let report = sync.sync(&mut programs).await?;

    println!();
    println!("  Staged:   {}", report.staged.len());
    println!("  Deleted:  {}", report.deleted);
    println!("  Uploaded: {}", report.remote.len());
    for program in &programs {
        println!("  {:<28} {} document(s)", program.name, program.documents.len());
    }
    if let Some(error) = &report.error {
        println!("  Error:    {error}");
    }
    println!();

    if report.is_complete() {
        Ok(())
    } else {
        Err(eyre!("document sync incomplete"))
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, program: &str, found: bool, current: usize, total: usize) {
        let status = if found { "ok" } else { "unavailable" };
        self.spinner
            .set_message(format!("Fetched [{current}/{total}] {program}: {status}"));
    }

    fn done(&self, prepared: &Prepared) {
        self.spinner.finish_and_clear();
        println!(
            "  Ready in {:.1}s: {} context chars, {} attached document(s)",
            prepared.elapsed.as_secs_f64(),
            prepared.context.as_str().len(),
            prepared.sync.remote.len(),
        );
    }
}
