//! Scribe CLI: drafts job-application emails and cover letters from your
//! resumes and GitHub profile.

mod app;
mod repl;
mod server;

use anyhow::Result;
use app::Stores;
use clap::{Parser, Subcommand};
use scribe_config::{APP_NAME, CliOverrides, DEFAULT_SESSION_ID, DEFAULT_USER_ID, ScribeConfig};
use server::AppState;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "scribe",
    version,
    about = "Drafts job-application emails from your resumes and GitHub profile"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Send a single prompt and print the reply (non-interactive)
    #[arg(short, long)]
    print: Option<String>,

    /// User the chat session belongs to
    #[arg(long, global = true)]
    user: Option<String>,

    /// Chat session to use
    #[arg(long, global = true)]
    session: Option<String>,

    /// Model to use
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum tokens in the response
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// API key (overrides ANTHROPIC_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal (default)
    Chat,
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Summarize one file, or every file in the resumes directory
    Process {
        /// File to process; omit to sweep the resumes directory
        file: Option<PathBuf>,
    },
    /// Print the stored resume summaries
    Knowledge,
    /// List saved chat sessions
    Sessions,
    /// Delete one chat session
    DeleteSession { id: String },
    /// Delete all chat sessions
    ClearHistory,
    /// Delete all resume summaries and resume files
    ClearKnowledge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (host, port) = match &cli.command {
        Some(Command::Serve { host, port }) => (host.clone(), *port),
        _ => (None, None),
    };
    let config = ScribeConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        max_tokens: cli.max_tokens,
        host,
        port,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    let stores = Stores::open(&config).await?;

    let user_id = cli.user.unwrap_or_else(|| DEFAULT_USER_ID.to_string());
    let session_id = cli.session.unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

    if let Some(prompt) = cli.print {
        let service = app::chat_service(&config, &stores)?;
        let message = service.compose(&prompt, &[]).await;
        let interrupts = repl::Interrupts::install();
        let usage = repl::run_turn(&service, &interrupts, &user_id, &session_id, message).await?;
        tracing::debug!(
            "Used {} input / {} output tokens",
            usage.input_tokens,
            usage.output_tokens
        );
        return Ok(());
    }

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let service = app::chat_service(&config, &stores)?;
            repl::run(&service, &config, &user_id, &session_id).await
        }
        Command::Serve { .. } => {
            let service = Arc::new(app::chat_service(&config, &stores)?);
            let state = AppState::new(service, &config);
            server::serve(
                state,
                &config.server.host,
                config.server.port,
                config.static_dir(),
            )
            .await
        }
        Command::Process { file } => process(&config, &stores, file).await,
        Command::Knowledge => {
            println!("{}", stores.knowledge.render_all().await);
            Ok(())
        }
        Command::Sessions => {
            let sessions = stores.sessions.list(APP_NAME, &user_id).await?;
            repl::print_sessions(&sessions, None);
            Ok(())
        }
        Command::DeleteSession { id } => {
            stores.sessions.delete(APP_NAME, &user_id, &id).await?;
            eprintln!("Deleted session {id}.");
            Ok(())
        }
        Command::ClearHistory => {
            let removed = stores.sessions.clear().await?;
            eprintln!("Chat history cleared ({removed} session(s) removed).");
            Ok(())
        }
        Command::ClearKnowledge => {
            let cleared =
                scribe_core::clear_knowledge(&stores.knowledge, &config.resumes_dir()).await?;
            eprintln!(
                "Knowledge cleared ({} entries, {} resume file(s) removed).",
                cleared.entries, cleared.files_removed
            );
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` or `DEBUG=1` selects debug output.
fn init_logging(verbose: bool) {
    let debug_env = std::env::var("DEBUG")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let log_level = if verbose || debug_env { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();
}

async fn process(config: &ScribeConfig, stores: &Stores, file: Option<PathBuf>) -> Result<()> {
    let processor = app::resume_processor(config, stores)?;
    let output = match file {
        Some(path) => processor.process_file(&path).await,
        None => processor.process_dir(&config.resumes_dir()).await,
    };
    if output.is_error {
        anyhow::bail!("{}", output.text);
    }
    println!("{}", output.text);
    Ok(())
}
