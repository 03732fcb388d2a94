//! Interactive terminal chat.

use anyhow::Result;
use scribe_config::ScribeConfig;
use scribe_core::{AgentEvent, ChatService, MAX_TOOL_LOOPS, event_text};
use scribe_store::Session;
use scribe_types::{Content, ScribeError, Usage};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const FILE_MARKER: &str = "[file:";

/// Read lines from stdin and run one turn per line until `quit`, `/quit` or
/// end of input.
pub async fn run(
    service: &ChatService,
    config: &ScribeConfig,
    user_id: &str,
    session_id: &str,
) -> Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| config.project_root.clone());
    let interrupts = Interrupts::install();

    eprintln!(
        "scribe v{} (model: {}, session: {session_id})",
        env!("CARGO_PKG_VERSION"),
        config.model
    );
    eprintln!("Try \"Process my resumes\" or \"Write a cover letter for this job [file: user_upload/job.pdf]\".");
    eprintln!("Type /help for commands. Type quit or press Ctrl+D to exit.\n");

    let stdin = io::stdin();
    loop {
        eprint!("You: ");
        io::stderr().flush()?;

        let mut input = String::new();
        let bytes_read = stdin.lock().read_line(&mut input)?;
        if bytes_read == 0 {
            eprintln!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") {
            break;
        }

        if input.starts_with('/') {
            match slash_command(input, service, user_id, session_id).await {
                SlashResult::Continue => continue,
                SlashResult::Break => break,
                SlashResult::Unknown => {
                    eprintln!("Unknown command: {input}. Type /help for available commands.");
                    continue;
                }
            }
        }

        let message = compose_input(service, input, &cwd, &config.project_root).await;
        if message.is_empty() {
            continue;
        }

        match run_turn(service, &interrupts, user_id, session_id, message).await {
            Ok(usage) => tracing::debug!(
                "Turn used {} input / {} output tokens",
                usage.input_tokens,
                usage.output_tokens
            ),
            Err(ScribeError::Cancelled) => {}
            Err(e) => eprintln!("\nError: {e}"),
        }
        println!();
    }

    eprintln!("Goodbye! Your session is saved.");
    Ok(())
}

/// Routes Ctrl+C: cancels the running turn, or exits when none is running.
#[derive(Clone, Default)]
pub struct Interrupts {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    /// Start the one Ctrl+C listener for the process.
    pub fn install() -> Self {
        let interrupts = Self::default();
        let listener = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !listener.interrupt().await {
                    eprintln!("\nGoodbye! Your session is saved.");
                    std::process::exit(130);
                }
            }
        });
        interrupts
    }

    async fn begin(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        *self.current.lock().await = Some(cancel.clone());
        cancel
    }

    async fn finish(&self) {
        *self.current.lock().await = None;
    }

    /// Cancel the running turn. Returns false when there was none.
    async fn interrupt(&self) -> bool {
        match self.current.lock().await.take() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Run one turn that Ctrl+C can cancel, printing as it goes.
pub async fn run_turn(
    service: &ChatService,
    interrupts: &Interrupts,
    user_id: &str,
    session_id: &str,
    message: Content,
) -> Result<Usage, ScribeError> {
    let cancel = interrupts.begin().await;
    let result = service
        .send(user_id, session_id, message, cancel, print_event)
        .await;
    interrupts.finish().await;
    result
}

/// Agent replies go to stdout; tool progress and notices to stderr.
pub fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::Appended(event) if event.author.is_agent() => {
            let text = event_text(&event);
            if !text.is_empty() {
                println!("Agent: {text}");
            }
        }
        AgentEvent::Appended(_) | AgentEvent::Done(_) => {}
        AgentEvent::ToolStart { name } => eprintln!("  [tool: {name}]"),
        AgentEvent::ToolEnd {
            name,
            output,
            is_error,
        } => {
            if is_error {
                eprintln!("  [tool {name} error: {output}]");
            } else {
                eprintln!("  [tool {name} done: {output}]");
            }
        }
        AgentEvent::LoopLimit => {
            eprintln!("Stopped after {MAX_TOOL_LOOPS} tool rounds without a final answer.")
        }
        AgentEvent::Cancelled => eprintln!("\n[cancelled]"),
    }
}

async fn compose_input(service: &ChatService, line: &str, cwd: &Path, root: &Path) -> Content {
    let Some((raw, text)) = split_file_ref(line) else {
        return service.compose(line, &[]).await;
    };

    let resolved = {
        let (raw, cwd, root) = (raw.clone(), cwd.to_path_buf(), root.to_path_buf());
        tokio::task::spawn_blocking(move || resolve_file_ref(&raw, &cwd, &root))
            .await
            .ok()
            .flatten()
    };

    match resolved {
        Some(path) => {
            if path != raw {
                eprintln!("Found file by basename: using {path}");
            }
            service.compose(&text, &[path]).await
        }
        None => {
            eprintln!("\nWarning: File not found at {raw}. Sending text only.\n");
            service.compose(&text, &[]).await
        }
    }
}

/// Split the first `[file: path]` marker out of a line. Returns the trimmed
/// path and the remaining text.
fn split_file_ref(line: &str) -> Option<(String, String)> {
    let start = line.find(FILE_MARKER)?;
    let after = &line[start + FILE_MARKER.len()..];
    let end = after.find(']')?;
    let path = after[..end].trim().to_string();
    let rest = format!("{}{}", &line[..start], &after[end + 1..]);
    Some((path, rest.trim().to_string()))
}

/// Resolve a file reference typed by the user.
///
/// A path that exists under the project root is kept as typed. One that
/// exists relative to the working directory, or whose basename is found
/// somewhere below it, is returned as a full path.
fn resolve_file_ref(raw: &str, cwd: &Path, root: &Path) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let typed = Path::new(raw);
    if root.join(typed).is_file() {
        return Some(raw.to_string());
    }
    if cwd.join(typed).is_file() {
        return Some(cwd.join(typed).display().to_string());
    }
    let basename = typed.file_name()?;
    find_by_basename(cwd, basename.to_str()?).map(|p| p.display().to_string())
}

fn find_by_basename(start: &Path, basename: &str) -> Option<PathBuf> {
    walkdir::WalkDir::new(start)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == basename)
        .map(|e| e.into_path())
}

enum SlashResult {
    Continue,
    Break,
    Unknown,
}

async fn slash_command(
    input: &str,
    service: &ChatService,
    user_id: &str,
    session_id: &str,
) -> SlashResult {
    let cmd = input.split_whitespace().next().unwrap_or(input);
    match cmd {
        "/quit" | "/exit" => SlashResult::Break,
        "/help" => {
            print_help();
            SlashResult::Continue
        }
        "/sessions" => {
            match service.sessions(user_id).await {
                Ok(sessions) => print_sessions(&sessions, Some(session_id)),
                Err(e) => eprintln!("Failed to list sessions: {e}"),
            }
            SlashResult::Continue
        }
        "/knowledge" => {
            println!("{}", service.knowledge().render_all().await);
            SlashResult::Continue
        }
        "/clear-history" => {
            match service.clear_history().await {
                Ok(n) => eprintln!("Chat history cleared ({n} session(s) removed)."),
                Err(e) => eprintln!("Failed to clear chat history: {e}"),
            }
            SlashResult::Continue
        }
        "/clear-knowledge" => {
            match service.clear_knowledge().await {
                Ok(cleared) => eprintln!(
                    "Knowledge cleared ({} entries, {} resume file(s) removed).",
                    cleared.entries, cleared.files_removed
                ),
                Err(e) => eprintln!("Failed to clear knowledge: {e}"),
            }
            SlashResult::Continue
        }
        _ => SlashResult::Unknown,
    }
}

/// One line per session; `current` is marked with `*`.
pub fn print_sessions(sessions: &[Session], current: Option<&str>) {
    if sessions.is_empty() {
        eprintln!("No saved sessions.");
        return;
    }
    eprintln!("Saved sessions:");
    for s in sessions {
        let marker = if current == Some(s.id.as_str()) { "*" } else { " " };
        let keys = if s.state.is_empty() {
            String::new()
        } else {
            format!("  state: {}", s.state.keys().cloned().collect::<Vec<_>>().join(", "))
        };
        eprintln!(" {marker} {}  ({}){keys}", s.id, s.app_name);
    }
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /help             Show this help");
    eprintln!("  /sessions         List your saved sessions");
    eprintln!("  /knowledge        Show stored resume summaries");
    eprintln!("  /clear-history    Delete all chat sessions");
    eprintln!("  /clear-knowledge  Delete resume summaries and resume files");
    eprintln!("  /quit             Exit (also: quit, Ctrl+D, Ctrl+C at the prompt)");
    eprintln!();
    eprintln!("Attach a file with [file: path/to/file] anywhere in a message.");
    eprintln!("Ctrl+C cancels a reply in progress.");
}
