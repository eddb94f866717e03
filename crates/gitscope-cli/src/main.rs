//! Ask questions about a local Git repository from the terminal.
//!
//! # Examples
//!
//! ```sh
//! # Interactive mode
//! gitscope --repo /path/to/project
//!
//! # One-shot mode
//! gitscope --prompt "What changed in the last three commits?"
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use gitscope::prelude::*;
use gitscope_cli::{CREDENTIAL_ENV, CliConfig, ReplInput};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Ask questions about a local Git repository.
#[derive(Parser)]
#[command(name = "gitscope", version)]
struct Cli {
    /// Path inside the repository to talk about.
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Model to use for completions.
    #[arg(long, default_value = gitscope::DEFAULT_MODEL)]
    model: String,

    /// Token budget for tool output per question.
    #[arg(long, default_value_t = 8_000)]
    max_context_tokens: usize,

    /// Rounds of tool calls per question.
    #[arg(long, default_value_t = 5)]
    max_tool_iterations: u32,

    /// Maximum hits per search.
    #[arg(long, default_value_t = 20)]
    max_search_hits: usize,

    /// Timeout for a single tool call, in seconds.
    #[arg(long, default_value_t = 30)]
    tool_timeout_secs: u64,

    /// Ask one question and exit.
    #[arg(long)]
    prompt: Option<String>,

    /// Log debug output to stderr.
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> CliConfig {
        CliConfig {
            repo: self.repo.clone(),
            model: self.model.clone(),
            max_context_tokens: self.max_context_tokens,
            max_tool_iterations: self.max_tool_iterations,
            max_search_hits: self.max_search_hits,
            tool_timeout_secs: self.tool_timeout_secs,
            ..CliConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "gitscope=debug,gitscope_cli=debug"
    } else {
        "gitscope=info,gitscope_cli=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let api_key = match std::env::var(CREDENTIAL_ENV) {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: {CREDENTIAL_ENV} environment variable is not set");
            return ExitCode::FAILURE;
        }
    };

    let session = match Session::open(cli.config().into_session_config(api_key)).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match OpenRouterClient::for_session(session.config()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(root = %session.accessor().root().display(), "session opened");

    // Ctrl-C cancels the running turn instead of killing the process.
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupt = Arc::new(Notify::new());
    tokio::spawn({
        let interrupted = interrupted.clone();
        let interrupt = interrupt.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                interrupt.notify_waiters();
            }
        }
    });

    let handler = FnEventHandler::new(|event| {
        if let TurnEvent::ToolExecuting { name, .. } = event {
            eprintln!("  · {name}");
        }
        LoggingHandler.on_event(event);
    });
    let stop = interrupted.clone();
    let mut conversation = Conversation::new(&session, &client)
        .with_event_handler(&handler)
        .with_stop_signal(move || stop.load(Ordering::SeqCst));

    if let Some(prompt) = &cli.prompt {
        return tokio::select! {
            result = conversation.ask(prompt) => match result {
                Ok(outcome) => {
                    print_outcome(&outcome);
                    ExitCode::SUCCESS
                }
                Err(TurnError::Cancelled) => {
                    eprintln!("(cancelled)");
                    ExitCode::from(130)
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            },
            _ = interrupt.notified() => {
                eprintln!("(cancelled)");
                ExitCode::from(130)
            }
        };
    }

    eprintln!(
        "gitscope: {} (type 'exit' or press Ctrl-D to leave)",
        session.accessor().root().display()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error: failed to read input: {e}");
                return ExitCode::FAILURE;
            }
        };
        let question = match ReplInput::classify(&line) {
            ReplInput::Exit => break,
            ReplInput::Empty => continue,
            ReplInput::Question(q) => q,
        };

        interrupted.store(false, Ordering::SeqCst);
        tokio::select! {
            result = conversation.ask(question) => match result {
                Ok(outcome) => print_outcome(&outcome),
                Err(TurnError::Cancelled) => eprintln!("(cancelled)"),
                Err(e) => eprintln!("Error: {e}"),
            },
            _ = interrupt.notified() => eprintln!("(cancelled)"),
        }
    }
    ExitCode::SUCCESS
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("{}", outcome.answer);
    if outcome.context_truncated && outcome.is_complete() {
        eprintln!("(some tool output was truncated to fit the context budget)");
    }
}
