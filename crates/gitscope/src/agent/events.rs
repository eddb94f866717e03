//! Events and handlers for the [`Conversation`](super::Conversation) loop.
//!
//! The orchestrator reports what it is doing through [`TurnEvent`]s. Callers
//! implement [`EventHandler`] to observe them for logging, a terminal
//! spinner, metrics, or tests.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget turns |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | Custom `impl EventHandler` | Full control |

use tracing::{debug, info, warn};

use super::orchestrator::TurnState;
use crate::context::ContextUsage;
use crate::tools::ToolResult;

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted while a turn runs.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// The turn moved to a new state.
    StateChanged { from: TurnState, to: TurnState },
    /// A model request is about to be sent. `round` counts tool rounds done so far.
    ModelRequested { turn_id: u64, round: u32 },
    /// The model returned text (may be alongside tool calls).
    Text(&'a str),
    /// The model requested tool calls.
    ToolCallsReceived { round: u32, count: usize },
    /// A single tool is about to be executed.
    ToolExecuting { name: &'a str, arguments: &'a str },
    /// A single tool finished executing.
    ToolResult(&'a ToolResult),
    /// Token usage reported by the API for one request.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Tool output was shortened or dropped to stay inside the turn's budget.
    ContextTruncated {
        dropped_units: usize,
        usage: &'a ContextUsage,
    },
    /// The model returned neither text nor tool calls; the request is retried.
    EmptyResponse { attempt: u32, max_retries: u32 },
    /// The turn hit its tool-round cap and was closed with a partial answer.
    IterationCapReached { max_iterations: u32 },
    /// The stop signal fired; the turn is abandoned.
    Cancelled,
    /// A final answer is ready.
    Finished,
}

/// Handler for turn events. The default implementation ignores everything.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &TurnEvent<'_>) {
///         if let TurnEvent::ToolExecuting { name, .. } = event {
///             eprintln!("running {name}...");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &TurnEvent<'_>) {
        let _ = event;
    }
}

/// A handler that does nothing.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let TurnEvent::Text(text) = event {
///         println!("{text}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&TurnEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&TurnEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &TurnEvent<'_>) {
        (self.0)(event)
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        match event {
            TurnEvent::StateChanged { from, to } => {
                debug!("turn state: {from:?} -> {to:?}");
            }
            TurnEvent::ModelRequested { turn_id, round } => {
                info!("[turn {turn_id}] model request after {round} tool round(s)");
            }
            TurnEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            TurnEvent::ToolCallsReceived { round, count } => {
                debug!("{count} tool call(s) in round {round}");
            }
            TurnEvent::ToolExecuting { name, .. } => {
                debug!("Executing tool: {name}");
            }
            TurnEvent::ToolResult(result) => match result.error() {
                None => debug!("Tool {} result: {} bytes", result.tool_name, result.size),
                Some(e) => debug!("Tool {} failed: {}", result.tool_name, e.label()),
            },
            TurnEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            TurnEvent::ContextTruncated {
                dropped_units,
                usage,
            } => {
                info!(
                    "Tool output truncated ({dropped_units} item(s) dropped), {}",
                    usage.to_log_string()
                );
            }
            TurnEvent::EmptyResponse {
                attempt,
                max_retries,
            } => {
                warn!(
                    "Empty API response (no content, no tool calls). \
                     Retrying ({attempt}/{max_retries})..."
                );
            }
            TurnEvent::IterationCapReached { max_iterations } => {
                info!("Turn hit tool-round cap ({max_iterations})");
            }
            TurnEvent::Cancelled => {
                info!("Turn cancelled");
            }
            TurnEvent::Finished => {
                info!("Final answer ready");
            }
        }
    }
}
