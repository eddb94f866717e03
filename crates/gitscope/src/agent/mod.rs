//! Conversation runtime: the session, the turn state machine, and its observers.
//!
//! - [`session::Session`]: opens the repository and builds the search
//!   engine and tool set from a [`SessionConfig`]. Start here.
//! - [`orchestrator::Conversation`]: the turn loop. Sends the question and
//!   tool declarations to the model, runs requested tools, feeds bounded
//!   results back, and stops at a final answer or the tool-round cap.
//! - [`events`]: [`EventHandler`] trait and [`TurnEvent`] enum for observing
//!   turns. Includes [`LoggingHandler`] and [`FnEventHandler`].
//! - [`prompt`]: [`SystemPromptBuilder`](prompt::SystemPromptBuilder) and the
//!   grounding system prompt.

pub mod events;
pub mod execution;
pub mod orchestrator;
pub mod prompt;
pub mod session;

pub use events::{EventHandler, FnEventHandler, LoggingHandler, NoopHandler, TurnEvent};
pub use execution::MAX_EMPTY_RESPONSE_RETRIES;
pub use orchestrator::{
    Conversation, OMITTED_RESULT_PLACEHOLDER, TurnOutcome, TurnState, TurnStatus,
};
pub use session::{
    DEFAULT_MAX_RESPONSE_TOKENS, DEFAULT_MAX_TOOL_ITERATIONS, Session, SessionConfig,
};
