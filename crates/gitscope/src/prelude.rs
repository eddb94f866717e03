//! Convenience re-exports for common `gitscope` types.
//!
//! ```ignore
//! use gitscope::prelude::*;
//! ```
//!
//! Pulls in what a front-end needs to run conversations: the session and
//! conversation types, event handlers, the model client, and the error
//! types. Repository and search internals are left in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatCompletion, ChatRequest, Message, ToolCall, ToolDef, json_schema_for};

// ── Conversation runtime ────────────────────────────────────────────
pub use crate::agent::{
    Conversation, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, Session,
    SessionConfig, TurnEvent, TurnOutcome, TurnState, TurnStatus,
};

// ── Model boundary ──────────────────────────────────────────────────
pub use crate::api::{ModelClient, ModelFuture, OpenRouterClient, RetryConfig};

// ── Context and tools ───────────────────────────────────────────────
pub use crate::context::{ContextBudget, ContextPayload, assemble};
pub use crate::tools::{Tool, ToolOutcome, ToolPayload, ToolResult, ToolSet};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{ModelError, SessionError, ToolError, TurnError};
