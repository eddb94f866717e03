//! Model boundary: the [`ModelClient`] trait, the OpenRouter transport, and retry.
//!
//! The orchestrator only ever sees a [`ModelClient`]; it depends on nothing
//! but "text and/or ordered tool calls" coming back.
//!
//! - [`openrouter`]: [`OpenRouterClient`], an OpenAI-compatible
//!   chat-completions client over `reqwest`.
//! - [`retry`]: transient error detection (429, 5xx, network) with
//!   exponential backoff and jitter. Never retries 400/401 errors.

pub mod openrouter;
pub mod retry;

use std::future::Future;
use std::pin::Pin;

use crate::error::ModelError;
use crate::{ChatCompletion, ChatRequest};

pub use openrouter::OpenRouterClient;
pub use retry::{RetryConfig, retry_model_call};

/// Boxed future returned by [`ModelClient::complete`].
pub type ModelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ChatCompletion, ModelError>> + Send + 'a>>;

/// Anything that can answer a chat-completion request.
pub trait ModelClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ModelFuture<'a>;
}
