//! Per-round mechanics: sending the model request and running a tool batch.
//!
//! Called by [`Conversation::ask`](super::Conversation::ask). The request
//! helper owns the transient-error retry and the empty-response retry; the
//! tool helpers validate a batch and run it concurrently, returning results
//! in request order.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use super::events::{EventHandler, TurnEvent};
use crate::api::{ModelClient, RetryConfig, retry_model_call};
use crate::error::TurnError;
use crate::tools::{ToolResult, ToolSet};
use crate::{ChatCompletion, ChatRequest, ToolCall};

/// Retries when the model returns neither text nor tool calls.
pub const MAX_EMPTY_RESPONSE_RETRIES: u32 = 3;

// ── Send request ──────────────────────────────────────────────────

/// Send `request`, retrying transient transport errors and empty responses.
///
/// Returns the completion and the number of model calls it took.
pub(crate) async fn send_request(
    client: &dyn ModelClient,
    request: &ChatRequest,
    retry: &RetryConfig,
    event_handler: &dyn EventHandler,
) -> Result<(ChatCompletion, u32), TurnError> {
    let mut calls = 0u32;
    let mut empty_retries = 0u32;
    loop {
        let completion = retry_model_call(retry, || {
            calls += 1;
            client.complete(request)
        })
        .await?;

        if let Some(usage) = &completion.usage {
            event_handler.on_event(&TurnEvent::TokenUsage {
                prompt_tokens: usage.prompt_tokens.unwrap_or(0),
                completion_tokens: usage.completion_tokens.unwrap_or(0),
            });
        }

        if !completion.is_empty() {
            return Ok((completion, calls));
        }

        empty_retries += 1;
        if empty_retries > MAX_EMPTY_RESPONSE_RETRIES {
            warn!("Empty API response persisted after {MAX_EMPTY_RESPONSE_RETRIES} retries");
            return Err(TurnError::ModelProtocol(format!(
                "model returned an empty response {} times in a row",
                MAX_EMPTY_RESPONSE_RETRIES + 1
            )));
        }
        event_handler.on_event(&TurnEvent::EmptyResponse {
            attempt: empty_retries,
            max_retries: MAX_EMPTY_RESPONSE_RETRIES,
        });
        tokio::time::sleep(Duration::from_millis(500 * u64::from(empty_retries))).await;
    }
}

// ── Tool batches ──────────────────────────────────────────────────

/// Structural checks on a batch of tool calls: non-empty unique ids and
/// non-empty names. Unknown names are not checked here; they become failed
/// results.
pub(crate) fn validate_tool_calls(calls: &[ToolCall]) -> Result<(), TurnError> {
    let mut seen = HashSet::with_capacity(calls.len());
    for (i, call) in calls.iter().enumerate() {
        if call.id.trim().is_empty() {
            return Err(TurnError::ModelProtocol(format!(
                "tool call #{} has an empty id",
                i + 1
            )));
        }
        if call.function.name.trim().is_empty() {
            return Err(TurnError::ModelProtocol(format!(
                "tool call '{}' has an empty name",
                call.id
            )));
        }
        if !seen.insert(call.id.as_str()) {
            return Err(TurnError::ModelProtocol(format!(
                "duplicate tool call id '{}'",
                call.id
            )));
        }
    }
    Ok(())
}

/// Run every call of one model response concurrently. Results come back in
/// request order.
pub(crate) async fn execute_tool_calls(
    tools: &ToolSet,
    calls: &[ToolCall],
    turn_id: u64,
    event_handler: &dyn EventHandler,
) -> Vec<ToolResult> {
    for call in calls {
        event_handler.on_event(&TurnEvent::ToolExecuting {
            name: &call.function.name,
            arguments: &call.function.arguments,
        });
    }

    let results = futures::future::join_all(calls.iter().map(|call| tools.invoke(call, turn_id))).await;

    for result in &results {
        event_handler.on_event(&TurnEvent::ToolResult(result));
    }
    results
}
