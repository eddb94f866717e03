//! The conversation state machine.
//!
//! ```text
//! AwaitingUserInput ──ask──▶ ModelRequested ──tool calls──▶ ToolCallsPending
//!        ▲                        │   ▲                           │
//!        │                     text   └────── results ────────────┘
//!        │                        ▼
//!        └──────────────── FinalAnswerReady
//! ```
//!
//! One [`Conversation::ask`] call is one turn. A turn has a single
//! [`ContextBudget`] that every tool result in it draws from, and at most
//! `max_tool_iterations` rounds of tool calls. Reaching the cap is not an
//! error: the turn ends with whatever the model said so far plus a notice,
//! flagged [`TurnStatus::IterationCapReached`].
//!
//! History only changes when a turn completes. A turn that fails, is
//! cancelled through the stop signal, or whose future is dropped leaves the
//! history as it was and the state back at
//! [`TurnState::AwaitingUserInput`].

use tracing::{debug, info, warn};

use super::events::{EventHandler, NoopHandler, TurnEvent};
use super::execution::{execute_tool_calls, send_request, validate_tool_calls};
use super::prompt::grounding_system_prompt;
use super::session::Session;
use crate::api::ModelClient;
use crate::context::{ContextBudget, assemble};
use crate::error::TurnError;
use crate::repo::short_id;
use crate::tools::ToolResult;
use crate::{ChatRequest, Message};

/// Sent in place of a tool result that did not fit the turn's budget at all.
pub const OMITTED_RESULT_PLACEHOLDER: &str = "[result omitted: context budget exhausted]";

// ── States and outcomes ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    AwaitingUserInput,
    ModelRequested,
    ToolCallsPending,
    FinalAnswerReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// The model produced a final answer on its own.
    Completed,
    /// The tool-round cap was hit; the answer is partial.
    IterationCapReached,
}

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: u64,
    /// The text shown to the user.
    pub answer: String,
    pub status: TurnStatus,
    /// Rounds of tool calls executed.
    pub tool_rounds: u32,
    /// Model requests sent, retries included.
    pub model_calls: u32,
    /// Every tool result of the turn, in execution order.
    pub tool_results: Vec<ToolResult>,
    /// Whether any tool output was shortened or dropped for the budget.
    pub context_truncated: bool,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// Notice appended to the answer when the tool-round cap ends a turn.
fn cap_notice(max_tool_iterations: u32) -> String {
    format!(
        "[context truncated: stopped after {max_tool_iterations} round(s) of tool calls \
         before the model finished; the answer above may be incomplete]"
    )
}

// ── Conversation ───────────────────────────────────────────────────

/// A multi-turn conversation over one [`Session`].
pub struct Conversation<'a> {
    session: &'a Session,
    client: &'a dyn ModelClient,
    history: Vec<Message>,
    state: TurnState,
    next_turn_id: u64,
    event_handler: &'a dyn EventHandler,
    stop_signal: Option<Box<dyn Fn() -> bool + Send + Sync + 'a>>,
}

impl<'a> Conversation<'a> {
    pub fn new(session: &'a Session, client: &'a dyn ModelClient) -> Self {
        Self {
            session,
            client,
            history: Vec::new(),
            state: TurnState::AwaitingUserInput,
            next_turn_id: 1,
            event_handler: &NoopHandler,
            stop_signal: None,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Cancel the running turn when `signal` returns `true`.
    ///
    /// Checked before every model request and after every tool batch.
    pub fn with_stop_signal(mut self, signal: impl Fn() -> bool + Send + Sync + 'a) -> Self {
        self.stop_signal = Some(Box::new(signal));
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Committed user questions and final answers, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    /// Run one turn: answer `input` using as many tool rounds as allowed.
    pub async fn ask(&mut self, input: &str) -> Result<TurnOutcome, TurnError> {
        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;

        let Self {
            session,
            client,
            history,
            state,
            event_handler,
            stop_signal,
            ..
        } = self;

        let turn = Turn {
            id: turn_id,
            session: *session,
            client: *client,
            handler: *event_handler,
            stop_signal: stop_signal.as_deref(),
            state: StateGuard {
                state,
                handler: *event_handler,
            },
        };

        let outcome = turn.run(history.as_slice(), input).await?;
        history.push(Message::user(input));
        history.push(Message::assistant_text(outcome.answer.clone()));
        Ok(outcome)
    }
}

// ── One turn ───────────────────────────────────────────────────────

/// Resets the conversation state when a turn ends, however it ends.
struct StateGuard<'s> {
    state: &'s mut TurnState,
    handler: &'s dyn EventHandler,
}

impl StateGuard<'_> {
    fn set(&mut self, to: TurnState) {
        let from = *self.state;
        if from != to {
            *self.state = to;
            self.handler.on_event(&TurnEvent::StateChanged { from, to });
        }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state = TurnState::AwaitingUserInput;
    }
}

struct Turn<'t> {
    id: u64,
    session: &'t Session,
    client: &'t dyn ModelClient,
    handler: &'t dyn EventHandler,
    stop_signal: Option<&'t (dyn Fn() -> bool + Send + Sync + 't)>,
    state: StateGuard<'t>,
}

impl Turn<'_> {
    fn check_stop(&self) -> Result<(), TurnError> {
        if self.stop_signal.is_some_and(|stop| stop()) {
            info!("[turn {}] stop signal received", self.id);
            self.handler.on_event(&TurnEvent::Cancelled);
            return Err(TurnError::Cancelled);
        }
        Ok(())
    }

    async fn run(mut self, history: &[Message], input: &str) -> Result<TurnOutcome, TurnError> {
        let config = self.session.config();
        let tools = self.session.tools();
        let max_iterations = config.max_tool_iterations;

        let accessor = self.session.accessor();
        let head = match accessor.refresh().await {
            Ok(handle) => handle.head,
            Err(e) => {
                warn!("[turn {}] could not refresh repository state: {e}", self.id);
                accessor.handle().head
            }
        };
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(grounding_system_prompt(
            head.as_deref().map(short_id),
            max_iterations,
        )));
        messages.extend_from_slice(history);
        messages.push(Message::user(input));

        let tool_defs = tools.definitions();
        let mut budget = ContextBudget::new(config.max_context_tokens);
        let mut tool_rounds = 0u32;
        let mut model_calls = 0u32;
        let mut tool_results = Vec::new();
        let mut context_truncated = false;
        let mut partial_text: Vec<String> = Vec::new();

        info!("[turn {}] started ({} history message(s))", self.id, history.len());

        let (answer, status) = loop {
            self.check_stop()?;
            self.state.set(TurnState::ModelRequested);
            self.handler.on_event(&TurnEvent::ModelRequested {
                turn_id: self.id,
                round: tool_rounds,
            });

            let request = ChatRequest {
                model: Some(config.model.clone()),
                messages: messages.clone(),
                max_tokens: config.max_response_tokens,
                temperature: config.temperature,
                tools: Some(tool_defs.clone()),
            };
            let (completion, calls) =
                send_request(self.client, &request, &config.retry, self.handler).await?;
            model_calls += calls;

            let text = completion.text_content().map(str::to_string);
            if let Some(text) = &text {
                self.handler.on_event(&TurnEvent::Text(text));
            }

            if completion.tool_calls.is_empty() {
                partial_text.extend(text);
                break (partial_text.join("\n\n"), TurnStatus::Completed);
            }

            validate_tool_calls(&completion.tool_calls)?;

            if tool_rounds >= max_iterations {
                partial_text.extend(text);
                self.handler.on_event(&TurnEvent::IterationCapReached {
                    max_iterations,
                });
                let mut answer = partial_text.join("\n\n");
                if !answer.is_empty() {
                    answer.push_str("\n\n");
                }
                answer.push_str(&cap_notice(max_iterations));
                break (answer, TurnStatus::IterationCapReached);
            }

            self.state.set(TurnState::ToolCallsPending);
            tool_rounds += 1;
            self.handler.on_event(&TurnEvent::ToolCallsReceived {
                round: tool_rounds,
                count: completion.tool_calls.len(),
            });

            let calls = completion.tool_calls;
            let results = execute_tool_calls(tools, &calls, self.id, self.handler).await;
            messages.push(Message::assistant_tool_calls(text.clone(), calls));
            partial_text.extend(text);

            let payload = assemble(&results, &mut budget);
            if payload.truncated {
                context_truncated = true;
                let usage = budget.usage();
                self.handler.on_event(&TurnEvent::ContextTruncated {
                    dropped_units: payload.dropped_units,
                    usage: &usage,
                });
            }
            for section in &payload.sections {
                let content = if section.is_empty() {
                    OMITTED_RESULT_PLACEHOLDER.to_string()
                } else {
                    section.render()
                };
                messages.push(Message::tool_result(section.call_id.clone(), content));
            }
            debug!(
                "[turn {}] round {tool_rounds}: {} result(s), {}",
                self.id,
                results.len(),
                budget.usage().to_log_string()
            );
            tool_results.extend(results);

            self.check_stop()?;
        };

        self.state.set(TurnState::FinalAnswerReady);
        self.handler.on_event(&TurnEvent::Finished);
        info!(
            "[turn {}] finished: {status:?}, {tool_rounds} tool round(s), {model_calls} model call(s)",
            self.id
        );
        self.state.set(TurnState::AwaitingUserInput);

        Ok(TurnOutcome {
            turn_id: self.id,
            answer,
            status,
            tool_rounds,
            model_calls,
            tool_results,
            context_truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SessionConfig;
    use crate::api::ModelFuture;
    use crate::error::ModelError;
    use crate::repo::testing::{commit_all, init_repo, write};
    use crate::tools::names;
    use crate::{ChatCompletion, ToolCall};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Replays canned completions and records every request.
    struct Scripted {
        replies: Mutex<VecDeque<Result<ChatCompletion, ModelError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ChatCompletion, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ModelClient for Scripted {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> ModelFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatCompletion::text("out of script")));
            Box::pin(async move { reply })
        }
    }

    async fn session() -> (tempfile::TempDir, Session) {
        let dir = init_repo();
        write(dir.path(), "a.py", "API_BASE = \"http://x\"\n");
        commit_all(dir.path(), "init");
        let session = Session::open(SessionConfig::new("key", dir.path()).with_retries(0))
            .await
            .unwrap();
        (dir, session)
    }

    fn status_call(id: &str) -> ChatCompletion {
        ChatCompletion::with_tool_calls(vec![ToolCall::function(id, names::GIT_STATUS, "{}")])
    }

    #[tokio::test]
    async fn text_answer_completes_without_tools() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![Ok(ChatCompletion::text("hello"))]);
        let mut conversation = Conversation::new(&session, &model);

        let outcome = conversation.ask("hi").await.unwrap();
        assert_eq!(outcome.answer, "hello");
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.tool_rounds, 0);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(conversation.state(), TurnState::AwaitingUserInput);
        assert_eq!(conversation.history().len(), 2);

        let request = &model.requests()[0];
        assert_eq!(request.messages[0].role, crate::MessageRole::System);
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(names::ALL.len()));
    }

    #[tokio::test]
    async fn tool_results_are_sent_back_in_request_order() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![
            Ok(ChatCompletion::with_tool_calls(vec![
                ToolCall::function("c1", names::READ_FILE, r#"{"path":"a.py"}"#),
                ToolCall::function("c2", names::GIT_STATUS, "{}"),
            ])),
            Ok(ChatCompletion::text("API_BASE is in a.py:1")),
        ]);
        let mut conversation = Conversation::new(&session, &model);

        let outcome = conversation.ask("where is API_BASE?").await.unwrap();
        assert_eq!(outcome.tool_rounds, 1);
        let ids: Vec<&str> = outcome.tool_results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
        assert!(outcome.tool_results.iter().all(|r| r.turn_id == outcome.turn_id));

        let second = &model.requests()[1];
        let tail: Vec<_> = second.messages.iter().rev().take(2).collect();
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tail[0].tool_call_id.as_deref(), Some("c2"));
        assert!(tail[1].content.as_deref().unwrap().contains("API_BASE"));
    }

    #[tokio::test]
    async fn duplicate_ids_are_a_protocol_error_and_history_is_untouched() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![Ok(ChatCompletion::with_tool_calls(vec![
            ToolCall::function("dup", names::GIT_STATUS, "{}"),
            ToolCall::function("dup", names::GIT_LOG, "{}"),
        ]))]);
        let mut conversation = Conversation::new(&session, &model);

        let err = conversation.ask("status?").await.unwrap_err();
        assert!(matches!(err, TurnError::ModelProtocol(_)));
        assert!(conversation.history().is_empty());
        assert_eq!(conversation.state(), TurnState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn empty_response_is_retried() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![
            Ok(ChatCompletion::default()),
            Ok(ChatCompletion::text("done")),
        ]);
        let mut conversation = Conversation::new(&session, &model);

        let outcome = conversation.ask("q").await.unwrap();
        assert_eq!(outcome.answer, "done");
        assert_eq!(outcome.model_calls, 2);
    }

    #[tokio::test]
    async fn permanent_model_error_fails_the_turn() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![Err(ModelError::Http {
            status: 401,
            body: "no".into(),
        })]);
        let mut conversation = Conversation::new(&session, &model);

        let err = conversation.ask("q").await.unwrap_err();
        assert!(matches!(err, TurnError::Model(ModelError::Http { status: 401, .. })));
        assert!(conversation.history().is_empty());
    }

    #[tokio::test]
    async fn stop_signal_cancels_after_tool_batch() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![Ok(status_call("c1")), Ok(ChatCompletion::text("never"))]);
        let stop = AtomicBool::new(false);
        let handler = crate::agent::FnEventHandler::new(|event| {
            if matches!(event, TurnEvent::ToolResult(_)) {
                stop.store(true, Ordering::SeqCst);
            }
        });
        let mut conversation = Conversation::new(&session, &model)
            .with_event_handler(&handler)
            .with_stop_signal(|| stop.load(Ordering::SeqCst));

        let err = conversation.ask("q").await.unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
        assert_eq!(model.requests().len(), 1);
        assert!(conversation.history().is_empty());
        assert_eq!(conversation.state(), TurnState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn history_carries_into_the_next_turn() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![
            Ok(ChatCompletion::text("first")),
            Ok(ChatCompletion::text("second")),
        ]);
        let mut conversation = Conversation::new(&session, &model);
        let first = conversation.ask("one").await.unwrap();
        let second = conversation.ask("two").await.unwrap();
        assert_eq!(second.turn_id, first.turn_id + 1);

        let request = &model.requests()[1];
        let contents: Vec<&str> = request
            .messages
            .iter()
            .skip(1)
            .filter_map(|m| m.content.as_deref())
            .collect();
        assert_eq!(contents, ["one", "first", "two"]);
    }

    #[tokio::test]
    async fn states_are_reported_in_order() {
        let (_dir, session) = session().await;
        let model = Scripted::new(vec![Ok(status_call("c1")), Ok(ChatCompletion::text("clean"))]);
        let transitions = Mutex::new(Vec::new());
        let handler = crate::agent::FnEventHandler::new(|event| {
            if let TurnEvent::StateChanged { to, .. } = event {
                transitions.lock().unwrap().push(*to);
            }
        });
        let mut conversation = Conversation::new(&session, &model).with_event_handler(&handler);
        conversation.ask("q").await.unwrap();

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![
                TurnState::ModelRequested,
                TurnState::ToolCallsPending,
                TurnState::ModelRequested,
                TurnState::FinalAnswerReady,
                TurnState::AwaitingUserInput,
            ]
        );
    }
}
