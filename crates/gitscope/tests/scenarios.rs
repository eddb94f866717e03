//! End-to-end behavior against real repositories and a scripted model.

mod common;

use common::{ScriptedModel, call, commit_all, git, init_repo, snapshot, write};
use gitscope::agent::{Conversation, Session, SessionConfig, TurnStatus};
use gitscope::context::{ContextBudget, assemble};
use gitscope::error::ToolError;
use gitscope::search::{HitTarget, MatchKind, SearchKind};
use gitscope::tools::names;
use gitscope::tools::{ToolPayload, ToolResult};
use gitscope::{ChatCompletion, ToolCall};
use pretty_assertions::assert_eq;
use std::time::Duration;

async fn open(dir: &tempfile::TempDir) -> Session {
    Session::open(SessionConfig::new("test-key", dir.path()).with_retries(0))
        .await
        .unwrap()
}

async fn invoke(session: &Session, tool: &str, arguments: &str) -> ToolResult {
    session
        .tools()
        .invoke(&ToolCall::function("call", tool, arguments), 1)
        .await
}

fn api_repo() -> tempfile::TempDir {
    let dir = init_repo();
    write(dir.path(), "a.py", "API_BASE = \"https://api.example.com\"\nTIMEOUT = 30\n");
    write(dir.path(), "b.py", "# the base of the api lives elsewhere\n");
    commit_all(dir.path(), "add api client");
    dir
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_find_where_a_constant_is_defined() {
    let dir = api_repo();
    let session = open(&dir).await;
    let model = ScriptedModel::new([
        call("s1", names::SEARCH_CODE, r#"{"query": "API_BASE"}"#),
        call("r1", names::READ_FILE, r#"{"path": "a.py", "start_line": 1, "end_line": 1}"#),
        ChatCompletion::text("API_BASE is defined in a.py:1."),
    ]);
    let mut conversation = Conversation::new(&session, &model);

    let outcome = conversation.ask("Where is API_BASE defined?").await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.tool_rounds, 2);
    assert_eq!(outcome.answer, "API_BASE is defined in a.py:1.");

    let Some(ToolPayload::Hits(hits)) = outcome.tool_results[0].payload() else {
        panic!("expected hits: {:?}", outcome.tool_results[0].outcome);
    };
    let HitTarget::File(top) = &hits[0].target else {
        panic!("expected a file hit");
    };
    assert_eq!(top.path, "a.py");
    assert_eq!(top.line_range, Some((1, 1)));
    assert_eq!(hits[0].kind, MatchKind::Content);

    let read = model.tool_message("r1").unwrap();
    assert!(read.contains("[a.py:1 of 2 lines]"), "{read}");
    assert!(read.contains("API_BASE = "), "{read}");
}

#[tokio::test]
async fn scenario_clean_repository_has_no_uncommitted_changes() {
    let dir = api_repo();
    let session = open(&dir).await;
    let model = ScriptedModel::new([
        call("st", names::GIT_STATUS, "{}"),
        ChatCompletion::text("There are no uncommitted changes."),
    ]);
    let mut conversation = Conversation::new(&session, &model);

    let outcome = conversation.ask("What changed since the last commit?").await.unwrap();
    let Some(ToolPayload::Status(report)) = outcome.tool_results[0].payload() else {
        panic!("expected a status report: {:?}", outcome.tool_results[0].outcome);
    };
    assert!(report.entries.is_empty());
    assert_eq!(report.branch.as_deref(), Some("main"));
    let message = model.tool_message("st").unwrap();
    assert!(message.contains("On branch main"), "{message}");
    assert!(message.contains("No uncommitted changes."), "{message}");
    assert_eq!(outcome.status, TurnStatus::Completed);
}

#[tokio::test]
async fn scenario_slow_tool_times_out_and_the_model_still_answers() {
    let dir = api_repo();
    let session = Session::open(
        SessionConfig::new("test-key", dir.path())
            .with_retries(0)
            .with_tool_timeout(Duration::from_nanos(1)),
    )
    .await
    .unwrap();
    let model = ScriptedModel::new([
        call("st", names::GIT_STATUS, "{}"),
        ChatCompletion::text("Status is unavailable right now."),
    ]);
    let mut conversation = Conversation::new(&session, &model);

    let outcome = conversation.ask("Anything uncommitted?").await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.answer, "Status is unavailable right now.");
    assert!(matches!(
        outcome.tool_results[0].error(),
        Some(ToolError::Timeout(_))
    ));
    let message = model.tool_message("st").unwrap();
    assert!(message.contains("timed out"), "{message}");
}

#[tokio::test]
async fn scenario_escaping_path_is_refused_and_conversation_continues() {
    let dir = api_repo();
    let session = open(&dir).await;
    let model = ScriptedModel::new([
        call("bad", names::READ_FILE, r#"{"path": "/etc/passwd"}"#),
        ChatCompletion::text("I can only read files inside the repository."),
        ChatCompletion::text("a.py defines API_BASE."),
    ]);
    let mut conversation = Conversation::new(&session, &model);

    let outcome = conversation.ask("Show me /etc/passwd").await.unwrap();
    assert!(matches!(
        outcome.tool_results[0].error(),
        Some(ToolError::PathEscape { .. })
    ));
    let message = model.tool_message("bad").unwrap();
    assert!(message.contains("escapes the repository root"), "{message}");
    assert_eq!(outcome.status, TurnStatus::Completed);

    let next = conversation.ask("Then what does a.py define?").await.unwrap();
    assert_eq!(next.answer, "a.py defines API_BASE.");
    assert_eq!(conversation.history().len(), 4);
}

#[tokio::test]
async fn scenario_tool_round_cap_forces_an_answer() {
    let dir = api_repo();
    let session = Session::open(
        SessionConfig::new("test-key", dir.path())
            .with_retries(0)
            .with_max_tool_iterations(5),
    )
    .await
    .unwrap();

    let mut script: Vec<ChatCompletion> = (1..=10)
        .map(|i| {
            let mut step = call(&format!("c{i}"), names::GIT_LOG, r#"{"limit": 1}"#);
            step.content = Some(format!("Looking ({i})..."));
            step
        })
        .collect();
    script.push(ChatCompletion::text("never reached"));
    let model = ScriptedModel::new(script);
    let mut conversation = Conversation::new(&session, &model);

    let outcome = conversation.ask("Summarize the whole history").await.unwrap();
    assert_eq!(outcome.status, TurnStatus::IterationCapReached);
    assert_eq!(outcome.tool_rounds, 5);
    assert_eq!(outcome.tool_results.len(), 5);
    assert_eq!(outcome.model_calls, 6);
    assert_eq!(model.requests().len(), 6);
    assert!(outcome.answer.starts_with("Looking (1)..."));
    assert!(outcome.answer.contains("Looking (6)..."));
    assert!(outcome.answer.contains("context truncated"));
    assert_eq!(conversation.history().len(), 2);
}

// ── Properties ─────────────────────────────────────────────────────

#[tokio::test]
async fn escaping_paths_are_refused_by_every_path_taking_tool() {
    let dir = api_repo();
    let session = open(&dir).await;

    for (tool, args) in [
        (names::READ_FILE, r#"{"path": "../outside.txt"}"#),
        (names::READ_FILE, r#"{"path": "/etc/passwd"}"#),
        (names::READ_FILE, r#"{"path": "src/../../x"}"#),
        (names::LIST_FILES, r#"{"glob": "../*"}"#),
        (names::LIST_FILES, r#"{"glob": "/etc/*"}"#),
    ] {
        let result = invoke(&session, tool, args).await;
        assert!(
            matches!(result.error(), Some(ToolError::PathEscape { .. })),
            "{tool} {args}: {:?}",
            result.outcome
        );
    }
}

#[tokio::test]
async fn unknown_tool_never_reaches_a_handler() {
    let dir = api_repo();
    let session = open(&dir).await;
    let before = snapshot(dir.path());

    let result = invoke(&session, "git_push", r#"{"remote": "origin"}"#).await;
    assert_eq!(result.error(), Some(&ToolError::UnknownTool("git_push".into())));
    assert_eq!(snapshot(dir.path()), before);
}

#[tokio::test]
async fn status_is_idempotent() {
    let dir = api_repo();
    write(dir.path(), "a.py", "API_BASE = None\n");
    write(dir.path(), "notes.txt", "untracked\n");
    git(dir.path(), &["add", "notes.txt"]);
    write(dir.path(), "scratch.txt", "also untracked\n");
    let session = open(&dir).await;

    let first = session.accessor().status().await.unwrap();
    let second = session.accessor().status().await.unwrap();
    assert_eq!(first, second);
    let paths: Vec<&str> = first.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["a.py", "notes.txt", "scratch.txt"]);
}

#[tokio::test]
async fn assembled_context_never_exceeds_the_budget() {
    let dir = api_repo();
    for i in 0..30 {
        write(
            dir.path(),
            &format!("src/mod{i}.py"),
            &format!("from a import API_BASE\nURL_{i} = API_BASE + \"/{i}\"\n"),
        );
    }
    commit_all(dir.path(), "add modules");
    let session = open(&dir).await;

    let results = vec![
        invoke(&session, names::SEARCH_CODE, r#"{"query": "API_BASE", "limit": 20}"#).await,
        invoke(&session, names::READ_FILE, r#"{"path": "a.py"}"#).await,
        invoke(&session, names::GIT_LOG, "{}").await,
        invoke(&session, names::LIST_FILES, "{}").await,
        invoke(&session, names::READ_FILE, r#"{"path": "missing.py"}"#).await,
    ];

    for max_chars in [0, 1, 16, 64, 100, 250, 512, 1_000, 2_500, 10_000, 1_000_000] {
        let mut budget = ContextBudget::from_chars(max_chars);
        let payload = assemble(&results, &mut budget);
        assert!(
            payload.serialized_len() <= max_chars,
            "{} > {max_chars}",
            payload.serialized_len()
        );
        assert_eq!(payload.serialized_len(), budget.consumed());
        assert_eq!(payload.sections.len(), results.len());
    }
}

#[tokio::test]
async fn exact_substring_outranks_token_overlap() {
    let dir = init_repo();
    write(dir.path(), "a_overlap.txt", "base api\n");
    write(
        dir.path(),
        "z_exact.txt",
        "this configuration line mentions the api base url somewhere in the middle\n",
    );
    commit_all(dir.path(), "init");
    let session = open(&dir).await;

    let hits = session
        .search()
        .search("api base", SearchKind::Content, 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].target.key(), "z_exact.txt");
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn repository_is_unchanged_by_every_tool() {
    let dir = api_repo();
    write(dir.path(), "a.py", "API_BASE = \"https://staging.example.com\"\n");
    commit_all(dir.path(), "point at staging");
    git(dir.path(), &["branch", "feature"]);
    write(dir.path(), "b.py", "# edited but not committed\n");
    write(dir.path(), "new.txt", "untracked\n");
    let session = open(&dir).await;
    let before = snapshot(dir.path());

    let calls = [
        (names::SEARCH_CODE, r#"{"query": "API_BASE"}"#),
        (names::SEARCH_CODE, r#"{"query": "a.py", "kind": "path"}"#),
        (names::SEARCH_CODE, r#"{"query": "staging", "kind": "commit"}"#),
        (names::READ_FILE, r#"{"path": "a.py"}"#),
        (names::READ_FILE, r#"{"path": "a.py", "revision": "HEAD~1", "start_line": 1, "end_line": 2}"#),
        (names::GIT_LOG, r#"{"limit": 5, "path": "a.py"}"#),
        (names::GIT_DIFF, "{}"),
        (names::GIT_DIFF, r#"{"ref_a": "HEAD~1", "ref_b": "HEAD"}"#),
        (names::GIT_STATUS, "{}"),
        (names::LIST_FILES, r#"{"glob": "*.py"}"#),
        (names::GIT_SHOW, r#"{"revision": "HEAD", "include_diff": true}"#),
        (names::GIT_BRANCHES, "{}"),
        (names::GIT_DIFF, r#"{"target": "staged"}"#),
        (names::GIT_DIFF, r#"{"target": "unstaged"}"#),
        (names::FIND_SYMBOL, r#"{"name": "API_BASE"}"#),
        (names::FILE_OUTLINE, r#"{"path": "a.py"}"#),
        (names::FILE_OUTLINE, r#"{"path": "a.py", "revision": "HEAD~1"}"#),
        (names::PROJECT_TREE, "{}"),
    ];
    for (tool, args) in calls {
        let result = invoke(&session, tool, args).await;
        assert!(result.is_success(), "{tool} {args}: {:?}", result.outcome);
        assert_eq!(snapshot(dir.path()), before, "{tool} changed the repository");
    }
}

#[tokio::test]
async fn touched_but_unchanged_files_are_not_reported() {
    let dir = api_repo();
    let session = open(&dir).await;
    // Identical bytes with a newer mtime leave the index entry stat-dirty.
    std::thread::sleep(Duration::from_millis(1100));
    write(dir.path(), "a.py", "API_BASE = \"https://api.example.com\"\nTIMEOUT = 30\n");
    let before = snapshot(dir.path());

    for (tool, args) in [
        (names::GIT_STATUS, "{}"),
        (names::GIT_DIFF, "{}"),
        (names::GIT_DIFF, r#"{"target": "unstaged"}"#),
    ] {
        let result = invoke(&session, tool, args).await;
        assert!(result.is_success(), "{tool} {args}: {:?}", result.outcome);
        assert_eq!(result.payload().map(ToolPayload::len), Some(0), "{tool} {args}");
        assert_eq!(snapshot(dir.path()), before, "{tool} rewrote the index");
    }
}
