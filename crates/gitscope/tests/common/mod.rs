//! Shared fixtures: throwaway git repositories and a scripted model.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use gitscope::api::{ModelClient, ModelFuture};
use gitscope::error::ModelError;
use gitscope::{ChatCompletion, ChatRequest, ToolCall};

// ── Repositories ───────────────────────────────────────────────────

/// Run git in `dir` and return stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .env_remove("GIT_INDEX_FILE")
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Empty repository on branch `main`.
pub fn init_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    dir
}

pub fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Every work-tree file (outside `.git`) with its bytes, every ref, and the
/// index file byte for byte.
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<PathBuf, Vec<u8>>,
    refs: String,
    head: String,
    index: Option<Vec<u8>>,
}

pub fn snapshot(dir: &Path) -> Snapshot {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.file_name().is_some_and(|n| n == ".git") {
                continue;
            }
            if entry.file_type().unwrap().is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }

    let mut files = BTreeMap::new();
    walk(dir, dir, &mut files);
    Snapshot {
        files,
        refs: git(dir, &["for-each-ref", "--format=%(refname) %(objectname)"]),
        head: git(dir, &["symbolic-ref", "HEAD"]),
        index: std::fs::read(dir.join(".git").join("index")).ok(),
    }
}

// ── Model ──────────────────────────────────────────────────────────

/// A [`ModelClient`] that replays canned completions in order and records
/// every request it receives.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ChatCompletion, ModelError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ChatCompletion>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Content of the tool message answering `call_id` in the last request.
    pub fn tool_message(&self, call_id: &str) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()?
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some(call_id))
            .and_then(|m| m.content.clone())
    }
}

impl ModelClient for ScriptedModel {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ModelFuture<'a> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatCompletion::text("(script exhausted)")));
        Box::pin(async move { reply })
    }
}

/// A completion requesting a single tool call.
pub fn call(id: &str, tool: &str, arguments: &str) -> ChatCompletion {
    ChatCompletion::with_tool_calls(vec![ToolCall::function(id, tool, arguments)])
}
