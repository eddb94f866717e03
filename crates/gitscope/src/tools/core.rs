//! Tool abstraction and the read-only tool registry.
//!
//! The [`Tool`] trait defines the interface every repository tool
//! implements: a static API definition (name, description, JSON schema) and
//! an async `execute` method returning a typed [`ToolPayload`]. The trait is
//! sealed, and [`ToolSet`] exposes no registration method: the only way to
//! build one is [`ToolSet::read_only`], which registers the fixed set of
//! read-only tools.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, trace};

use super::reflection::format_tool_failure;
use super::repo::{
    FileOutlineTool, FindSymbol, GitBranches, GitDiff, GitLog, GitShow, GitStatus, ListFiles,
    ProjectTreeTool, ReadFile, SearchCode,
};
use super::sealed::Sealed;
use crate::error::ToolError;
use crate::repo::tree::ProjectTree;
use crate::repo::{
    BranchInfo, CommitDetail, CommitSummary, DiffEntry, FileSlice, RepoAccessor, StatusReport,
};
use crate::search::symbols::FileOutline;
use crate::search::{SearchEngine, SearchHit};
use crate::{ToolCall, ToolDef};

/// Default timeout for one tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on `git_log` entries.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 50;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolPayload, ToolError>> + Send + 'a>>;

// ── Payloads and results ───────────────────────────────────────────

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ToolPayload {
    Hits(Vec<SearchHit>),
    Diffs(Vec<DiffEntry>),
    Commits(Vec<CommitSummary>),
    File(FileSlice),
    Paths(Vec<String>),
    Branches(Vec<BranchInfo>),
    Commit(CommitDetail),
    Status(StatusReport),
    Tree(ProjectTree),
    Outline(FileOutline),
}

impl ToolPayload {
    /// Number of items carried.
    pub fn len(&self) -> usize {
        match self {
            ToolPayload::Hits(v) => v.len(),
            ToolPayload::Diffs(v) => v.len(),
            ToolPayload::Commits(v) => v.len(),
            ToolPayload::Paths(v) => v.len(),
            ToolPayload::Branches(v) => v.len(),
            ToolPayload::Status(report) => report.entries.len(),
            ToolPayload::Tree(tree) => tree.entries.len(),
            ToolPayload::Outline(outline) => outline.items.len(),
            ToolPayload::File(_) | ToolPayload::Commit(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(ToolPayload),
    /// `reason` is the text shown to the model.
    Failure { error: ToolError, reason: String },
}

/// The result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub turn_id: u64,
    /// Raw arguments as received.
    pub arguments: String,
    pub outcome: ToolOutcome,
    /// Serialized size of the payload (or reason) in bytes.
    pub size: usize,
}

impl ToolResult {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        turn_id: u64,
        arguments: impl Into<String>,
        outcome: ToolOutcome,
    ) -> Self {
        let size = match &outcome {
            ToolOutcome::Success(payload) => serde_json::to_vec(payload).map_or(0, |v| v.len()),
            ToolOutcome::Failure { reason, .. } => reason.len(),
        };
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            turn_id,
            arguments: arguments.into(),
            outcome,
            size,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            ToolOutcome::Failure { error, .. } => Some(error),
            ToolOutcome::Success(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&ToolPayload> {
        match &self.outcome {
            ToolOutcome::Success(payload) => Some(payload),
            ToolOutcome::Failure { .. } => None,
        }
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A read-only repository tool the model can invoke via function calling.
///
/// Sealed: every implementor lives in this crate.
pub trait Tool: Sealed + Send + Sync {
    /// The tool definition sent to the model API.
    fn definition(&self) -> ToolDef;

    /// Execute with raw JSON arguments that already passed schema validation.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().function.name
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// Per-session caps applied to the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    /// Upper bound for `search_code`'s `limit`.
    pub max_search_hits: usize,
    /// Upper bound for `git_log`'s `limit`.
    pub max_log_entries: usize,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_search_hits: crate::search::DEFAULT_MAX_HITS,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// The fixed set of read-only tools, dispatched by name.
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolSet")
            .field("tools", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolSet {
    /// Register every read-only repository tool.
    pub fn read_only(repo: Arc<RepoAccessor>, search: Arc<SearchEngine>, limits: ToolLimits) -> Self {
        let set = Self {
            tools: HashMap::new(),
            timeout: limits.timeout,
        };
        set.with(SearchCode::new(search.clone(), limits.max_search_hits))
            .with(FindSymbol::new(search, limits.max_search_hits))
            .with(ReadFile::new(repo.clone()))
            .with(FileOutlineTool::new(repo.clone()))
            .with(ProjectTreeTool::new(repo.clone()))
            .with(GitLog::new(repo.clone(), limits.max_log_entries))
            .with(GitDiff::new(repo.clone()))
            .with(GitStatus::new(repo.clone()))
            .with(ListFiles::new(repo.clone()))
            .with(GitShow::new(repo.clone()))
            .with(GitBranches::new(repo))
    }

    fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.insert(tool.name(), Box::new(tool));
        self
    }

    /// Tool definitions for the model API, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one tool call made during turn `turn_id`.
    ///
    /// Never fails: unknown tools, invalid arguments, timeouts and handler
    /// errors all come back as a failed [`ToolResult`] whose reason tells
    /// the model how to recover.
    pub async fn invoke(&self, call: &ToolCall, turn_id: u64) -> ToolResult {
        let name = call.function.name.as_str();
        let arguments = if call.function.arguments.trim().is_empty() {
            "{}"
        } else {
            call.function.arguments.as_str()
        };

        let result = match self.tools.get(name) {
            Some(tool) => self.run(tool.as_ref(), name, arguments).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        let outcome = match result {
            Ok(payload) => ToolOutcome::Success(payload),
            Err(error) => {
                info!("[tool] {name} failed: {error}");
                ToolOutcome::Failure {
                    reason: format_tool_failure(name, arguments, &error),
                    error,
                }
            }
        };
        ToolResult::new(call.id.clone(), name, turn_id, arguments, outcome)
    }

    async fn run(&self, tool: &dyn Tool, name: &str, arguments: &str) -> Result<ToolPayload, ToolError> {
        validate_tool_arguments(tool, arguments)?;

        log_tool_call(name, arguments);
        let start = Instant::now();
        let payload = match tokio::time::timeout(self.timeout, tool.execute(arguments)).await {
            Ok(result) => result?,
            Err(_) => {
                info!(
                    "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                    start.elapsed().as_secs_f64(),
                    self.timeout.as_secs_f64(),
                );
                return Err(ToolError::Timeout(self.timeout));
            }
        };

        debug!(
            "Tool {name} completed in {:.0}ms ({} items)",
            start.elapsed().as_secs_f64() * 1000.0,
            payload.len()
        );
        Ok(payload)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate arguments against the tool's declared JSON Schema.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Result<(), ToolError> {
    let value: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| ToolError::invalid(format!("arguments are not valid JSON: {e}")))?;

    let schema = tool.definition().function.parameters;
    // An unusable schema is our bug, not the model's: fall through to typed parsing.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::invalid(format!(
            "argument validation failed:\n{}",
            errors.join("\n")
        )))
    }
}

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, ToolError> {
    serde_json::from_str(arguments).map_err(|e| ToolError::invalid(e.to_string()))
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    debug!("[tool] {name} full args ({} bytes)", arguments.len());
    trace!("[tool] {name} arguments: {arguments}");
}
