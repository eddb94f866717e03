//! The read-only repository tools.
//!
//! Each tool is a thin adapter: typed arguments in, a call on
//! [`RepoAccessor`] or [`SearchEngine`], a [`ToolPayload`] out. Argument
//! structs derive `JsonSchema` so the schema sent to the model and the
//! deserialization here cannot drift apart.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use super::core::{Tool, ToolFuture, ToolPayload, parse_tool_args};
use super::names;
use super::sealed::Sealed;
use super::spec::ToolDoc;
use crate::ToolDef;
use crate::error::ToolError;
use crate::repo::tree::{DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH};
use crate::repo::{DiffTarget, FileRef, LineRequest, RepoAccessor};
use crate::search::{SearchEngine, SearchKind, symbols};

/// Default number of commits returned by `git_log`.
const DEFAULT_LOG_LIMIT: usize = 10;
/// Default number of definitions returned by `find_symbol`.
const DEFAULT_SYMBOL_LIMIT: usize = 10;

/// Resolve an optional `limit` argument against its cap.
fn resolve_limit(limit: Option<u32>, default: usize, cap: usize) -> Result<usize, ToolError> {
    match limit {
        None => Ok(default.min(cap)),
        Some(0) => Err(ToolError::invalid("limit must be at least 1")),
        Some(n) if n as usize > cap => Err(ToolError::invalid(format!(
            "limit {n} exceeds the maximum of {cap}"
        ))),
        Some(n) => Ok(n as usize),
    }
}

// ── search_code ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchCodeArgs {
    /// Text to look for: an identifier, a phrase, or words describing it.
    pub query: String,
    /// `content` searches file text, `path` matches file paths, `commit`
    /// searches commit messages.
    #[serde(default)]
    pub kind: SearchKind,
    /// Maximum number of hits.
    #[serde(default)]
    pub limit: Option<u32>,
}

pub struct SearchCode {
    engine: Arc<SearchEngine>,
    max_hits: usize,
}

impl SearchCode {
    pub fn new(engine: Arc<SearchEngine>, max_hits: usize) -> Self {
        Self { engine, max_hits }
    }
}

impl Sealed for SearchCode {}

impl Tool for SearchCode {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::SEARCH_CODE,
            "Search file contents, file paths or commit messages and return ranked hits with their locations",
        )
        .args::<SearchCodeArgs>()
        .range("limit", 1, self.max_hits as u64)
        .use_when("when you do not yet know which file or commit holds the answer, then read_file around the best hits")
        .instead("when you want where a named function, class or constant is declared", names::FIND_SYMBOL)
        .instead("when you need every file matching a pattern such as *.toml", names::LIST_FILES)
        .instead("when you already know the exact path", names::READ_FILE)
        .sample(r#"search_code(query="API_BASE")"#, "lines defining or using API_BASE, best match first")
        .sample(r#"search_code(query="config", kind="path")"#, "files whose path mentions config")
        .renders("one `[path:line score=N]` block per hit, followed by the matched line")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<SearchCodeArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let limit = resolve_limit(args.limit, self.max_hits, self.max_hits)?;
            let hits = self.engine.search(&args.query, args.kind, limit).await?;
            Ok(ToolPayload::Hits(hits))
        })
    }
}

// ── find_symbol ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FindSymbolArgs {
    /// Exact identifier: a function, method, class, struct, type or constant name.
    pub name: String,
    /// Maximum number of definitions.
    #[serde(default)]
    pub limit: Option<u32>,
}

pub struct FindSymbol {
    engine: Arc<SearchEngine>,
    max_hits: usize,
}

impl FindSymbol {
    pub fn new(engine: Arc<SearchEngine>, max_hits: usize) -> Self {
        Self { engine, max_hits }
    }
}

impl Sealed for FindSymbol {}

impl Tool for FindSymbol {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::FIND_SYMBOL,
            "Find where an identifier is declared: functions, classes, structs, types, constants",
        )
        .args::<FindSymbolArgs>()
        .range("limit", 1, self.max_hits as u64)
        .use_when("when a question names a function, class or constant and you need its definition")
        .instead("for call sites, usages or free text", names::SEARCH_CODE)
        .sample(r#"find_symbol(name="API_BASE")"#, "the line that assigns API_BASE")
        .renders("one `[path:line kind]` block per declaration with the declaring line")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<FindSymbolArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let limit = resolve_limit(args.limit, DEFAULT_SYMBOL_LIMIT, self.max_hits)?;
            let hits = self.engine.find_definitions(&args.name, limit).await?;
            Ok(ToolPayload::Hits(hits))
        })
    }
}

// ── read_file ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadFileArgs {
    /// Path relative to the repository root.
    pub path: String,
    /// First line to return (1-based).
    #[serde(default)]
    pub start_line: Option<u32>,
    /// Last line to return (inclusive).
    #[serde(default)]
    pub end_line: Option<u32>,
    /// Branch, tag or commit to read from. Defaults to the working tree.
    #[serde(default)]
    pub revision: Option<String>,
    /// Line to keep in view if the output has to be shortened.
    #[serde(default)]
    pub focus_line: Option<u32>,
}

pub struct ReadFile {
    repo: Arc<RepoAccessor>,
}

impl ReadFile {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for ReadFile {}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::READ_FILE,
            "Read a text file from the repository, optionally a line range or at a revision",
        )
        .args::<ReadFileArgs>()
        .range("start_line", 1, u32::MAX as u64)
        .range("end_line", 1, u32::MAX as u64)
        .range("focus_line", 1, u32::MAX as u64)
        .use_when("after a search or outline has told you where to look, reading a window around the lines you need")
        .instead("to see a large file's declarations before choosing lines", names::FILE_OUTLINE)
        .instead("to find out where something is", names::SEARCH_CODE)
        .sample(r#"read_file(path="src/a.py", start_line=10, end_line=40)"#, "lines 10-40 of src/a.py, numbered")
        .renders("a `[path:start-end of N lines]` header followed by numbered lines")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<ReadFileArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let file = FileRef {
                path: args.path,
                line_range: None,
                revision: args.revision,
            };
            let lines = LineRequest {
                start: args.start_line,
                end: args.end_line,
                focus: args.focus_line,
            };
            Ok(ToolPayload::File(self.repo.read_file(&file, lines).await?))
        })
    }
}

// ── file_outline ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FileOutlineArgs {
    /// Path relative to the repository root.
    pub path: String,
    /// Branch, tag or commit to read from. Defaults to the working tree.
    #[serde(default)]
    pub revision: Option<String>,
}

pub struct FileOutlineTool {
    repo: Arc<RepoAccessor>,
}

impl FileOutlineTool {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for FileOutlineTool {}

impl Tool for FileOutlineTool {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::FILE_OUTLINE,
            "List a source file's imports and declarations with their line numbers",
        )
        .args::<FileOutlineArgs>()
        .use_when("to learn a file's shape (its classes, functions and types) before reading parts of it")
        .instead("for the text of specific lines", names::READ_FILE)
        .sample(r#"file_outline(path="src/lib.rs")"#, "each `fn`, `struct`, `impl` and `use` line of src/lib.rs")
        .renders(
            "a `[path outline, language, N lines]` header followed by numbered declaration lines; \
             files in languages without outline rules show their first 20 lines instead",
        )
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<FileOutlineArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let file = FileRef {
                path: args.path,
                line_range: None,
                revision: args.revision,
            };
            let slice = self.repo.read_file(&file, LineRequest::default()).await?;
            let mut file = slice.file;
            file.line_range = None;
            Ok(ToolPayload::Outline(symbols::outline(file, &slice.text)))
        })
    }
}

// ── project_tree ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProjectTreeArgs {
    /// Directory to start from, relative to the repository root. Defaults to the root.
    #[serde(default)]
    pub path: Option<String>,
    /// Levels to show; deeper directories are folded into a file count. Defaults to 2.
    #[serde(default)]
    pub max_depth: Option<u32>,
}

pub struct ProjectTreeTool {
    repo: Arc<RepoAccessor>,
}

impl ProjectTreeTool {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for ProjectTreeTool {}

impl Tool for ProjectTreeTool {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::PROJECT_TREE,
            "Show the repository's directory layout, a few levels deep",
        )
        .args::<ProjectTreeArgs>()
        .range("max_depth", 1, MAX_TREE_DEPTH as u64)
        .use_when("at the start of a question about an unfamiliar repository; or to see what a directory contains")
        .instead("for a flat list of every file matching a glob", names::LIST_FILES)
        .sample("project_tree()", "top-level files and directories, one level of subdirectories, deeper ones folded")
        .sample(r#"project_tree(path="src", max_depth=3)"#, "the layout under src, three levels deep")
        .renders("one indented line per entry; folded directories end in `/ (N files)`")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<ProjectTreeArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let depth = args.max_depth.unwrap_or(DEFAULT_TREE_DEPTH);
            let tree = self.repo.project_tree(args.path.as_deref(), depth).await?;
            Ok(ToolPayload::Tree(tree))
        })
    }
}

// ── git_log ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitLogArgs {
    /// Maximum number of commits, newest first.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Only commits touching this path.
    #[serde(default)]
    pub path: Option<String>,
}

pub struct GitLog {
    repo: Arc<RepoAccessor>,
    max_entries: usize,
}

impl GitLog {
    pub fn new(repo: Arc<RepoAccessor>, max_entries: usize) -> Self {
        Self { repo, max_entries }
    }
}

impl Sealed for GitLog {}

impl Tool for GitLog {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::GIT_LOG,
            "List recent commits with author, date, message and changed paths",
        )
        .args::<GitLogArgs>()
        .range("limit", 1, self.max_entries as u64)
        .use_when("for history questions: who changed a file, when, and why")
        .instead("to see what one commit changed line by line", names::GIT_SHOW)
        .sample(r#"git_log(limit=5, path="src/a.py")"#, "the last 5 commits touching src/a.py")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<GitLogArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let limit = resolve_limit(args.limit, DEFAULT_LOG_LIMIT, self.max_entries)?;
            let commits = self.repo.log(limit, args.path.as_deref()).await?;
            Ok(ToolPayload::Commits(commits))
        })
    }
}

// ── git_diff ───────────────────────────────────────────────────────

/// Which uncommitted changes `git_diff` shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiffScope {
    /// Staged and unstaged changes together, against `ref_a` (HEAD).
    #[default]
    Head,
    /// Changes added to the index, against `ref_a` (HEAD).
    Staged,
    /// Working-tree edits not yet added to the index.
    Unstaged,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitDiffArgs {
    /// Base revision. Defaults to HEAD.
    #[serde(default)]
    pub ref_a: Option<String>,
    /// Revision to compare against the base. Defaults to the working tree.
    #[serde(default)]
    pub ref_b: Option<String>,
    /// Uncommitted changes to show when `ref_b` is not given.
    #[serde(default)]
    pub target: Option<DiffScope>,
}

impl GitDiffArgs {
    fn diff_target(&self) -> Result<DiffTarget<'_>, ToolError> {
        match (self.ref_b.as_deref(), self.target) {
            (Some(_), Some(_)) => Err(ToolError::invalid(
                "target selects uncommitted changes; it cannot be combined with ref_b",
            )),
            (Some(rev), None) => Ok(DiffTarget::Revision(rev)),
            (None, None | Some(DiffScope::Head)) => Ok(DiffTarget::WorkingTree),
            (None, Some(DiffScope::Staged)) => Ok(DiffTarget::Staged),
            (None, Some(DiffScope::Unstaged)) => Ok(DiffTarget::Unstaged),
        }
    }
}

pub struct GitDiff {
    repo: Arc<RepoAccessor>,
}

impl GitDiff {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for GitDiff {}

impl Tool for GitDiff {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::GIT_DIFF,
            "Show line-level changes between two revisions, or the uncommitted changes in the working tree",
        )
        .args::<GitDiffArgs>()
        .use_when("to see exactly what changed; with no arguments it shows uncommitted changes against HEAD")
        .use_when("with target \"staged\" or \"unstaged\" to split what is about to be committed from what is not")
        .instead("to list which files are modified without their contents", names::GIT_STATUS)
        .instead("for the changes a single commit introduced", names::GIT_SHOW)
        .sample("git_diff()", "uncommitted changes against HEAD")
        .sample(r#"git_diff(target="staged")"#, "only what `git commit` would record")
        .sample(r#"git_diff(ref_a="main", ref_b="feature")"#, "changes from main to feature")
        .renders("one `[path (kind, origin)]` block per file with its unified hunks")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<GitDiffArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let to = args.diff_target()?;
            let entries = self.repo.diff(args.ref_a.as_deref(), to).await?;
            Ok(ToolPayload::Diffs(entries))
        })
    }
}

// ── git_status ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitStatusArgs {}

pub struct GitStatus {
    repo: Arc<RepoAccessor>,
}

impl GitStatus {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for GitStatus {}

impl Tool for GitStatus {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::GIT_STATUS,
            "Show the current branch and the files with uncommitted changes: staged, unstaged and untracked",
        )
        .args::<GitStatusArgs>()
        .use_when("when asked which branch is checked out, or what is modified, pending or not yet committed")
        .instead("to see the changed lines themselves", names::GIT_DIFF)
        .renders("an `On branch NAME` (or `HEAD detached at ID`) line, then one `path (kind)` line per file")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<GitStatusArgs>(arguments);
        Box::pin(async move {
            let GitStatusArgs {} = args?;
            Ok(ToolPayload::Status(self.repo.status().await?))
        })
    }
}

// ── list_files ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListFilesArgs {
    /// Glob relative to the repository root, e.g. `src/**/*.rs` or `*.md`.
    #[serde(default)]
    pub glob: Option<String>,
}

pub struct ListFiles {
    repo: Arc<RepoAccessor>,
}

impl ListFiles {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for ListFiles {}

impl Tool for ListFiles {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::LIST_FILES,
            "List repository files (tracked and untracked, skipping .gitignore'd ones), optionally by glob",
        )
        .args::<ListFilesArgs>()
        .use_when("to get every file matching a glob")
        .instead("for an overview of how the repository is organised", names::PROJECT_TREE)
        .instead("to find files by what they contain", names::SEARCH_CODE)
        .sample(r#"list_files(glob="*.toml")"#, "every TOML file, sorted")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<ListFilesArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            Ok(ToolPayload::Paths(self.repo.list_files(args.glob.as_deref()).await?))
        })
    }
}

// ── git_show ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitShowArgs {
    /// Branch, tag or commit id.
    pub revision: String,
    /// Include the diff against the first parent.
    #[serde(default)]
    pub include_diff: bool,
}

pub struct GitShow {
    repo: Arc<RepoAccessor>,
}

impl GitShow {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for GitShow {}

impl Tool for GitShow {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(
            names::GIT_SHOW,
            "Show one commit's metadata and, when asked, its diff",
        )
        .args::<GitShowArgs>()
        .use_when("after git_log or a commit search hit, to inspect a specific commit")
        .instead("to browse history", names::GIT_LOG)
        .sample(r#"git_show(revision="HEAD", include_diff=true)"#, "the latest commit with its diff")
        .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<GitShowArgs>(arguments);
        Box::pin(async move {
            let args = args?;
            let detail = self.repo.show_commit(&args.revision, args.include_diff).await?;
            Ok(ToolPayload::Commit(detail))
        })
    }
}

// ── git_branches ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GitBranchesArgs {}

pub struct GitBranches {
    repo: Arc<RepoAccessor>,
}

impl GitBranches {
    pub fn new(repo: Arc<RepoAccessor>) -> Self {
        Self { repo }
    }
}

impl Sealed for GitBranches {}

impl Tool for GitBranches {
    fn definition(&self) -> ToolDef {
        ToolDoc::new(names::GIT_BRANCHES, "List local branches and mark the current one")
            .args::<GitBranchesArgs>()
            .use_when("when a question names a branch, or to find revisions for git_diff")
            .into_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<GitBranchesArgs>(arguments);
        Box::pin(async move {
            let GitBranchesArgs {} = args?;
            Ok(ToolPayload::Branches(self.repo.branches().await?))
        })
    }
}
