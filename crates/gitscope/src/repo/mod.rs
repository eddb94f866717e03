//! Read-only access to one local Git repository.
//!
//! [`RepoAccessor`] is the only component that talks to git. It exposes a
//! fixed set of read operations; there is no method that stages, commits,
//! checks out, or otherwise changes the repository. Every operation first
//! re-resolves the [`RepoHandle`] (HEAD and a dirty-state signature) so
//! results always describe the repository as it is now.
//!
//! | Operation | Git command |
//! |-----------|-------------|
//! | [`status`](RepoAccessor::status) | `status --porcelain=v1 --branch -z` |
//! | [`read_file`](RepoAccessor::read_file) | working tree read, or `cat-file -s` then `cat-file blob <rev>:<path>` |
//! | [`log`](RepoAccessor::log) | `log --name-only` |
//! | [`diff`](RepoAccessor::diff) | `diff-index`, `diff-index --cached`, `diff-files` or `diff-tree` |
//! | [`list_files`](RepoAccessor::list_files) | `ls-files --cached --others --exclude-standard` |
//! | [`project_tree`](RepoAccessor::project_tree) | `ls-files`, folded into directories |
//! | [`show_commit`](RepoAccessor::show_commit) | `log -1` plus `diff-tree <rev>^ <rev>` |
//! | [`branches`](RepoAccessor::branches) | `for-each-ref refs/heads` |
//!
//! Diffs go through the plumbing commands because porcelain `git diff`
//! refreshes stale stat data in `.git/index` as a side effect.

pub mod git;
pub mod parse;
pub mod paths;
pub mod tree;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use globset::GlobBuilder;
use serde::Serialize;
use tracing::debug;

use crate::error::{SessionError, ToolError};
pub use git::GitRunner;

/// Largest file `read_file` will load, from the working tree or a revision.
pub const MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

/// Tree ids of the empty tree, used as the base on an unborn branch.
const EMPTY_TREE_SHA1: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
const EMPTY_TREE_SHA256: &str = "6ef19b41225c5369f1c104d45d8d85efa9b057b53b14b4b9b939dd74decc5321";

/// Options shared by every diff invocation. The explicit prefixes keep the
/// `a/` and `b/` sides stable whatever the user's diff configuration says.
const DIFF_ARGS: [&str; 7] = [
    "-p",
    "-M",
    "--no-color",
    "--no-ext-diff",
    "--no-textconv",
    "--src-prefix=a/",
    "--dst-prefix=b/",
];

// ── Value types ────────────────────────────────────────────────────

/// Snapshot of repository identity, refreshed before every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoHandle {
    /// Canonical work-tree root.
    pub root: PathBuf,
    /// Commit HEAD points at; `None` on an unborn branch.
    pub head: Option<String>,
    /// Checked-out branch; `None` when HEAD is detached.
    pub branch: Option<String>,
    /// FNV-1a hash of the porcelain status. Equal signatures mean an
    /// unchanged working tree.
    pub dirty_signature: u64,
}

impl RepoHandle {
    pub fn is_clean(&self) -> bool {
        self.dirty_signature == EMPTY_SIGNATURE
    }
}

/// A file (or part of one) in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// 1-based inclusive line range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,
    /// Commit id the content was read at; `None` for the working tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl FileRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line_range: None,
            revision: None,
        }
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.line_range = Some((start, end));
        self
    }

    pub fn at_revision(mut self, rev: impl Into<String>) -> Self {
        self.revision = Some(rev.into());
        self
    }

    /// `path`, `path:12`, `path:10-20`, with `@abc1234` when read at a revision.
    pub fn provenance(&self) -> String {
        let mut out = self.path.clone();
        match self.line_range {
            Some((s, e)) if s == e => out.push_str(&format!(":{s}")),
            Some((s, e)) => out.push_str(&format!(":{s}-{e}")),
            None => {}
        }
        if let Some(rev) = &self.revision {
            out.push('@');
            out.push_str(short_id(rev));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed { from: String },
}

impl ChangeKind {
    pub fn label(&self) -> String {
        match self {
            ChangeKind::Added => "added".into(),
            ChangeKind::Modified => "modified".into(),
            ChangeKind::Deleted => "deleted".into(),
            ChangeKind::Renamed { from } => format!("renamed from {from}"),
        }
    }
}

/// What a [`DiffEntry`] compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiffOrigin {
    /// Uncommitted changes, against `base` (HEAD when `None`).
    WorkingTree { base: Option<String> },
    /// The index against `base` (HEAD when `None`).
    Staged { base: Option<String> },
    /// The working tree against the index.
    Unstaged,
    /// Two commits.
    Commits { from: String, to: String },
}

impl DiffOrigin {
    pub fn describe(&self) -> String {
        match self {
            DiffOrigin::WorkingTree { base: None } => "working tree".into(),
            DiffOrigin::WorkingTree { base: Some(b) } => {
                format!("{}..working tree", short_id(b))
            }
            DiffOrigin::Staged { base: None } => "staged".into(),
            DiffOrigin::Staged { base: Some(b) } => format!("{}..index", short_id(b)),
            DiffOrigin::Unstaged => "unstaged".into(),
            DiffOrigin::Commits { from, to } => format!("{}..{}", short_id(from), short_id(to)),
        }
    }
}

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub path: String,
    pub kind: ChangeKind,
    /// Unified hunks. Empty for status entries and pure renames.
    pub hunk: String,
    pub origin: DiffOrigin,
}

/// A commit without its diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub id: String,
    pub author: String,
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
    pub changed_paths: Vec<String>,
}

impl CommitSummary {
    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A commit plus, when requested, its diff against the first parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitDetail {
    pub summary: CommitSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Vec<DiffEntry>>,
}

/// Text read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSlice {
    /// Location, with the effective line range.
    pub file: FileRef,
    pub text: String,
    pub total_lines: u32,
    /// Line to keep in view if the slice has to be shortened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_line: Option<u32>,
}

/// Working-tree state together with the branch it sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// `None` when HEAD is detached.
    pub branch: Option<String>,
    /// `None` on an unborn branch.
    pub head: Option<String>,
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub tip: String,
    pub current: bool,
}

/// Second side of [`RepoAccessor::diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffTarget<'a> {
    Revision(&'a str),
    /// Staged and unstaged changes together.
    WorkingTree,
    /// What `git commit` would record.
    Staged,
    /// Edits not yet added to the index. Always compared with the index.
    Unstaged,
}

/// Line selection for [`RepoAccessor::read_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineRequest {
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub focus: Option<u32>,
}

/// Abbreviate a commit id for display.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(7) {
        Some((idx, _)) => id.split_at(idx).0,
        None => id,
    }
}

// ── Accessor ───────────────────────────────────────────────────────

const EMPTY_SIGNATURE: u64 = 0xcbf29ce484222325;

/// FNV-1a over the porcelain status bytes.
fn signature(bytes: &[u8]) -> u64 {
    let mut hash: u64 = EMPTY_SIGNATURE;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Read-only operations over one work tree.
#[derive(Debug)]
pub struct RepoAccessor {
    git: GitRunner,
    handle: Mutex<RepoHandle>,
    empty_tree: &'static str,
}

impl RepoAccessor {
    /// Open the work tree containing `path`.
    ///
    /// Fails when `path` is not inside a non-bare git work tree.
    pub async fn open(path: impl AsRef<Path>, git_timeout: Duration) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let not_a_repo = || SessionError::NotARepository {
            path: path.display().to_string(),
        };
        let start = tokio::fs::canonicalize(path)
            .await
            .map_err(|_| not_a_repo())?;

        let probe = GitRunner::new(&start).with_timeout(git_timeout);
        let inside = probe
            .run_text(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|_| not_a_repo())?;
        if inside.trim() != "true" {
            return Err(not_a_repo());
        }
        let top = probe
            .run_text(&["rev-parse", "--show-toplevel"])
            .await
            .map_err(|_| not_a_repo())?;
        let root = tokio::fs::canonicalize(PathBuf::from(top.trim()))
            .await
            .map_err(|_| not_a_repo())?;
        let empty_tree = match probe.run_text(&["rev-parse", "--show-object-format"]).await {
            Ok(format) if format.trim() == "sha256" => EMPTY_TREE_SHA256,
            _ => EMPTY_TREE_SHA1,
        };

        let accessor = Self {
            git: GitRunner::new(&root).with_timeout(git_timeout),
            handle: Mutex::new(RepoHandle {
                root,
                head: None,
                branch: None,
                dirty_signature: EMPTY_SIGNATURE,
            }),
            empty_tree,
        };
        let handle = accessor.refresh().await?;
        debug!(
            "Opened repository {} (branch={}, head={})",
            handle.root.display(),
            handle.branch.as_deref().unwrap_or("detached"),
            handle.head.as_deref().map_or("unborn", short_id)
        );
        Ok(accessor)
    }

    pub fn root(&self) -> &Path {
        self.git.root()
    }

    /// The most recently resolved handle.
    pub fn handle(&self) -> RepoHandle {
        self.handle.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Re-resolve HEAD and the dirty signature.
    pub async fn refresh(&self) -> Result<RepoHandle, ToolError> {
        let (handle, _) = self.refresh_with_status().await?;
        Ok(handle)
    }

    /// Refresh, returning the porcelain entry fields alongside the handle.
    async fn refresh_with_status(&self) -> Result<(RepoHandle, String), ToolError> {
        let head = self.resolve_head().await?;
        let porcelain = self.porcelain().await?;
        let (header, entries) = parse::split_branch_header(&porcelain);
        let handle = RepoHandle {
            root: self.root().to_path_buf(),
            head,
            branch: header.and_then(parse::parse_branch_header),
            dirty_signature: signature(entries.as_bytes()),
        };
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = handle.clone();
        Ok((handle, entries.to_string()))
    }

    async fn resolve_head(&self) -> Result<Option<String>, ToolError> {
        match self
            .git
            .run_text(&["rev-parse", "--verify", "--quiet", "HEAD^{commit}"])
            .await
        {
            Ok(out) => Ok(Some(out.trim().to_string())),
            // Unborn branch: nothing to resolve yet.
            Err(ToolError::Git { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn porcelain(&self) -> Result<String, ToolError> {
        self.git
            .run_text(&[
                "status",
                "--porcelain=v1",
                "--branch",
                "-z",
                "--untracked-files=all",
                "--ignore-submodules=dirty",
            ])
            .await
    }

    /// Resolve a revision to a full commit id.
    pub async fn resolve_commit(&self, rev: &str) -> Result<String, ToolError> {
        git::validate_revision(rev)?;
        let spec = format!("{rev}^{{commit}}");
        match self
            .git
            .run_text(&["rev-parse", "--verify", "--quiet", &spec])
            .await
        {
            Ok(out) => Ok(out.trim().to_string()),
            Err(ToolError::Git { .. }) => Err(ToolError::not_found(format!("revision '{rev}'"))),
            Err(e) => Err(e),
        }
    }

    // ── status ─────────────────────────────────────────────────────

    /// Uncommitted changes (staged, unstaged and untracked), sorted by path,
    /// with the current branch.
    pub async fn status(&self) -> Result<StatusReport, ToolError> {
        let (handle, porcelain) = self.refresh_with_status().await?;
        Ok(StatusReport {
            branch: handle.branch,
            head: handle.head,
            entries: parse::parse_porcelain(&porcelain),
        })
    }

    // ── read_file ──────────────────────────────────────────────────

    /// Read a file from the working tree, or from `file.revision` when set.
    pub async fn read_file(
        &self,
        file: &FileRef,
        lines: LineRequest,
    ) -> Result<FileSlice, ToolError> {
        let rel = paths::normalize(&file.path)?;
        if rel.is_empty() {
            return Err(ToolError::invalid(
                "path names the repository root; use list_files to see its contents",
            ));
        }
        self.refresh().await?;

        let (text, revision) = match &file.revision {
            Some(rev) => {
                let commit = self.resolve_commit(rev).await?;
                let object = format!("{commit}:{rel}");
                let missing = || ToolError::not_found(format!("file '{rel}' at revision '{rev}'"));
                let size = match self.git.run_text(&["cat-file", "-s", &object]).await {
                    Ok(size) => size.trim().parse::<u64>().map_err(|e| {
                        ToolError::Malformed(format!("object size '{}': {e}", size.trim()))
                    })?,
                    Err(ToolError::Git { .. }) => return Err(missing()),
                    Err(e) => return Err(e),
                };
                check_read_size(&rel, size)?;
                let bytes = match self.git.run(&["cat-file", "blob", &object]).await {
                    Ok(b) => b,
                    Err(ToolError::Git { .. }) => {
                        return Err(ToolError::invalid(format!(
                            "'{rel}' at revision '{rev}' is not a file"
                        )));
                    }
                    Err(e) => return Err(e),
                };
                (paths::decode_text(&rel, bytes)?, Some(commit))
            }
            None => (self.read_working_text(&rel).await?, None),
        };

        slice_lines(&rel, &text, revision, lines)
    }

    /// Read a working-tree file as text, enforcing the root boundary.
    pub(crate) async fn read_working_text(&self, rel: &str) -> Result<String, ToolError> {
        let full = paths::resolve_in_root(self.root(), rel).await?;
        let meta = tokio::fs::metadata(&full).await?;
        if meta.is_dir() {
            return Err(ToolError::invalid(format!(
                "'{rel}' is a directory; use list_files to see its contents"
            )));
        }
        check_read_size(rel, meta.len())?;
        let bytes = tokio::fs::read(&full).await?;
        paths::decode_text(rel, bytes)
    }

    // ── log ────────────────────────────────────────────────────────

    /// Up to `limit` commits reachable from HEAD, newest first, optionally
    /// restricted to those touching `path`.
    pub async fn log(
        &self,
        limit: usize,
        path: Option<&str>,
    ) -> Result<Vec<CommitSummary>, ToolError> {
        let rel = path.map(paths::normalize).transpose()?;
        let handle = self.refresh().await?;
        if handle.head.is_none() || limit == 0 {
            return Ok(Vec::new());
        }

        let max_count = format!("--max-count={limit}");
        let mut args = vec![
            "log",
            max_count.as_str(),
            parse::LOG_FORMAT,
            "--name-only",
            "--no-color",
            "HEAD",
        ];
        if let Some(rel) = rel.as_deref().filter(|r| !r.is_empty()) {
            args.push("--");
            args.push(rel);
        }
        let raw = self.git.run_text(&args).await?;
        parse::parse_log(&raw)
    }

    // ── diff ───────────────────────────────────────────────────────

    /// Changes between `from` (HEAD when `None`) and `to`.
    ///
    /// On an unborn branch the empty tree stands in for HEAD.
    /// [`DiffTarget::Unstaged`] always compares with the index, so `from`
    /// must be `None` there.
    pub async fn diff(
        &self,
        from: Option<&str>,
        to: DiffTarget<'_>,
    ) -> Result<Vec<DiffEntry>, ToolError> {
        if from.is_some() && to == DiffTarget::Unstaged {
            return Err(ToolError::invalid(
                "unstaged changes are always against the index; drop ref_a or use target 'head'",
            ));
        }
        let handle = self.refresh().await?;
        let base = match from {
            Some(rev) => Some(self.resolve_commit(rev).await?),
            None => None,
        };
        let tree = base
            .clone()
            .or(handle.head)
            .unwrap_or_else(|| self.empty_tree.to_string());

        match to {
            DiffTarget::WorkingTree => {
                let origin = DiffOrigin::WorkingTree { base };
                self.run_diff("diff-index", &[tree.as_str()], &origin).await
            }
            DiffTarget::Staged => {
                let origin = DiffOrigin::Staged { base };
                self.run_diff("diff-index", &["--cached", tree.as_str()], &origin)
                    .await
            }
            DiffTarget::Unstaged => self.run_diff("diff-files", &[], &DiffOrigin::Unstaged).await,
            DiffTarget::Revision(rev) => {
                let to = self.resolve_commit(rev).await?;
                let origin = DiffOrigin::Commits {
                    from: tree.clone(),
                    to: to.clone(),
                };
                self.run_diff("diff-tree", &["-r", tree.as_str(), to.as_str()], &origin)
                    .await
            }
        }
    }

    async fn run_diff(
        &self,
        verb: &str,
        revs: &[&str],
        origin: &DiffOrigin,
    ) -> Result<Vec<DiffEntry>, ToolError> {
        let mut args = vec![verb];
        args.extend_from_slice(&DIFF_ARGS);
        args.extend_from_slice(revs);
        let raw = self.git.run_text(&args).await?;
        Ok(parse::parse_diff(&raw, origin))
    }

    // ── list_files ─────────────────────────────────────────────────

    /// Tracked and untracked (not ignored) files, sorted, optionally
    /// filtered by a glob such as `src/**/*.rs` or `*.py`.
    pub async fn list_files(&self, glob: Option<&str>) -> Result<Vec<String>, ToolError> {
        let matcher = match glob.map(str::trim).filter(|g| !g.is_empty()) {
            Some(pattern) => {
                check_glob(pattern)?;
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(false)
                    .build()
                    .map_err(|e| ToolError::invalid(format!("glob '{pattern}': {e}")))?;
                Some(glob.compile_matcher())
            }
            None => None,
        };
        self.refresh().await?;

        let raw = self
            .git
            .run_text(&["ls-files", "-z", "--cached", "--others", "--exclude-standard"])
            .await?;
        let files: BTreeSet<&str> = raw.split('\0').filter(|f| !f.is_empty()).collect();

        Ok(files
            .into_iter()
            .filter(|f| matcher.as_ref().is_none_or(|m| m.is_match(f)))
            .map(String::from)
            .collect())
    }

    // ── project_tree ───────────────────────────────────────────────

    /// The directory layout under `dir` (the root when `None`), `max_depth`
    /// levels deep, with deeper directories folded into file counts.
    pub async fn project_tree(
        &self,
        dir: Option<&str>,
        max_depth: u32,
    ) -> Result<tree::ProjectTree, ToolError> {
        let root = dir.map(paths::normalize).transpose()?.unwrap_or_default();
        let files = self.list_files(None).await?;
        tree::build_tree(&files, &root, max_depth)
    }

    // ── show_commit ────────────────────────────────────────────────

    /// One commit's metadata and, if `include_diff`, its diff against the
    /// first parent (or the empty tree for a root commit).
    pub async fn show_commit(&self, rev: &str, include_diff: bool) -> Result<CommitDetail, ToolError> {
        self.refresh().await?;
        let id = self.resolve_commit(rev).await?;

        let raw = self
            .git
            .run_text(&[
                "log",
                "--max-count=1",
                parse::LOG_FORMAT,
                "--name-only",
                "--no-color",
                &id,
            ])
            .await?;
        let summary = parse::parse_log(&raw)?
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::not_found(format!("commit '{rev}'")))?;

        let diff = if include_diff {
            let parent_spec = format!("{id}^1");
            let parent = match self
                .git
                .run_text(&["rev-parse", "--verify", "--quiet", &parent_spec])
                .await
            {
                Ok(p) => Some(p.trim().to_string()),
                Err(ToolError::Git { .. }) => None,
                Err(e) => return Err(e),
            };
            let entries = match parent {
                Some(parent) => {
                    let origin = DiffOrigin::Commits {
                        from: parent.clone(),
                        to: id.clone(),
                    };
                    self.run_diff("diff-tree", &["-r", parent.as_str(), id.as_str()], &origin)
                        .await?
                }
                None => {
                    let origin = DiffOrigin::Commits {
                        from: "(root)".into(),
                        to: id.clone(),
                    };
                    self.run_diff("diff-tree", &["-r", self.empty_tree, id.as_str()], &origin)
                        .await?
                }
            };
            Some(entries)
        } else {
            None
        };

        Ok(CommitDetail { summary, diff })
    }

    // ── branches ───────────────────────────────────────────────────

    /// Local branches, sorted by name.
    pub async fn branches(&self) -> Result<Vec<BranchInfo>, ToolError> {
        self.refresh().await?;
        let raw = self
            .git
            .run_text(&["for-each-ref", parse::BRANCH_FORMAT, "refs/heads"])
            .await?;
        Ok(parse::parse_branches(&raw))
    }
}

fn check_read_size(rel: &str, size: u64) -> Result<(), ToolError> {
    if size > MAX_READ_BYTES {
        return Err(ToolError::invalid(format!(
            "'{rel}' is {size} bytes, larger than the {MAX_READ_BYTES} byte read limit"
        )));
    }
    Ok(())
}

/// Globs follow the same boundary rules as paths.
fn check_glob(pattern: &str) -> Result<(), ToolError> {
    if pattern.starts_with('/') || pattern.starts_with('\\') || pattern.starts_with('~') {
        return Err(ToolError::path_escape(pattern));
    }
    if pattern.split(['/', '\\']).any(|part| part == "..") {
        return Err(ToolError::path_escape(pattern));
    }
    Ok(())
}

/// Cut `text` down to the requested lines.
fn slice_lines(
    rel: &str,
    text: &str,
    revision: Option<String>,
    req: LineRequest,
) -> Result<FileSlice, ToolError> {
    let all: Vec<&str> = text.lines().collect();
    let total = all.len() as u32;
    let start = req.start.unwrap_or(1);
    if start == 0 {
        return Err(ToolError::invalid("start_line is 1-based"));
    }
    if let Some(end) = req.end
        && end < start
    {
        return Err(ToolError::invalid(format!(
            "end_line {end} is before start_line {start}"
        )));
    }

    let mut file = FileRef::new(rel);
    file.revision = revision;

    if total == 0 {
        if req.start.is_some_and(|s| s > 1) {
            return Err(ToolError::invalid(format!("'{rel}' is empty")));
        }
        return Ok(FileSlice {
            file,
            text: String::new(),
            total_lines: 0,
            focus_line: None,
        });
    }
    if start > total {
        return Err(ToolError::invalid(format!(
            "start_line {start} is past the end of '{rel}' ({total} lines)"
        )));
    }

    let end = req.end.unwrap_or(total).min(total);
    let text = all[(start - 1) as usize..end as usize].join("\n");
    let focus_line = req.focus.filter(|f| (start..=end).contains(f));

    Ok(FileSlice {
        file: file.with_lines(start, end),
        text,
        total_lines: total,
        focus_line,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::{commit_all, git, init_repo, write};
    use super::*;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(20);

    async fn open(dir: &tempfile::TempDir) -> RepoAccessor {
        RepoAccessor::open(dir.path(), TIMEOUT).await.unwrap()
    }

    #[test]
    fn file_ref_provenance() {
        assert_eq!(FileRef::new("a.py").provenance(), "a.py");
        assert_eq!(FileRef::new("a.py").with_lines(3, 3).provenance(), "a.py:3");
        assert_eq!(
            FileRef::new("a.py")
                .with_lines(10, 20)
                .at_revision("0123456789abcdef")
                .provenance(),
            "a.py:10-20@0123456"
        );
    }

    #[tokio::test]
    async fn open_rejects_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepoAccessor::open(dir.path(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SessionError::NotARepository { .. }));
    }

    #[tokio::test]
    async fn unborn_branch_has_empty_log() {
        let dir = init_repo();
        let repo = open(&dir).await;
        assert_eq!(repo.handle().head, None);
        assert_eq!(repo.handle().branch.as_deref(), Some("main"));
        assert!(repo.log(10, None).await.unwrap().is_empty());
        assert!(repo.branches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unborn_branch_diffs_against_the_empty_tree() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        git(dir.path(), &["add", "a.py"]);
        let repo = open(&dir).await;

        let staged = repo.diff(None, DiffTarget::Staged).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].kind, ChangeKind::Added);

        let working = repo.diff(None, DiffTarget::WorkingTree).await.unwrap();
        assert_eq!(working.len(), 1);
        assert!(working[0].hunk.contains("+x = 1"));
    }

    #[tokio::test]
    async fn status_is_idempotent_and_sorted() {
        let dir = init_repo();
        write(dir.path(), "b.txt", "b\n");
        write(dir.path(), "a.txt", "a\n");
        commit_all(dir.path(), "init");
        write(dir.path(), "a.txt", "changed\n");
        write(dir.path(), "new.txt", "n\n");

        let repo = open(&dir).await;
        let first = repo.status().await.unwrap();
        let second = repo.status().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.branch.as_deref(), Some("main"));
        let paths: Vec<&str> = first.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "new.txt"]);
        assert_eq!(first.entries[0].kind, ChangeKind::Modified);
        assert_eq!(first.entries[1].kind, ChangeKind::Added);
        assert!(!repo.handle().is_clean());
    }

    #[tokio::test]
    async fn clean_repository_has_empty_status() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        commit_all(dir.path(), "init");
        let repo = open(&dir).await;
        assert!(repo.status().await.unwrap().entries.is_empty());
        assert!(repo.handle().is_clean());
    }

    #[tokio::test]
    async fn detached_head_has_no_branch() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        commit_all(dir.path(), "init");
        git(dir.path(), &["checkout", "-q", "--detach", "HEAD"]);
        let repo = open(&dir).await;

        let report = repo.status().await.unwrap();
        assert_eq!(report.branch, None);
        assert!(report.head.is_some());
        assert!(repo.handle().is_clean());
    }

    #[tokio::test]
    async fn read_file_slices_lines() {
        let dir = init_repo();
        write(dir.path(), "a.py", "one\ntwo\nthree\nfour\n");
        commit_all(dir.path(), "init");
        let repo = open(&dir).await;

        let slice = repo
            .read_file(
                &FileRef::new("a.py"),
                LineRequest {
                    start: Some(2),
                    end: Some(3),
                    focus: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(slice.text, "two\nthree");
        assert_eq!(slice.total_lines, 4);
        assert_eq!(slice.file.line_range, Some((2, 3)));
        assert_eq!(slice.focus_line, Some(3));

        let err = repo
            .read_file(
                &FileRef::new("a.py"),
                LineRequest {
                    start: Some(9),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn read_file_errors() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x\n");
        std::fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        commit_all(dir.path(), "init");
        let repo = open(&dir).await;

        let missing = repo
            .read_file(&FileRef::new("missing.py"), LineRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(missing, ToolError::NotFound { .. }));

        let binary = repo
            .read_file(&FileRef::new("blob.bin"), LineRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(binary, ToolError::BinaryContent { .. }));

        for escape in ["/etc/passwd", "../outside", "src/../../x"] {
            let err = repo
                .read_file(&FileRef::new(escape), LineRequest::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::PathEscape { .. }), "{escape}");
        }
    }

    #[tokio::test]
    async fn read_file_at_revision() {
        let dir = init_repo();
        write(dir.path(), "a.py", "old\n");
        commit_all(dir.path(), "first");
        write(dir.path(), "a.py", "new\n");
        commit_all(dir.path(), "second");
        let repo = open(&dir).await;

        let slice = repo
            .read_file(
                &FileRef::new("a.py").at_revision("HEAD~1"),
                LineRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(slice.text, "old");
        assert_eq!(slice.file.revision.as_deref().map(str::len), Some(40));

        let err = repo
            .read_file(
                &FileRef::new("nope.py").at_revision("HEAD"),
                LineRequest::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));

        let err = repo
            .read_file(
                &FileRef::new("a.py").at_revision("no-such-branch"),
                LineRequest::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn read_file_at_revision_respects_the_size_limit() {
        let dir = init_repo();
        let big = "a".repeat(MAX_READ_BYTES as usize + 1);
        write(dir.path(), "big.txt", &big);
        commit_all(dir.path(), "big");
        std::fs::remove_file(dir.path().join("big.txt")).unwrap();
        let repo = open(&dir).await;

        let err = repo
            .read_file(
                &FileRef::new("big.txt").at_revision("HEAD"),
                LineRequest::default(),
            )
            .await
            .unwrap_err();
        let ToolError::InvalidArgument(message) = err else {
            panic!("expected an invalid-argument error, got {err:?}");
        };
        assert!(message.contains("byte read limit"), "{message}");
    }

    #[tokio::test]
    async fn log_is_newest_first_and_filtered() {
        let dir = init_repo();
        write(dir.path(), "a.py", "1\n");
        commit_all(dir.path(), "add a");
        write(dir.path(), "b.py", "1\n");
        commit_all(dir.path(), "add b");
        write(dir.path(), "a.py", "2\n");
        commit_all(dir.path(), "edit a");
        let repo = open(&dir).await;

        let all = repo.log(10, None).await.unwrap();
        let subjects: Vec<&str> = all.iter().map(|c| c.subject()).collect();
        assert_eq!(subjects, vec!["edit a", "add b", "add a"]);
        assert_eq!(all[1].changed_paths, vec!["b.py"]);

        assert_eq!(repo.log(2, None).await.unwrap().len(), 2);
        let only_a = repo.log(10, Some("a.py")).await.unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(matches!(
            repo.log(10, Some("../a.py")).await,
            Err(ToolError::PathEscape { .. })
        ));
    }

    #[tokio::test]
    async fn diff_working_tree_and_commits() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        commit_all(dir.path(), "first");
        write(dir.path(), "a.py", "x = 2\n");
        commit_all(dir.path(), "second");
        write(dir.path(), "a.py", "x = 3\n");
        let repo = open(&dir).await;

        let working = repo.diff(None, DiffTarget::WorkingTree).await.unwrap();
        assert_eq!(working.len(), 1);
        assert!(working[0].hunk.contains("+x = 3"));
        assert_eq!(working[0].origin, DiffOrigin::WorkingTree { base: None });

        let between = repo
            .diff(Some("HEAD~1"), DiffTarget::Revision("HEAD"))
            .await
            .unwrap();
        assert_eq!(between.len(), 1);
        assert!(between[0].hunk.contains("-x = 1"));
        assert!(between[0].hunk.contains("+x = 2"));
        assert!(matches!(between[0].origin, DiffOrigin::Commits { .. }));

        assert!(matches!(
            repo.diff(Some("nope"), DiffTarget::WorkingTree).await,
            Err(ToolError::NotFound { .. })
        ));
        assert!(matches!(
            repo.diff(Some("--output=x"), DiffTarget::WorkingTree).await,
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn diff_separates_staged_and_unstaged() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        write(dir.path(), "b.py", "y = 1\n");
        commit_all(dir.path(), "init");
        write(dir.path(), "a.py", "x = 2\n");
        git(dir.path(), &["add", "a.py"]);
        write(dir.path(), "b.py", "y = 2\n");
        let repo = open(&dir).await;

        let staged = repo.diff(None, DiffTarget::Staged).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].path, "a.py");
        assert_eq!(staged[0].origin, DiffOrigin::Staged { base: None });

        let unstaged = repo.diff(None, DiffTarget::Unstaged).await.unwrap();
        assert_eq!(unstaged.len(), 1);
        assert_eq!(unstaged[0].path, "b.py");
        assert_eq!(unstaged[0].origin, DiffOrigin::Unstaged);

        let both = repo.diff(None, DiffTarget::WorkingTree).await.unwrap();
        let paths: Vec<&str> = both.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);

        assert!(matches!(
            repo.diff(Some("HEAD"), DiffTarget::Unstaged).await,
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn diff_paths_ignore_prefix_configuration() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        write(dir.path(), "inner.txt", "old\n");
        commit_all(dir.path(), "init");
        write(dir.path(), "a.py", "x = 2\n");
        write(dir.path(), "inner.txt", "new\n");
        let repo = open(&dir).await;

        git(dir.path(), &["config", "diff.mnemonicPrefix", "true"]);
        let entries = repo.diff(None, DiffTarget::WorkingTree).await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "inner.txt"]);

        git(dir.path(), &["config", "diff.noprefix", "true"]);
        let entries = repo.diff(Some("HEAD"), DiffTarget::WorkingTree).await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "inner.txt"]);
    }

    #[tokio::test]
    async fn stale_stat_data_is_not_a_change() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        commit_all(dir.path(), "init");
        let index = dir.path().join(".git").join("index");
        let before = std::fs::read(&index).unwrap();

        // Same bytes, newer mtime: the index entry is now stat-dirty.
        std::thread::sleep(Duration::from_millis(1100));
        write(dir.path(), "a.py", "x = 1\n");

        let repo = open(&dir).await;
        assert!(repo.diff(None, DiffTarget::WorkingTree).await.unwrap().is_empty());
        assert!(repo.diff(None, DiffTarget::Unstaged).await.unwrap().is_empty());
        assert!(repo.status().await.unwrap().entries.is_empty());
        assert_eq!(std::fs::read(&index).unwrap(), before);
    }

    #[tokio::test]
    async fn list_files_honors_gitignore_and_globs() {
        let dir = init_repo();
        write(dir.path(), ".gitignore", "target/\n");
        write(dir.path(), "src/main.rs", "fn main() {}\n");
        write(dir.path(), "README.md", "# hi\n");
        commit_all(dir.path(), "init");
        write(dir.path(), "target/out.txt", "ignored\n");
        write(dir.path(), "notes.md", "untracked\n");
        let repo = open(&dir).await;

        let all = repo.list_files(None).await.unwrap();
        assert_eq!(all, vec![".gitignore", "README.md", "notes.md", "src/main.rs"]);

        let md = repo.list_files(Some("*.md")).await.unwrap();
        assert_eq!(md, vec!["README.md", "notes.md"]);

        assert!(matches!(
            repo.list_files(Some("../**")).await,
            Err(ToolError::PathEscape { .. })
        ));
        assert!(matches!(
            repo.list_files(Some("[")).await,
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn show_commit_and_branches() {
        let dir = init_repo();
        write(dir.path(), "a.py", "x = 1\n");
        commit_all(dir.path(), "root commit");
        write(dir.path(), "a.py", "x = 2\n");
        commit_all(dir.path(), "bump x");
        git(dir.path(), &["branch", "feature"]);
        let repo = open(&dir).await;

        let detail = repo.show_commit("HEAD", true).await.unwrap();
        assert_eq!(detail.summary.subject(), "bump x");
        let diff = detail.diff.unwrap();
        assert_eq!(diff.len(), 1);
        assert!(diff[0].hunk.contains("+x = 2"));

        let root = repo.show_commit("HEAD~1", true).await.unwrap();
        assert_eq!(root.diff.unwrap()[0].kind, ChangeKind::Added);

        assert!(repo.show_commit("HEAD", false).await.unwrap().diff.is_none());

        let branches = repo.branches().await.unwrap();
        let names: Vec<(&str, bool)> = branches
            .iter()
            .map(|b| (b.name.as_str(), b.current))
            .collect();
        assert_eq!(names, vec![("feature", false), ("main", true)]);
    }
}
