//! The only place a `git` process is spawned.
//!
//! [`GitRunner`] refuses any verb outside [`ALLOWED_VERBS`] and any flag in
//! [`FORBIDDEN_FLAGS`] before a process exists, disables pagers, colour,
//! external diff drivers and optional index locks, and kills the child when
//! its timeout elapses.
//!
//! Diffs go through the plumbing verbs (`diff-index`, `diff-files`,
//! `diff-tree`). Porcelain `git diff` refreshes stale stat data in
//! `.git/index` as a side effect, so it is not on the list.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::ToolError;

/// Read-only git verbs.
pub const ALLOWED_VERBS: &[&str] = &[
    "status",
    "diff-index",
    "diff-files",
    "diff-tree",
    "log",
    "ls-files",
    "rev-parse",
    "cat-file",
    "for-each-ref",
];

/// Flags that write files, run programs, or reach a remote.
pub const FORBIDDEN_FLAGS: &[&str] = &[
    "--output",
    "--ext-diff",
    "--textconv",
    "--exec",
    "--upload-pack",
    "--receive-pack",
    "--open-files-in-pager",
    "--git-dir",
    "--work-tree",
    "--filters",
    "--batch-command",
];

/// Default per-process timeout.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(20);

/// Upper bound on captured stdout.
pub const MAX_STDOUT_BYTES: usize = 32 * 1024 * 1024;

/// Options prepended to every invocation.
const BASE_ARGS: &[&str] = &[
    "--no-pager",
    "-c",
    "color.ui=false",
    "-c",
    "core.quotePath=false",
    "-c",
    "core.fsmonitor=false",
    "-c",
    "diff.noprefix=false",
    "-c",
    "diff.mnemonicPrefix=false",
];

/// Runs allow-listed git commands inside one work tree.
#[derive(Debug, Clone)]
pub struct GitRunner {
    root: PathBuf,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `git <args>` and return raw stdout.
    ///
    /// Non-zero exit becomes [`ToolError::Git`]; callers map the cases they
    /// understand (unknown revision, missing blob) to more specific errors.
    /// Output past [`MAX_STDOUT_BYTES`] is [`ToolError::OutputTooLarge`]
    /// rather than a silently cut, half-parsed result.
    pub async fn run(&self, args: &[&str]) -> Result<Vec<u8>, ToolError> {
        check_command(args)?;

        let mut cmd = Command::new("git");
        cmd.args(BASE_ARGS)
            .args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_OPTIONAL_LOCKS", "0")
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!("git {}", args.join(" "));
        let start = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| ToolError::Io(format!("failed to run git: {e}")))?;

        // Dropping the wait future drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ToolError::Io(format!("git: {e}")))?,
            Err(_) => {
                debug!(
                    "git {} timed out after {:.1}s",
                    args.first().copied().unwrap_or(""),
                    start.elapsed().as_secs_f64()
                );
                return Err(ToolError::Timeout(self.timeout));
            }
        };

        debug!(
            "git {} exited {:?} in {:.0}ms ({} bytes)",
            args.first().copied().unwrap_or(""),
            output.status.code(),
            start.elapsed().as_secs_f64() * 1000.0,
            output.stdout.len()
        );

        if !output.status.success() {
            return Err(ToolError::Git {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        check_output_size(output.stdout.len(), MAX_STDOUT_BYTES)?;
        Ok(output.stdout)
    }

    /// Like [`run`](Self::run), decoding stdout lossily as UTF-8.
    pub async fn run_text(&self, args: &[&str]) -> Result<String, ToolError> {
        let bytes = self.run(args).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn check_output_size(len: usize, limit: usize) -> Result<(), ToolError> {
    if len > limit {
        return Err(ToolError::OutputTooLarge { bytes: len, limit });
    }
    Ok(())
}

/// Reject anything outside the read-only surface before spawning.
pub fn check_command(args: &[&str]) -> Result<(), ToolError> {
    let Some(verb) = args.first() else {
        return Err(ToolError::ForbiddenOperation {
            detail: "empty git command".into(),
        });
    };
    if !ALLOWED_VERBS.contains(verb) {
        return Err(ToolError::ForbiddenOperation {
            detail: format!("'{verb}' is not a read-only git command"),
        });
    }
    // Everything after `--` is a pathspec.
    for arg in args.iter().skip(1).take_while(|a| **a != "--") {
        let forbidden = FORBIDDEN_FLAGS
            .iter()
            .any(|f| *arg == *f || arg.strip_prefix(f).is_some_and(|rest| rest.starts_with('=')));
        if forbidden {
            return Err(ToolError::ForbiddenOperation {
                detail: format!("flag '{arg}' is not allowed"),
            });
        }
    }
    Ok(())
}

/// Validate a user-supplied revision before it is placed on a git command line.
///
/// Accepts branch and tag names, commit ids, and `~`/`^`/`@{n}` suffixes.
/// Ranges are rejected: callers pass the two ends separately.
pub fn validate_revision(rev: &str) -> Result<(), ToolError> {
    if rev.is_empty() {
        return Err(ToolError::invalid("revision must not be empty"));
    }
    if rev.len() > 256 {
        return Err(ToolError::invalid("revision is too long"));
    }
    if rev.starts_with('-') {
        return Err(ToolError::invalid(format!(
            "revision '{rev}' must not start with '-'"
        )));
    }
    if rev.contains("..") {
        return Err(ToolError::invalid(format!(
            "revision '{rev}' looks like a range; pass both ends separately"
        )));
    }
    let ok = rev.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-' | '~' | '^' | '@' | '{' | '}')
    });
    if !ok {
        return Err(ToolError::invalid(format!(
            "revision '{rev}' contains unsupported characters"
        )));
    }
    Ok(())
}
