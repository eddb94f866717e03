//! Parsers for the machine-readable git output formats the accessor requests.

use chrono::DateTime;

use super::{BranchInfo, ChangeKind, CommitSummary, DiffEntry, DiffOrigin};
use crate::error::ToolError;

/// Field separator used by [`LOG_FORMAT`]. git refuses NUL in commit
/// messages and paths cannot contain it, so no field can.
pub const LOG_SEP: char = '\0';
/// Field separator used by [`BRANCH_FORMAT`]. Ref names cannot contain
/// control characters.
pub const FIELD_SEP: char = '\x1f';

/// `git log --format` producing `NUL id NUL author NUL date NUL body NUL`,
/// with `--name-only` output filling the fifth field up to the next record.
pub const LOG_FORMAT: &str = "--format=%x00%H%x00%an%x00%aI%x00%B%x00";
const LOG_FIELDS: usize = 5;

/// `git for-each-ref --format` producing `name US id US head-marker`.
pub const BRANCH_FORMAT: &str = "--format=%(refname:short)%1f%(objectname)%1f%(HEAD)";

// ── status ─────────────────────────────────────────────────────────

/// Split `git status --porcelain=v1 --branch -z` output into the branch
/// header (`## ...`, without the marker) and the entry fields.
pub fn split_branch_header(raw: &str) -> (Option<&str>, &str) {
    match raw.strip_prefix("## ") {
        Some(rest) => match rest.split_once('\0') {
            Some((header, entries)) => (Some(header), entries),
            None => (Some(rest), ""),
        },
        None => (None, raw),
    }
}

/// Branch named by a porcelain v1 header; `None` for a detached HEAD.
///
/// Handles `main`, `main...origin/main [ahead 1]`, `No commits yet on main`
/// (and the older `Initial commit on main`) and `HEAD (no branch)`.
pub fn parse_branch_header(header: &str) -> Option<String> {
    let header = header.trim();
    for unborn in ["No commits yet on ", "Initial commit on "] {
        if let Some(name) = header.strip_prefix(unborn) {
            return Some(name.trim().to_string()).filter(|n| !n.is_empty());
        }
    }
    if header.starts_with("HEAD (no branch)") {
        return None;
    }
    let end = header
        .find("...")
        .or_else(|| header.find(' '))
        .unwrap_or(header.len());
    let (name, _) = header.split_at(end);
    Some(name.to_string()).filter(|n| !n.is_empty())
}

/// Parse the entry part of `git status --porcelain=v1 -z` output.
pub fn parse_porcelain(raw: &str) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());

    while let Some(field) = fields.next() {
        let mut chars = field.chars();
        let (Some(x), Some(y)) = (chars.next(), chars.next()) else {
            continue;
        };
        if x == '#' {
            continue;
        }
        let path: String = field.chars().skip(3).collect();
        if path.is_empty() {
            continue;
        }

        let kind = if x == 'R' || x == 'C' {
            // The source path follows as its own NUL-terminated field.
            let from = fields.next().unwrap_or_default().to_string();
            if x == 'R' {
                ChangeKind::Renamed { from }
            } else {
                ChangeKind::Added
            }
        } else if x == '?' || x == 'A' || y == 'A' {
            ChangeKind::Added
        } else if x == 'D' || y == 'D' {
            ChangeKind::Deleted
        } else {
            ChangeKind::Modified
        };

        entries.push(DiffEntry {
            path,
            kind,
            hunk: String::new(),
            origin: DiffOrigin::WorkingTree { base: None },
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

// ── diff ───────────────────────────────────────────────────────────

/// Parse unified diff output (`diff-index -p`, `diff-files -p`,
/// `diff-tree -p`) into one entry per file.
///
/// Sections with nothing but a header are dropped: plumbing reports files
/// whose stat data is stale but whose content is unchanged that way.
pub fn parse_diff(raw: &str, origin: &DiffOrigin) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.starts_with("diff --git ") && !current.is_empty() {
            if let Some(entry) = parse_file_section(&current, origin) {
                entries.push(entry);
            }
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty()
        && let Some(entry) = parse_file_section(&current, origin)
    {
        entries.push(entry);
    }
    entries
}

fn parse_file_section(lines: &[&str], origin: &DiffOrigin) -> Option<DiffEntry> {
    let first = lines.first()?;
    let header_path = first.strip_prefix("diff --git ").and_then(split_git_header);

    let mut kind = ChangeKind::Modified;
    let mut old_path: Option<String> = None;
    let mut new_path: Option<String> = None;
    let mut rename_from: Option<String> = None;
    let mut rename_to: Option<String> = None;
    let mut mode_change = false;
    let mut hunk_start = lines.len();

    for (i, line) in lines.iter().enumerate().skip(1) {
        if line.starts_with("@@") || line.starts_with("Binary files") {
            hunk_start = i;
            break;
        }
        if line.starts_with("new file mode") {
            kind = ChangeKind::Added;
        } else if line.starts_with("deleted file mode") {
            kind = ChangeKind::Deleted;
        } else if line.starts_with("old mode ") || line.starts_with("new mode ") {
            mode_change = true;
        } else if let Some(p) = line.strip_prefix("rename from ") {
            rename_from = Some(p.to_string());
        } else if let Some(p) = line.strip_prefix("rename to ") {
            rename_to = Some(p.to_string());
        } else if let Some(p) = line.strip_prefix("--- ") {
            old_path = strip_side(p, "a/");
        } else if let Some(p) = line.strip_prefix("+++ ") {
            new_path = strip_side(p, "b/");
        }
    }

    if let Some(from) = rename_from {
        kind = ChangeKind::Renamed { from };
    }

    let path = rename_to
        .or(new_path)
        .or(old_path)
        .or(header_path)?;

    let hunk = lines.get(hunk_start..).unwrap_or_default().join("\n");
    if hunk.is_empty() && kind == ChangeKind::Modified && !mode_change {
        return None;
    }

    Some(DiffEntry {
        path,
        kind,
        hunk,
        origin: origin.clone(),
    })
}

/// `--- a/path` / `+++ b/path`; `/dev/null` yields `None`.
fn strip_side(raw: &str, prefix: &str) -> Option<String> {
    let raw = raw.trim_end_matches('\t');
    if raw == "/dev/null" {
        return None;
    }
    Some(raw.strip_prefix(prefix).unwrap_or(raw).to_string())
}

/// Recover the path from `a/<path> b/<path>`.
fn split_git_header(rest: &str) -> Option<String> {
    let idx = rest.rfind(" b/")?;
    let (_, b_side) = rest.split_at(idx);
    Some(b_side.trim_start_matches(" b/").to_string())
}

// ── log ────────────────────────────────────────────────────────────

/// Parse `git log` output produced with [`LOG_FORMAT`] and `--name-only`.
pub fn parse_log(raw: &str) -> Result<Vec<CommitSummary>, ToolError> {
    let mut fields = raw.split(LOG_SEP);
    if fields.next().is_some_and(|lead| !lead.trim().is_empty()) {
        return Err(ToolError::Malformed("log output does not start with a record".into()));
    }
    let fields: Vec<&str> = fields.collect();
    if fields.len() % LOG_FIELDS != 0 {
        return Err(ToolError::Malformed(format!(
            "log output has {} fields, not a multiple of {LOG_FIELDS}",
            fields.len()
        )));
    }

    let mut commits = Vec::with_capacity(fields.len() / LOG_FIELDS);
    for record in fields.chunks_exact(LOG_FIELDS) {
        let [id, author, date, message, names] = record else {
            continue;
        };
        let timestamp = DateTime::parse_from_rfc3339(date.trim())
            .map_err(|e| ToolError::Malformed(format!("commit date '{date}': {e}")))?;
        let changed_paths = names
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        commits.push(CommitSummary {
            id: id.trim().to_string(),
            author: author.to_string(),
            timestamp,
            message: message.trim_end().to_string(),
            changed_paths,
        });
    }
    Ok(commits)
}

// ── branches ───────────────────────────────────────────────────────

/// Parse `git for-each-ref` output produced with [`BRANCH_FORMAT`].
pub fn parse_branches(raw: &str) -> Vec<BranchInfo> {
    let mut branches: Vec<BranchInfo> = raw
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(FIELD_SEP);
            let name = parts.next()?.trim();
            let tip = parts.next()?.trim();
            let head = parts.next().unwrap_or("").trim();
            if name.is_empty() {
                return None;
            }
            Some(BranchInfo {
                name: name.to_string(),
                tip: tip.to_string(),
                current: head == "*",
            })
        })
        .collect();
    branches.sort_by(|a, b| a.name.cmp(&b.name));
    branches
}
