//! Turn tool results into budget-bounded text for the model.
//!
//! Every payload item becomes a [`ContextUnit`]: a provenance line saying
//! where the text came from, plus a body. Units are admitted in result
//! order and item order until the first one that does not fit what is left
//! of the budget; that unit and every unit after it are dropped, so a
//! smaller lower-ranked item never displaces a better one. A unit larger
//! than the whole budget is shortened around its focus line instead, as
//! long as its provenance still fits. Section headers and omission notices
//! are still emitted after admission stops, budget permitting.
//!
//! Every byte emitted is charged to the [`ContextBudget`], so
//! `payload.serialized_len()` always equals what the budget recorded.

use tracing::debug;

use super::budget::ContextBudget;
use crate::repo::tree::{ProjectTree, TreeEntryKind};
use crate::repo::{CommitDetail, CommitSummary, DiffEntry, FileSlice, StatusReport, short_id};
use crate::search::symbols::FileOutline;
use crate::search::{HitTarget, MatchKind, SearchHit};
use crate::tools::{ToolOutcome, ToolPayload, ToolResult};

/// Marker placed where text was cut.
pub const TRUNCATION_MARKER: &str = "[... truncated]";

/// One piece of evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUnit {
    /// Where the body came from: `src/a.py:12`, `commit abc1234`, ...
    pub provenance: String,
    pub body: String,
    /// Line of `body` (0-based) to keep when shortening.
    pub focus: Option<usize>,
}

impl ContextUnit {
    pub fn new(provenance: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            provenance: provenance.into(),
            body: body.into(),
            focus: None,
        }
    }

    /// A unit with no body, rendered as a single line.
    pub fn line(provenance: impl Into<String>) -> Self {
        Self::new(provenance, "")
    }

    pub fn with_focus(mut self, focus: usize) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn render(&self) -> String {
        if self.body.is_empty() {
            format!("{}\n", self.provenance)
        } else {
            format!("[{}]\n{}\n", self.provenance, self.body)
        }
    }

    pub fn rendered_len(&self) -> usize {
        if self.body.is_empty() {
            self.provenance.len() + 1
        } else {
            self.provenance.len() + self.body.len() + 4
        }
    }
}

/// Everything emitted for one tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSection {
    pub call_id: String,
    pub tool_name: String,
    /// `None` when not even the header fit.
    pub header: Option<String>,
    pub units: Vec<ContextUnit>,
    /// Omission notice, present when units were dropped and the notice fit.
    pub notice: Option<String>,
}

impl ContextSection {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.rendered_len());
        if let Some(header) = &self.header {
            out.push_str(header);
        }
        for unit in &self.units {
            out.push_str(&unit.render());
        }
        if let Some(notice) = &self.notice {
            out.push_str(notice);
        }
        out
    }

    pub fn rendered_len(&self) -> usize {
        self.header.as_ref().map_or(0, String::len)
            + self.units.iter().map(ContextUnit::rendered_len).sum::<usize>()
            + self.notice.as_ref().map_or(0, String::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rendered_len() == 0
    }
}

/// Result of one [`assemble`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPayload {
    /// One per input result, same order.
    pub sections: Vec<ContextSection>,
    /// Whether anything was dropped or shortened for lack of budget.
    pub truncated: bool,
    pub dropped_units: usize,
}

impl ContextPayload {
    pub fn serialized_len(&self) -> usize {
        self.sections.iter().map(ContextSection::rendered_len).sum()
    }

    pub fn section(&self, call_id: &str) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.call_id == call_id)
    }
}

/// Assemble `results` into a payload, charging `budget` for every byte.
pub fn assemble(results: &[ToolResult], budget: &mut ContextBudget) -> ContextPayload {
    let mut payload = ContextPayload::default();
    let mut exhausted = false;

    for result in results {
        let units = units_for(result);
        let mut section = ContextSection {
            call_id: result.call_id.clone(),
            tool_name: result.tool_name.clone(),
            header: None,
            units: Vec::new(),
            notice: None,
        };

        let header = format!("## {} ({})\n", result.tool_name, result.call_id);
        if !budget.try_consume(header.len()) {
            payload.truncated = true;
            payload.dropped_units += units.len();
            payload.sections.push(section);
            continue;
        }
        section.header = Some(header);

        let mut dropped = 0usize;
        for unit in units {
            if exhausted {
                dropped += 1;
                continue;
            }
            let len = unit.rendered_len();
            if budget.try_consume(len) {
                section.units.push(unit);
                continue;
            }
            payload.truncated = true;
            if len > budget.max_chars()
                && let Some(short) = shorten(&unit, budget.remaining())
            {
                let short_len = short.rendered_len();
                if budget.try_consume(short_len) {
                    section.units.push(short);
                    continue;
                }
            }
            exhausted = true;
            dropped += 1;
        }

        if dropped > 0 {
            payload.dropped_units += dropped;
            let notice = format!("[{dropped} more item(s) omitted: context budget exhausted]\n");
            if budget.try_consume(notice.len()) {
                section.notice = Some(notice);
            }
        }
        payload.sections.push(section);
    }

    if payload.truncated {
        debug!(
            "Context truncated: {} unit(s) dropped, {}",
            payload.dropped_units,
            budget.usage().to_log_string()
        );
    }
    payload
}

/// Shorten `unit` to at most `avail` rendered bytes, keeping its
/// provenance and a window of lines around its focus.
fn shorten(unit: &ContextUnit, avail: usize) -> Option<ContextUnit> {
    // `[prov]\n` + body + `\n`
    let overhead = unit.provenance.len() + 4;
    let marker = TRUNCATION_MARKER.len();
    if overhead + marker + 1 > avail {
        return None;
    }
    let room = avail - overhead;

    let lines: Vec<&str> = unit.body.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let focus = unit.focus.unwrap_or(0).min(lines.len() - 1);

    // Window [lo, hi) with markers on the cut sides, one `\n` between parts.
    let window_len = |lo: usize, hi: usize, sum: usize| -> usize {
        let markers = usize::from(lo > 0) + usize::from(hi < lines.len());
        let parts = (hi - lo) + markers;
        sum + markers * marker + parts.saturating_sub(1)
    };

    let (mut lo, mut hi) = (focus, focus + 1);
    let mut sum = lines[focus].len();
    if window_len(lo, hi, sum) > room {
        // Not even the focus line fits: cut it by characters.
        let limit = room - marker - 1;
        let mut cut = String::new();
        for c in lines[focus].chars() {
            if cut.len() + c.len_utf8() > limit {
                break;
            }
            cut.push(c);
        }
        return Some(ContextUnit {
            provenance: unit.provenance.clone(),
            body: format!("{cut}\n{TRUNCATION_MARKER}"),
            focus: Some(0),
        });
    }

    loop {
        let mut grew = false;
        if hi < lines.len() && window_len(lo, hi + 1, sum + lines[hi].len()) <= room {
            sum += lines[hi].len();
            hi += 1;
            grew = true;
        }
        if lo > 0 && window_len(lo - 1, hi, sum + lines[lo - 1].len()) <= room {
            lo -= 1;
            sum += lines[lo].len();
            grew = true;
        }
        if !grew {
            break;
        }
    }

    let mut parts: Vec<&str> = Vec::with_capacity(hi - lo + 2);
    if lo > 0 {
        parts.push(TRUNCATION_MARKER);
    }
    parts.extend_from_slice(&lines[lo..hi]);
    if hi < lines.len() {
        parts.push(TRUNCATION_MARKER);
    }
    Some(ContextUnit {
        provenance: unit.provenance.clone(),
        body: parts.join("\n"),
        focus: Some(focus - lo + usize::from(lo > 0)),
    })
}

// ── Payload rendering ──────────────────────────────────────────────

fn units_for(result: &ToolResult) -> Vec<ContextUnit> {
    match &result.outcome {
        ToolOutcome::Failure { error, reason } => {
            vec![ContextUnit::new(format!("error: {}", error.label()), reason.clone())]
        }
        ToolOutcome::Success(payload) => {
            let units = payload_units(payload);
            if units.is_empty() {
                vec![ContextUnit::line(empty_message(payload))]
            } else {
                units
            }
        }
    }
}

fn empty_message(payload: &ToolPayload) -> &'static str {
    match payload {
        ToolPayload::Diffs(_) => "No differences.",
        ToolPayload::Hits(_) => "No matches.",
        ToolPayload::Commits(_) => "No commits.",
        ToolPayload::Paths(_) => "No files matched.",
        ToolPayload::Branches(_) => "No branches.",
        ToolPayload::Tree(_) => "No files.",
        ToolPayload::File(_)
        | ToolPayload::Commit(_)
        | ToolPayload::Status(_)
        | ToolPayload::Outline(_) => "Nothing to show.",
    }
}

fn payload_units(payload: &ToolPayload) -> Vec<ContextUnit> {
    match payload {
        ToolPayload::Hits(hits) => hits.iter().map(hit_unit).collect(),
        ToolPayload::Status(report) => status_units(report),
        ToolPayload::Diffs(entries) => entries.iter().map(diff_unit).collect(),
        ToolPayload::Tree(tree) => tree_units(tree),
        ToolPayload::Outline(outline) => vec![outline_unit(outline)],
        ToolPayload::Commits(commits) => commits.iter().map(commit_unit).collect(),
        ToolPayload::File(slice) => vec![file_unit(slice)],
        ToolPayload::Paths(paths) => paths.iter().map(ContextUnit::line).collect(),
        ToolPayload::Branches(branches) => branches
            .iter()
            .map(|b| {
                let marker = if b.current { " (current)" } else { "" };
                ContextUnit::line(format!("branch {} {}{marker}", b.name, short_id(&b.tip)))
            })
            .collect(),
        ToolPayload::Commit(detail) => commit_detail_units(detail),
    }
}

fn hit_unit(hit: &SearchHit) -> ContextUnit {
    let provenance = match hit.kind {
        MatchKind::Definition(kind) => format!("{} {}", hit.target.provenance(), kind.label()),
        _ => format!("{} score={:.2}", hit.target.provenance(), hit.score),
    };
    let body = match &hit.target {
        HitTarget::File(_) => hit
            .lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        HitTarget::Commit { subject, .. } if hit.lines.is_empty() => subject.clone(),
        HitTarget::Commit { .. } => hit
            .lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    };
    ContextUnit::new(provenance, body)
}

fn status_units(report: &StatusReport) -> Vec<ContextUnit> {
    let location = match (&report.branch, &report.head) {
        (Some(branch), Some(_)) => format!("On branch {branch}"),
        (Some(branch), None) => format!("On branch {branch} (no commits yet)"),
        (None, Some(head)) => format!("HEAD detached at {}", short_id(head)),
        (None, None) => "HEAD detached".to_string(),
    };
    let mut units = vec![ContextUnit::line(location)];
    if report.entries.is_empty() {
        units.push(ContextUnit::line("No uncommitted changes."));
    }
    units.extend(
        report
            .entries
            .iter()
            .map(|e| ContextUnit::line(format!("{} ({})", e.path, e.kind.label()))),
    );
    units
}

fn tree_units(tree: &ProjectTree) -> Vec<ContextUnit> {
    if tree.entries.is_empty() {
        return Vec::new();
    }
    let root = if tree.root.is_empty() { "." } else { tree.root.as_str() };
    let mut units = vec![ContextUnit::line(format!(
        "tree {root} ({} files, depth {})",
        tree.total_files, tree.max_depth
    ))];
    units.extend(tree.entries.iter().map(|entry| {
        let indent = "  ".repeat(entry.depth as usize + 1);
        let line = match entry.kind {
            TreeEntryKind::File => format!("{indent}{}", entry.name()),
            TreeEntryKind::Dir {
                files,
                collapsed: true,
            } => format!("{indent}{}/ ({files} files)", entry.name()),
            TreeEntryKind::Dir { .. } => format!("{indent}{}/", entry.name()),
        };
        ContextUnit::line(line)
    }));
    units
}

fn outline_unit(outline: &FileOutline) -> ContextUnit {
    let provenance = if outline.fallback {
        format!(
            "{} first {} of {} lines (no outline for this file type)",
            outline.file.provenance(),
            outline.items.len(),
            outline.total_lines
        )
    } else {
        format!(
            "{} outline, {}, {} lines",
            outline.file.provenance(),
            outline.language.label(),
            outline.total_lines
        )
    };
    if outline.items.is_empty() {
        let body = if outline.fallback { "(empty)" } else { "(no declarations found)" };
        return ContextUnit::new(provenance, body);
    }
    let body = outline
        .items
        .iter()
        .map(|item| format!("{:>5}  {}", item.line, item.text))
        .collect::<Vec<_>>()
        .join("\n");
    ContextUnit::new(provenance, body)
}

fn diff_unit(entry: &DiffEntry) -> ContextUnit {
    let provenance = format!(
        "{} ({}, {})",
        entry.path,
        entry.kind.label(),
        entry.origin.describe()
    );
    ContextUnit::new(provenance, entry.hunk.clone())
}

fn commit_unit(commit: &CommitSummary) -> ContextUnit {
    let provenance = format!(
        "commit {} {} {}",
        short_id(&commit.id),
        commit.author,
        commit.timestamp.to_rfc3339()
    );
    let mut body = commit.message.clone();
    if !commit.changed_paths.is_empty() {
        body.push_str("\nchanged: ");
        body.push_str(&commit.changed_paths.join(", "));
    }
    ContextUnit::new(provenance, body)
}

fn commit_detail_units(detail: &CommitDetail) -> Vec<ContextUnit> {
    let mut units = vec![commit_unit(&detail.summary)];
    if let Some(diff) = &detail.diff {
        units.extend(diff.iter().map(diff_unit));
    }
    units
}

fn file_unit(slice: &FileSlice) -> ContextUnit {
    let start = slice.file.line_range.map_or(1, |(s, _)| s);
    let provenance = format!("{} of {} lines", slice.file.provenance(), slice.total_lines);
    if slice.text.is_empty() {
        return ContextUnit::new(provenance, "(empty)");
    }
    let body = slice
        .text
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>5}  {line}", start as usize + i))
        .collect::<Vec<_>>()
        .join("\n");
    let unit = ContextUnit::new(provenance, body);
    match slice.focus_line {
        Some(focus) if focus >= start => unit.with_focus((focus - start) as usize),
        _ => unit,
    }
}
