//! Structured reflection on tool failures.
//!
//! A failed call is shown to the model as the error, the likely causes, and
//! what to try next, so it can correct itself within the same turn.

use super::names;
use crate::error::ToolError;

/// Format a tool failure for the model.
pub fn format_tool_failure(tool_name: &str, arguments: &str, error: &ToolError) -> String {
    let mut msg = format!("Error from tool '{tool_name}': {error}\n");

    let suggestions = suggestions(tool_name, error);
    if !suggestions.is_empty() {
        msg.push_str("Possible causes and recovery:\n");
        for suggestion in &suggestions {
            msg.push_str(&format!("  - {suggestion}\n"));
        }
    }

    let args_preview: String = arguments.chars().take(200).collect();
    msg.push_str(&format!("Arguments used: {args_preview}"));
    if arguments.chars().count() > 200 {
        msg.push_str("...");
    }

    msg
}

fn suggestions(tool_name: &str, error: &ToolError) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    match error {
        ToolError::PathEscape { .. } => {
            out.push(
                "Only paths inside the repository can be read. Use a path relative to the \
                 repository root, without '..' or a leading '/'."
                    .into(),
            );
            out.push(format!(
                "Use {} to see which files exist.",
                names::LIST_FILES
            ));
        }
        ToolError::NotFound { .. } => {
            out.push(format!(
                "Check the spelling. Use {} or {} with kind \"path\" to find the right path.",
                names::LIST_FILES,
                names::SEARCH_CODE
            ));
            if matches!(tool_name, names::READ_FILE | names::FILE_OUTLINE) {
                out.push(format!(
                    "The file may have been renamed or deleted; {} shows recent changes.",
                    names::GIT_LOG
                ));
            }
            if matches!(
                tool_name,
                names::GIT_DIFF | names::GIT_SHOW | names::READ_FILE | names::FILE_OUTLINE
            ) {
                out.push(format!(
                    "Revisions must be branch names, tags or commit ids; {} lists branches.",
                    names::GIT_BRANCHES
                ));
            }
        }
        ToolError::BinaryContent { .. } => {
            out.push("Binary files cannot be shown. Look for a text file that describes it.".into());
        }
        ToolError::ForbiddenOperation { .. } => {
            out.push("Only read-only repository operations are available.".into());
        }
        ToolError::InvalidArgument(_) => {
            out.push("Fix the arguments to match the tool's parameter schema and try again.".into());
            match tool_name {
                names::READ_FILE => out.push(
                    "Line numbers are 1-based and start_line must not exceed end_line.".into(),
                ),
                names::FIND_SYMBOL => out.push(format!(
                    "Pass one bare identifier such as `parse_config`; use {} for phrases.",
                    names::SEARCH_CODE
                )),
                names::GIT_DIFF => out.push(
                    "`target` applies to the working tree only: leave ref_b out when setting it, \
                     and do not combine target \"unstaged\" with ref_a."
                        .into(),
                ),
                _ => {}
            }
        }
        ToolError::UnknownTool(_) => {
            out.push(format!("Available tools: {}.", names::ALL.join(", ")));
        }
        ToolError::Timeout(_) => {
            out.push(
                "The operation took too long. Narrow it down: a more specific query, a \
                 path filter, or a smaller limit."
                    .into(),
            );
        }
        ToolError::OutputTooLarge { .. } => {
            out.push(
                "The result was too large to return. Ask for less: a path filter, a line \
                 range, a smaller limit, or two nearer revisions."
                    .into(),
            );
        }
        ToolError::Git { .. } | ToolError::Malformed(_) | ToolError::Io(_) => {
            out.push("This may be transient. Retry once, then try a different approach.".into());
        }
    }
    out
}
