//! System prompt assembly.
//!
//! [`SystemPromptBuilder`] joins a preamble and `##` sections with blank
//! lines; [`grounding_system_prompt`] is the prompt every conversation
//! starts from.

use crate::tools::names;

/// Builder for multi-section system prompts.
///
/// Sections are joined with double newlines. Empty sections are skipped.
///
/// ```
/// use gitscope::agent::prompt::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("You answer questions about a repository.")
///     .section("Rules", "Cite paths.")
///     .section_opt("Branch", None::<String>)
///     .build();
///
/// assert!(prompt.contains("## Rules"));
/// assert!(!prompt.contains("## Branch"));
/// ```
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    sections: Vec<String>,
}

impl SystemPromptBuilder {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.sections.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// Append a section only when `content` is `Some`.
    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.sections
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The system prompt that keeps the model grounded in tool output.
///
/// `head` is the short id of the current commit, if any.
pub fn grounding_system_prompt(head: Option<&str>, max_tool_iterations: u32) -> String {
    let rules = format!(
        "- Only state facts about the repository that appear in tool results in this \
         conversation. Never invent file paths, line numbers, commit ids or code.\n\
         - Cite sources with the provenance shown in tool results, for example \
         `src/lib.rs:10-20` or `commit abc1234`.\n\
         - If a tool fails, read its recovery hints and try a corrected call.\n\
         - If the tools cannot answer the question, say so.\n\
         - You have at most {max_tool_iterations} rounds of tool calls per question; \
         request independent calls together in one round."
    );
    let tools = format!(
        "- `{}` shows the directory layout; start there in an unfamiliar repository.\n\
         - `{}` finds lines, paths or commit messages matching a query; `{}` finds \
         where a named function, class or constant is declared.\n\
         - `{}` lists a file's declarations; `{}` reads a file, optionally a line range \
         or at a revision.\n\
         - `{}`, `{}` and `{}` show the branch and uncommitted changes, differences \
         between revisions, and history.\n\
         - `{}`, `{}` and `{}` list files, show one commit, and list branches.",
        names::PROJECT_TREE,
        names::SEARCH_CODE,
        names::FIND_SYMBOL,
        names::FILE_OUTLINE,
        names::READ_FILE,
        names::GIT_STATUS,
        names::GIT_DIFF,
        names::GIT_LOG,
        names::LIST_FILES,
        names::GIT_SHOW,
        names::GIT_BRANCHES,
    );

    SystemPromptBuilder::new(
        "You answer questions about a local Git repository. You can only see it \
         through read-only tools; nothing you do can change it.",
    )
    .section("Rules", rules)
    .section("Tools", tools)
    .section_opt("Repository", head.map(|h| format!("HEAD is at {h}.")))
    .build()
}
