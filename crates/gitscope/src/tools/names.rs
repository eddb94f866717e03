//! Canonical tool name constants.
//!
//! All tool-name string literals should reference these constants to avoid
//! scattered magic strings. When a tool is renamed, only this file needs
//! to change.

pub const SEARCH_CODE: &str = "search_code";
pub const READ_FILE: &str = "read_file";
pub const GIT_LOG: &str = "git_log";
pub const GIT_DIFF: &str = "git_diff";
pub const GIT_STATUS: &str = "git_status";
pub const LIST_FILES: &str = "list_files";
pub const GIT_SHOW: &str = "git_show";
pub const GIT_BRANCHES: &str = "git_branches";
pub const PROJECT_TREE: &str = "project_tree";
pub const FILE_OUTLINE: &str = "file_outline";
pub const FIND_SYMBOL: &str = "find_symbol";

/// Every tool the read-only set registers, sorted.
pub const ALL: &[&str] = &[
    FILE_OUTLINE,
    FIND_SYMBOL,
    GIT_BRANCHES,
    GIT_DIFF,
    GIT_LOG,
    GIT_SHOW,
    GIT_STATUS,
    LIST_FILES,
    PROJECT_TREE,
    READ_FILE,
    SEARCH_CODE,
];
