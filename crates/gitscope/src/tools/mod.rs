//! The tool mediator: everything the model can ask the repository for.
//!
//! Every capability is a [`Tool`] implementor in [`repo`]. The set is
//! closed: [`Tool`] is sealed and [`ToolSet::read_only`] is the only
//! constructor, so there is no way to hand the model a tool that writes.
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`] trait, [`ToolSet`], [`ToolResult`], argument validation.
//! - [`repo`]: `search_code`, `find_symbol`, `read_file`, `file_outline`,
//!   `project_tree`, `git_log`, `git_diff`, `git_status`, `list_files`,
//!   `git_show`, `git_branches`.
//! - [`spec`]: [`ToolDoc`](spec::ToolDoc), the description each tool sends,
//!   with redirects between overlapping tools.
//! - [`reflection`]: recovery hints attached to failed calls.
//! - [`names`]: tool name constants.

pub mod core;
pub mod names;
pub mod reflection;
pub mod repo;
pub mod spec;

mod sealed {
    pub trait Sealed {}
}

pub use core::{
    DEFAULT_MAX_LOG_ENTRIES, DEFAULT_TOOL_TIMEOUT, Tool, ToolFuture, ToolLimits, ToolOutcome,
    ToolPayload, ToolResult, ToolSet, parse_tool_args, validate_tool_arguments,
};
