//! Front-end configuration with defaults.
//!
//! [`CliConfig`] holds what the command line can set and converts it into
//! the library's [`SessionConfig`] via
//! [`into_session_config`](CliConfig::into_session_config).

use std::path::PathBuf;
use std::time::Duration;

use gitscope::DEFAULT_MODEL;
use gitscope::agent::{DEFAULT_MAX_TOOL_ITERATIONS, SessionConfig};
use gitscope::context::DEFAULT_MAX_CONTEXT_TOKENS;
use gitscope::search::DEFAULT_MAX_HITS;

#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Any path inside the repository. Default: `"."`.
    pub repo: PathBuf,
    /// Model identifier.
    pub model: String,
    /// Per-turn budget for tool output, in tokens. Default: `8000`.
    pub max_context_tokens: usize,
    /// Tool rounds per question. Default: `5`.
    pub max_tool_iterations: u32,
    /// Cap on search hits per call. Default: `20`.
    pub max_search_hits: usize,
    /// Per-tool-call timeout in seconds. Default: `30`.
    pub tool_timeout_secs: u64,
    /// Sampling temperature. Default: `0.0`.
    pub temperature: f32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("."),
            model: DEFAULT_MODEL.to_string(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_search_hits: DEFAULT_MAX_HITS,
            tool_timeout_secs: 30,
            temperature: 0.0,
        }
    }
}

impl CliConfig {
    /// Build the library session config, using `credential` as the API key.
    pub fn into_session_config(self, credential: impl Into<String>) -> SessionConfig {
        SessionConfig::new(credential, self.repo)
            .with_model(self.model)
            .with_max_context_tokens(self.max_context_tokens)
            .with_max_tool_iterations(self.max_tool_iterations)
            .with_max_search_hits(self.max_search_hits)
            .with_tool_timeout(Duration::from_secs(self.tool_timeout_secs))
            .with_temperature(self.temperature)
    }
}
