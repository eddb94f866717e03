//! Session start-up: configuration and the shared components of a conversation.
//!
//! A [`Session`] owns the [`RepoAccessor`], the [`SearchEngine`] and the
//! read-only [`ToolSet`] built from [`SessionConfig`]. It is created once and
//! borrowed by every [`Conversation`](super::Conversation) over it; there is
//! no global state.
//!
//! ```ignore
//! let config = SessionConfig::new(api_key, "/path/to/repo")
//!     .with_max_context_tokens(4_000)
//!     .with_max_tool_iterations(3);
//! let session = Session::open(config).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::DEFAULT_MODEL;
use crate::api::RetryConfig;
use crate::context::DEFAULT_MAX_CONTEXT_TOKENS;
use crate::error::SessionError;
use crate::repo::RepoAccessor;
use crate::repo::git::DEFAULT_GIT_TIMEOUT;
use crate::search::{
    DEFAULT_COMMIT_SCAN_LIMIT, DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_HITS, SearchConfig,
    SearchEngine,
};
use crate::tools::{DEFAULT_MAX_LOG_ENTRIES, DEFAULT_TOOL_TIMEOUT, ToolLimits, ToolSet};

/// Default cap on tool rounds per turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 5;
/// Default cap on tokens per model response.
pub const DEFAULT_MAX_RESPONSE_TOKENS: u32 = 4096;

/// Everything a session needs to start.
#[derive(Clone, PartialEq)]
pub struct SessionConfig {
    /// API key for the model provider; `OpenRouterClient::for_session` sends it.
    pub credential: String,
    /// Any path inside the repository's work tree.
    pub repo_path: PathBuf,
    /// Per-turn budget for tool output, in tokens.
    pub max_context_tokens: usize,
    /// Tool rounds allowed per turn before the answer is forced.
    pub max_tool_iterations: u32,
    /// Upper bound for `search_code`'s `limit`.
    pub max_search_hits: usize,
    /// Upper bound for `git_log`'s `limit`.
    pub max_log_entries: usize,
    pub tool_timeout: Duration,
    pub git_timeout: Duration,
    /// Content search skips files larger than this.
    pub max_search_file_bytes: u64,
    /// Commits scanned by commit-message search.
    pub commit_scan_limit: usize,
    pub model: String,
    /// Maximum tokens per model response (0 = provider default).
    pub max_response_tokens: u32,
    pub temperature: f32,
    /// Retry policy for transient model errors.
    pub retry: RetryConfig,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("credential", &"<redacted>")
            .field("repo_path", &self.repo_path)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .field("max_search_hits", &self.max_search_hits)
            .field("max_log_entries", &self.max_log_entries)
            .field("tool_timeout", &self.tool_timeout)
            .field("git_timeout", &self.git_timeout)
            .field("max_search_file_bytes", &self.max_search_file_bytes)
            .field("commit_scan_limit", &self.commit_scan_limit)
            .field("model", &self.model)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("temperature", &self.temperature)
            .field("retry", &self.retry)
            .finish()
    }
}

impl SessionConfig {
    /// Config with defaults for everything but the credential and repository.
    pub fn new(credential: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            credential: credential.into(),
            repo_path: repo_path.into(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_search_hits: DEFAULT_MAX_HITS,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            git_timeout: DEFAULT_GIT_TIMEOUT,
            max_search_file_bytes: DEFAULT_MAX_FILE_BYTES,
            commit_scan_limit: DEFAULT_COMMIT_SCAN_LIMIT,
            model: DEFAULT_MODEL.to_string(),
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            temperature: 0.0,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_max_tool_iterations(mut self, iterations: u32) -> Self {
        self.max_tool_iterations = iterations;
        self
    }

    pub fn with_max_search_hits(mut self, hits: usize) -> Self {
        self.max_search_hits = hits;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Retry transient model failures (429, 5xx, network) up to `max_retries` times.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }

    fn tool_limits(&self) -> ToolLimits {
        ToolLimits {
            max_search_hits: self.max_search_hits,
            max_log_entries: self.max_log_entries,
            timeout: self.tool_timeout,
        }
    }

    fn search_config(&self) -> SearchConfig {
        SearchConfig {
            max_hits: self.max_search_hits,
            max_file_bytes: self.max_search_file_bytes,
            commit_scan_limit: self.commit_scan_limit,
        }
    }
}

/// The shared, read-only machinery of one or more conversations.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    repo: Arc<RepoAccessor>,
    search: Arc<SearchEngine>,
    tools: ToolSet,
}

impl Session {
    /// Validate the config, open the repository and register the tools.
    pub async fn open(config: SessionConfig) -> Result<Self, SessionError> {
        if config.credential.trim().is_empty() {
            return Err(SessionError::MissingCredential);
        }

        let repo = Arc::new(RepoAccessor::open(&config.repo_path, config.git_timeout).await?);
        let search = Arc::new(SearchEngine::new(repo.clone(), config.search_config()));
        let tools = ToolSet::read_only(repo.clone(), search.clone(), config.tool_limits());

        info!(
            "Session opened: repo={}, model={}, budget={} tokens, max_tool_iterations={}",
            repo.root().display(),
            config.model,
            config.max_context_tokens,
            config.max_tool_iterations,
        );

        Ok(Self {
            config,
            repo,
            search,
            tools,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn accessor(&self) -> &Arc<RepoAccessor> {
        &self.repo
    }

    pub fn search(&self) -> &Arc<SearchEngine> {
        &self.search
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }
}
