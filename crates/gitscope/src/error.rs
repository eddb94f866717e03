//! Error taxonomy.
//!
//! | Type | Raised by | Reaches the user? |
//! |------|-----------|-------------------|
//! | [`ToolError`] | repository accessor, search engine, tool mediator | No. Converted into a failed [`ToolResult`](crate::tools::ToolResult) and shown to the model |
//! | [`TurnError`] | conversation orchestrator | Yes |
//! | [`ModelError`] | model transport | Yes, wrapped in [`TurnError::Model`] |
//! | [`SessionError`] | session start-up | Yes |
//!
//! Running out of context budget is not an error: it is reported through
//! [`ContextPayload::truncated`](crate::context::ContextPayload::truncated).

use std::time::Duration;

/// Failure of a single repository or tool operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The path is absolute, contains `..`, or resolves outside the repository root.
    #[error("path '{path}' escapes the repository root")]
    PathEscape { path: String },

    /// The path or revision does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The file is not UTF-8 text.
    #[error("'{path}' is binary, not text")]
    BinaryContent { path: String },

    /// A git verb or flag outside the read-only allow-list was requested.
    #[error("forbidden git operation: {detail}")]
    ForbiddenOperation { detail: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("timed out after {:.0}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// git exited non-zero for a reason not covered above.
    #[error("git exited with status {code}: {stderr}")]
    Git { code: i32, stderr: String },

    /// git produced more output than the accessor will hold in memory.
    #[error("git produced {bytes} bytes of output, more than the {limit} byte limit")]
    OutputTooLarge { bytes: usize, limit: usize },

    /// git produced output we could not interpret.
    #[error("unexpected git output: {0}")]
    Malformed(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ToolError {
    /// Short stable label used in tool result headers.
    pub fn label(&self) -> &'static str {
        match self {
            ToolError::PathEscape { .. } => "path_escape",
            ToolError::NotFound { .. } => "not_found",
            ToolError::BinaryContent { .. } => "binary_content",
            ToolError::ForbiddenOperation { .. } => "forbidden_operation",
            ToolError::InvalidArgument(_) => "invalid_argument",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Timeout(_) => "timeout",
            ToolError::Git { .. } => "git",
            ToolError::OutputTooLarge { .. } => "output_too_large",
            ToolError::Malformed(_) => "malformed_output",
            ToolError::Io(_) => "io",
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        ToolError::NotFound { what: what.into() }
    }

    pub(crate) fn path_escape(path: impl Into<String>) -> Self {
        ToolError::PathEscape { path: path.into() }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ToolError::InvalidArgument(msg.into())
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Io(e.to_string())
    }
}

/// Failure of the model transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to parse response: {0}")]
    Decode(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Failure of a whole conversation turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The model returned something the orchestrator cannot act on.
    #[error("model protocol violation: {0}")]
    ModelProtocol(String),

    #[error("model request failed: {0}")]
    Model(#[from] ModelError),

    #[error("turn cancelled")]
    Cancelled,
}

/// Failure to start a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("'{path}' is not inside a git work tree")]
    NotARepository { path: String },

    #[error("no API credential configured")]
    MissingCredential,

    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_distinct() {
        let errors = [
            ToolError::path_escape("../x"),
            ToolError::not_found("file 'x'"),
            ToolError::BinaryContent { path: "x".into() },
            ToolError::ForbiddenOperation {
                detail: "push".into(),
            },
            ToolError::invalid("bad"),
            ToolError::UnknownTool("rm".into()),
            ToolError::Timeout(Duration::from_secs(1)),
            ToolError::Git {
                code: 1,
                stderr: String::new(),
            },
            ToolError::OutputTooLarge { bytes: 2, limit: 1 },
            ToolError::Malformed("x".into()),
            ToolError::Io("x".into()),
        ];
        let mut labels: Vec<_> = errors.iter().map(|e| e.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), errors.len());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ToolError::path_escape("/etc/passwd").to_string(),
            "path '/etc/passwd' escapes the repository root"
        );
        assert_eq!(
            ToolError::Timeout(Duration::from_secs(30)).to_string(),
            "timed out after 30s"
        );
        let turn: TurnError = ModelError::Http {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert_eq!(
            turn.to_string(),
            "model request failed: HTTP 502: bad gateway"
        );
    }
}
