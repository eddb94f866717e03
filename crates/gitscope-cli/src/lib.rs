//! Terminal front-end for `gitscope`.
//!
//! The `gitscope` binary opens a session on a local repository and answers
//! questions about it, either once (`--prompt`) or in an interactive loop.
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! ```sh
//! # One-shot mode
//! gitscope --repo /path/to/project --prompt "Where is API_BASE defined?"
//!
//! # Interactive mode
//! gitscope --repo /path/to/project
//! ```

pub mod config;

pub use config::CliConfig;

/// Environment variable holding the API key.
pub const CREDENTIAL_ENV: &str = "OPENROUTER_KEY";

/// One line typed at the interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplInput<'a> {
    Exit,
    Empty,
    Question(&'a str),
}

impl<'a> ReplInput<'a> {
    pub fn classify(line: &'a str) -> Self {
        let line = line.trim();
        match line {
            "" => ReplInput::Empty,
            "exit" | "quit" | ":q" => ReplInput::Exit,
            question => ReplInput::Question(question),
        }
    }
}
