//! Ranked retrieval over file contents, paths and commit messages, plus
//! symbol definitions.
//!
//! [`SearchEngine::search`] scores every candidate with the functions in
//! [`score`], sorts by relevance (ties broken by target key, then line
//! number), and only then truncates to the requested limit.
//! [`SearchEngine::find_definitions`] uses the declaration rules in
//! [`symbols`]. No result is cached between calls: each search reads the
//! repository as it is now.

pub mod score;
pub mod symbols;

use std::cmp::Ordering;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ToolError;
use crate::repo::{FileRef, RepoAccessor, paths, short_id};
use score::Query;
use symbols::Language;

/// Default ceiling on the number of hits returned by one search.
pub const DEFAULT_MAX_HITS: usize = 20;
/// Files larger than this are skipped by content search.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 512 * 1024;
/// Commits scanned by commit-message search.
pub const DEFAULT_COMMIT_SCAN_LIMIT: usize = 500;
/// Matched line text is cut to this many characters.
const MAX_LINE_CHARS: usize = 240;

/// What to search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// File contents, line by line.
    #[default]
    Content,
    /// File paths, fuzzily.
    Path,
    /// Commit messages.
    Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Content,
    Path,
    CommitMessage,
    /// A line declaring the symbol, labelled with what it declares.
    Definition(symbols::SymbolKind),
}

/// What a hit points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HitTarget {
    File(FileRef),
    Commit { id: String, subject: String },
}

impl HitTarget {
    /// Tie-break key: the path, or the commit id.
    pub fn key(&self) -> &str {
        match self {
            HitTarget::File(file) => &file.path,
            HitTarget::Commit { id, .. } => id,
        }
    }

    pub fn provenance(&self) -> String {
        match self {
            HitTarget::File(file) => file.provenance(),
            HitTarget::Commit { id, .. } => format!("commit {}", short_id(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedLine {
    /// 1-based.
    pub line: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub target: HitTarget,
    pub lines: Vec<MatchedLine>,
    /// Higher is more relevant.
    pub score: f64,
    pub kind: MatchKind,
}

impl SearchHit {
    fn first_line(&self) -> u32 {
        self.lines.first().map_or(0, |l| l.line)
    }
}

/// Relevance descending, then target key, then line ascending.
pub fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.target.key().cmp(b.target.key()))
        .then_with(|| a.first_line().cmp(&b.first_line()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    pub max_hits: usize,
    pub max_file_bytes: u64,
    pub commit_scan_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_hits: DEFAULT_MAX_HITS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            commit_scan_limit: DEFAULT_COMMIT_SCAN_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    repo: Arc<RepoAccessor>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(repo: Arc<RepoAccessor>, config: SearchConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Ranked hits for `query`, at most `min(limit, max_hits)` of them.
    ///
    /// No matches is an empty vector. A blank query is
    /// [`ToolError::InvalidArgument`].
    pub async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ToolError> {
        let Some(parsed) = Query::parse(query) else {
            return Err(ToolError::invalid("query must not be empty"));
        };
        let cap = limit.min(self.config.max_hits);

        let mut hits = match kind {
            SearchKind::Content => self.search_content(&parsed).await?,
            SearchKind::Path => self.search_paths(&parsed).await?,
            SearchKind::Commit => self.search_commits(&parsed).await?,
        };
        let candidates = hits.len();
        hits.sort_by(rank_order);
        hits.truncate(cap);

        debug!(
            "search {kind:?} '{}': {candidates} candidates, returning {}",
            parsed.phrase,
            hits.len()
        );
        Ok(hits)
    }

    /// Lines declaring `name` (a function, type, class, constant, ...),
    /// at most `min(limit, max_hits)` of them, sorted by path then line.
    pub async fn find_definitions(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ToolError> {
        let name = name.trim();
        if !symbols::is_identifier(name) {
            return Err(ToolError::invalid(format!(
                "'{name}' is not a symbol name; use search_code for free text"
            )));
        }
        let cap = limit.min(self.config.max_hits);

        let mut hits = Vec::new();
        for rel in self.repo.list_files(None).await? {
            let language = Language::from_path(&rel);
            if language == Language::Unknown {
                continue;
            }
            let Some(text) = self.load_candidate(&rel).await else {
                continue;
            };
            for (idx, line) in text.lines().enumerate() {
                if !line.contains(name) {
                    continue;
                }
                let Some(decl) = symbols::declaration(language, line) else {
                    continue;
                };
                if !decl.kind.is_definition() || decl.name.as_deref() != Some(name) {
                    continue;
                }
                let n = idx as u32 + 1;
                hits.push(SearchHit {
                    target: HitTarget::File(FileRef::new(rel.clone()).with_lines(n, n)),
                    lines: vec![MatchedLine {
                        line: n,
                        text: clip_line(line),
                    }],
                    score: 1.0,
                    kind: MatchKind::Definition(decl.kind),
                });
            }
        }
        let candidates = hits.len();
        hits.sort_by(rank_order);
        hits.truncate(cap);

        debug!("find_definitions '{name}': {candidates} found, returning {}", hits.len());
        Ok(hits)
    }

    async fn search_content(&self, query: &Query) -> Result<Vec<SearchHit>, ToolError> {
        let mut hits = Vec::new();
        for rel in self.repo.list_files(None).await? {
            let Some(text) = self.load_candidate(&rel).await else {
                continue;
            };
            for (idx, line) in text.lines().enumerate() {
                if let Some(score) = score::score_text(query, line) {
                    let n = idx as u32 + 1;
                    hits.push(SearchHit {
                        target: HitTarget::File(FileRef::new(rel.clone()).with_lines(n, n)),
                        lines: vec![MatchedLine {
                            line: n,
                            text: clip_line(line),
                        }],
                        score,
                        kind: MatchKind::Content,
                    });
                }
            }
        }
        Ok(hits)
    }

    /// Text of a searchable file, or `None` if it should be skipped.
    async fn load_candidate(&self, rel: &str) -> Option<String> {
        let full = match paths::resolve_in_root(self.repo.root(), rel).await {
            Ok(p) => p,
            Err(e) => {
                trace!("search skipping {rel}: {e}");
                return None;
            }
        };
        let meta = tokio::fs::metadata(&full).await.ok()?;
        if !meta.is_file() || meta.len() > self.config.max_file_bytes {
            trace!("search skipping {rel}: {} bytes", meta.len());
            return None;
        }
        let bytes = tokio::fs::read(&full).await.ok()?;
        paths::decode_text(rel, bytes).ok()
    }

    async fn search_paths(&self, query: &Query) -> Result<Vec<SearchHit>, ToolError> {
        Ok(self
            .repo
            .list_files(None)
            .await?
            .into_iter()
            .filter_map(|path| {
                let score = score::score_path(query, &path)?;
                Some(SearchHit {
                    target: HitTarget::File(FileRef::new(path)),
                    lines: Vec::new(),
                    score,
                    kind: MatchKind::Path,
                })
            })
            .collect())
    }

    async fn search_commits(&self, query: &Query) -> Result<Vec<SearchHit>, ToolError> {
        let commits = self.repo.log(self.config.commit_scan_limit, None).await?;
        Ok(commits
            .into_iter()
            .filter_map(|commit| {
                let score = score::score_text(query, &commit.message)?;
                let lines = commit
                    .message
                    .lines()
                    .enumerate()
                    .filter(|(_, l)| score::score_text(query, l).is_some())
                    .map(|(i, l)| MatchedLine {
                        line: i as u32 + 1,
                        text: clip_line(l),
                    })
                    .collect();
                Some(SearchHit {
                    target: HitTarget::Commit {
                        subject: commit.subject().to_string(),
                        id: commit.id,
                    },
                    lines,
                    score,
                    kind: MatchKind::CommitMessage,
                })
            })
            .collect())
    }
}

fn clip_line(line: &str) -> String {
    let trimmed = line.trim_end();
    if trimmed.chars().count() <= MAX_LINE_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_LINE_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testing::{commit_all, init_repo, write};
    use std::time::Duration;

    async fn engine(dir: &tempfile::TempDir) -> SearchEngine {
        let repo = RepoAccessor::open(dir.path(), Duration::from_secs(20))
            .await
            .unwrap();
        SearchEngine::new(Arc::new(repo), SearchConfig::default())
    }

    fn hit(path: &str, line: u32, score: f64) -> SearchHit {
        SearchHit {
            target: HitTarget::File(FileRef::new(path).with_lines(line, line)),
            lines: vec![MatchedLine {
                line,
                text: String::new(),
            }],
            score,
            kind: MatchKind::Content,
        }
    }

    #[test]
    fn rank_order_breaks_ties_by_path_then_line() {
        let mut hits = vec![
            hit("b.rs", 1, 0.5),
            hit("a.rs", 9, 0.5),
            hit("a.rs", 2, 0.5),
            hit("z.rs", 1, 0.9),
        ];
        hits.sort_by(rank_order);
        let order: Vec<(&str, u32)> = hits.iter().map(|h| (h.target.key(), h.first_line())).collect();
        assert_eq!(order, vec![("z.rs", 1), ("a.rs", 2), ("a.rs", 9), ("b.rs", 1)]);
    }

    #[test]
    fn long_lines_are_clipped() {
        let line = "x".repeat(500);
        let clipped = clip_line(&line);
        assert_eq!(clipped.chars().count(), MAX_LINE_CHARS + 3);
    }

    #[tokio::test]
    async fn content_search_finds_definition() {
        let dir = init_repo();
        write(dir.path(), "a.py", "import os\nAPI_BASE = \"http://x\"\n");
        write(dir.path(), "b.py", "from a import API_BASE\nprint(API_BASE)\n");
        commit_all(dir.path(), "init");
        let engine = engine(&dir).await;

        let hits = engine.search("API_BASE", SearchKind::Content, 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.kind == MatchKind::Content));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(
            hits.iter()
                .any(|h| h.target.key() == "a.py" && h.lines[0].line == 2)
        );
    }

    #[tokio::test]
    async fn limit_and_cap_truncate_after_ranking() {
        let dir = init_repo();
        let body: String = (0..30).map(|i| format!("needle {i}\n")).collect();
        write(dir.path(), "many.txt", &body);
        commit_all(dir.path(), "init");
        let engine = engine(&dir).await;

        assert_eq!(engine.search("needle", SearchKind::Content, 5).await.unwrap().len(), 5);
        // Capped by max_hits.
        assert_eq!(
            engine.search("needle", SearchKind::Content, 100).await.unwrap().len(),
            DEFAULT_MAX_HITS
        );
    }

    #[tokio::test]
    async fn blank_query_and_no_hits() {
        let dir = init_repo();
        write(dir.path(), "a.txt", "hello\n");
        commit_all(dir.path(), "init");
        let engine = engine(&dir).await;

        assert!(matches!(
            engine.search("  ", SearchKind::Content, 5).await,
            Err(ToolError::InvalidArgument(_))
        ));
        assert!(engine.search("zzzz", SearchKind::Content, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_binary_and_oversized_files() {
        let dir = init_repo();
        std::fs::write(dir.path().join("blob.bin"), b"needle\0needle").unwrap();
        write(dir.path(), "big.txt", &"needle\n".repeat(100_000));
        write(dir.path(), "small.txt", "needle\n");
        commit_all(dir.path(), "init");
        let engine = engine(&dir).await;

        let hits = engine.search("needle", SearchKind::Content, 20).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target.key(), "small.txt");
    }

    #[tokio::test]
    async fn definitions_ignore_uses() {
        let dir = init_repo();
        write(dir.path(), "a.py", "import os\nAPI_BASE = \"http://x\"\n");
        write(dir.path(), "b.py", "from a import API_BASE\nprint(API_BASE)\n");
        write(dir.path(), "src/lib.rs", "pub fn api_base() {}\nfn other() { api_base(); }\n");
        write(dir.path(), "notes.txt", "API_BASE = 2\n");
        commit_all(dir.path(), "init");
        let engine = engine(&dir).await;

        let hits = engine.find_definitions("API_BASE", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target.provenance(), "a.py:2");
        assert_eq!(hits[0].kind, MatchKind::Definition(symbols::SymbolKind::Constant));

        let hits = engine.find_definitions("api_base", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target.provenance(), "src/lib.rs:1");

        assert!(engine.find_definitions("nothing_here", 10).await.unwrap().is_empty());
        assert!(matches!(
            engine.find_definitions("two words", 10).await,
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn path_and_commit_search() {
        let dir = init_repo();
        write(dir.path(), "src/config.rs", "\n");
        write(dir.path(), "src/lib.rs", "\n");
        commit_all(dir.path(), "Add config loader");
        write(dir.path(), "src/lib.rs", "// x\n");
        commit_all(dir.path(), "Tidy lib");
        let engine = engine(&dir).await;

        let paths = engine.search("config", SearchKind::Path, 5).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].target.key(), "src/config.rs");
        assert_eq!(paths[0].kind, MatchKind::Path);

        let commits = engine.search("config loader", SearchKind::Commit, 5).await.unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].kind, MatchKind::CommitMessage);
        assert!(matches!(
            &commits[0].target,
            HitTarget::Commit { subject, .. } if subject == "Add config loader"
        ));
    }
}
