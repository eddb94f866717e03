//! Relevance scoring for text lines, commit messages and paths.
//!
//! Text scoring is a bounded term-overlap score with a length penalty:
//!
//! ```text
//! base  = coverage × (0.5 + 0.5 × tf / (tf + 1.5)) × doc_weight
//! score = 1.0 + base   when the whole query occurs as a substring
//!       = base         otherwise
//! ```
//!
//! `base` is always below 1.0, so a substring match outranks any
//! overlap-only match.

use std::collections::HashSet;

/// Saturation constant for term frequency.
const TF_SATURATION: f64 = 1.5;
/// Larger values soften the length penalty.
const LENGTH_DAMPING: f64 = 8.0;
/// Added to a path score when a term matched the file name itself.
const FILE_NAME_BONUS: f64 = 0.1;

/// Lowercased alphanumeric/underscore runs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A prepared query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The whole query, trimmed and lowercased.
    pub phrase: String,
    /// Distinct terms in first-seen order.
    pub terms: Vec<String>,
}

impl Query {
    /// `None` for a blank query.
    pub fn parse(raw: &str) -> Option<Self> {
        let phrase = raw.trim().to_lowercase();
        if phrase.is_empty() {
            return None;
        }
        let mut seen = HashSet::new();
        let terms = tokenize(&phrase)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        Some(Self { phrase, terms })
    }
}

/// Score one line or message. `None` when nothing matched.
pub fn score_text(query: &Query, text: &str) -> Option<f64> {
    let exact = text.to_lowercase().contains(&query.phrase);
    let tokens = tokenize(text);

    let term_set: HashSet<&str> = query.terms.iter().map(String::as_str).collect();
    let tf = tokens.iter().filter(|t| term_set.contains(t.as_str())).count();
    let matched = query
        .terms
        .iter()
        .filter(|term| tokens.iter().any(|t| t == *term))
        .count();

    let base = if matched > 0 {
        let coverage = matched as f64 / query.terms.len() as f64;
        let tf = tf as f64;
        let saturation = 0.5 + 0.5 * tf / (tf + TF_SATURATION);
        let doc_weight = 1.0 / (1.0 + (1.0 + tokens.len() as f64).ln() / LENGTH_DAMPING);
        coverage * saturation * doc_weight
    } else {
        0.0
    };

    if exact {
        Some(1.0 + base)
    } else if matched > 0 {
        Some(base)
    } else {
        None
    }
}

/// How well one query term matches one path component.
fn component_score(term: &str, component: &str) -> f64 {
    let component = component.to_lowercase();
    let stem = component.split('.').next().unwrap_or("");
    if component == term {
        1.0
    } else if stem == term {
        0.95
    } else if component.starts_with(term) {
        0.8
    } else if component.contains(term) {
        0.6
    } else if is_subsequence(term, &component) {
        0.3 * term.chars().count() as f64 / component.chars().count().max(1) as f64
    } else {
        0.0
    }
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    needle.chars().all(|n| hay.any(|h| h == n))
}

/// Fuzzy path score: best component match per term, averaged over terms,
/// plus a bonus when the file name itself matched. `None` when nothing matched.
pub fn score_path(query: &Query, path: &str) -> Option<f64> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let file_name = components.last().copied()?;

    // A query like `.rs` has no terms; match it as one literal term.
    let phrase_term;
    let terms: Vec<&str> = if query.terms.is_empty() {
        phrase_term = query.phrase.clone();
        vec![phrase_term.as_str()]
    } else {
        query.terms.iter().map(String::as_str).collect()
    };

    let mut total = 0.0;
    let mut name_matched = false;
    for term in &terms {
        let best = components
            .iter()
            .map(|c| component_score(term, c))
            .fold(0.0_f64, f64::max);
        total += best;
        if best > 0.0 && component_score(term, file_name) >= best {
            name_matched = true;
        }
    }

    let mut score = total / terms.len() as f64;
    if score <= 0.0 {
        return None;
    }
    if name_matched {
        score += FILE_NAME_BONUS;
    }
    Some(score)
}
