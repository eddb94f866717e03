//! Line-oriented declaration matching: file outlines and symbol definitions.
//!
//! Each supported language has an ordered list of declaration rules; the
//! first rule matching a line decides its [`SymbolKind`]. This is a
//! lexical approximation, not a parser: it sees one line at a time and
//! knows nothing about strings or comments spanning lines.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::repo::FileRef;

/// Lines shown for a file whose language has no rules.
pub const FALLBACK_LINES: usize = 20;
/// Outline entries are cut to this many characters.
const MAX_OUTLINE_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Ruby,
    Unknown,
}

impl Language {
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            "java" | "kt" | "kts" | "cs" | "scala" => Language::Java,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Language::C,
            "rb" => Language::Ruby,
            _ => Language::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java-like",
            Language::C => "c/c++",
            Language::Ruby => "ruby",
            Language::Unknown => "unknown",
        }
    }

    fn rules(self) -> &'static [Rule] {
        match self {
            Language::Rust => RUST.as_slice(),
            Language::Python => PYTHON.as_slice(),
            Language::JavaScript | Language::TypeScript => SCRIPT.as_slice(),
            Language::Go => GO.as_slice(),
            Language::Java => JAVA.as_slice(),
            Language::C => C_LIKE.as_slice(),
            Language::Ruby => RUBY.as_slice(),
            Language::Unknown => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Struct,
    Enum,
    Trait,
    Interface,
    Type,
    Module,
    Constant,
    Impl,
    Import,
}

impl SymbolKind {
    /// Kinds that introduce a name somebody could ask for.
    pub fn is_definition(self) -> bool {
        !matches!(self, SymbolKind::Impl | SymbolKind::Import)
    }

    pub fn label(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Trait => "trait",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Module => "module",
            SymbolKind::Constant => "constant",
            SymbolKind::Impl => "impl",
            SymbolKind::Import => "import",
        }
    }
}

struct Rule {
    kind: SymbolKind,
    regex: Regex,
}

fn rules(specs: &[(SymbolKind, &str)]) -> Vec<Rule> {
    specs
        .iter()
        .filter_map(|(kind, pattern)| {
            RegexBuilder::new(pattern)
                .build()
                .ok()
                .map(|regex| Rule { kind: *kind, regex })
        })
        .collect()
}

macro_rules! rust_vis {
    () => {
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?"
    };
}

static RUST: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (
            Function,
            concat!(
                rust_vis!(),
                r#"(?:(?:const|async|unsafe|default)\s+)*(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_]\w*)"#
            ),
        ),
        (Struct, concat!(rust_vis!(), r"struct\s+(?P<name>[A-Za-z_]\w*)")),
        (Enum, concat!(rust_vis!(), r"enum\s+(?P<name>[A-Za-z_]\w*)")),
        (Trait, concat!(rust_vis!(), r"(?:unsafe\s+)?trait\s+(?P<name>[A-Za-z_]\w*)")),
        (Type, concat!(rust_vis!(), r"type\s+(?P<name>[A-Za-z_]\w*)")),
        (Module, concat!(rust_vis!(), r"mod\s+(?P<name>[A-Za-z_]\w*)")),
        (
            Constant,
            concat!(rust_vis!(), r"(?:const|static)\s+(?:mut\s+)?(?P<name>[A-Za-z_]\w*)\s*:"),
        ),
        (Impl, r"^\s*(?:unsafe\s+)?impl\b"),
        (Import, concat!(rust_vis!(), r"use\s+")),
    ])
});

static PYTHON: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (Function, r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)"),
        (Class, r"^\s*class\s+(?P<name>[A-Za-z_]\w*)"),
        (Constant, r"^(?P<name>[A-Z][A-Z0-9_]*)\s*(?::[^=]*)?=[^=]"),
        (Import, r"^(?:from\s+\S+\s+)?import\s+"),
    ])
});

static SCRIPT: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (
            Function,
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
        ),
        (
            Function,
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]*)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]*)?=>",
        ),
        (
            Class,
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)",
        ),
        (Interface, r"^\s*(?:export\s+)?interface\s+(?P<name>[A-Za-z_$][\w$]*)"),
        (Type, r"^\s*(?:export\s+)?type\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*="),
        (Enum, r"^\s*(?:export\s+)?(?:const\s+)?enum\s+(?P<name>[A-Za-z_$][\w$]*)"),
        (
            Constant,
            r"^(?:export\s+)?const\s+(?P<name>[A-Z][A-Z0-9_]*)\s*(?::[^=]*)?=",
        ),
        (Import, r"^\s*import\s"),
    ])
});

static GO: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (Function, r"^func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_]\w*)"),
        (Struct, r"^type\s+(?P<name>[A-Za-z_]\w*)\s+struct\b"),
        (Interface, r"^type\s+(?P<name>[A-Za-z_]\w*)\s+interface\b"),
        (Type, r"^type\s+(?P<name>[A-Za-z_]\w*)"),
        (Constant, r"^(?:const|var)\s+(?P<name>[A-Za-z_]\w*)"),
        (Import, r"^import\b"),
    ])
});

macro_rules! java_mods {
    () => {
        r"^\s*(?:@\w+\s+)*(?:(?:public|private|protected|internal|abstract|final|static|sealed|open|data|partial)\s+)*"
    };
}

static JAVA: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (Class, concat!(java_mods!(), r"(?:class|record|object)\s+(?P<name>[A-Za-z_]\w*)")),
        (Interface, concat!(java_mods!(), r"interface\s+(?P<name>[A-Za-z_]\w*)")),
        (Enum, concat!(java_mods!(), r"enum\s+(?:class\s+)?(?P<name>[A-Za-z_]\w*)")),
        (
            Function,
            concat!(java_mods!(), r"fun\s+(?:<[^>]*>\s*)?(?:\w+\.)?(?P<name>[A-Za-z_]\w*)"),
        ),
        (
            Function,
            r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|synchronized|native|override|virtual|async)\s+)+[\w<>\[\],.?\s]*?\s(?P<name>[A-Za-z_]\w*)\s*\(",
        ),
        (Import, r"^\s*(?:import|using)\s"),
    ])
});

static C_LIKE: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (Struct, r"^\s*(?:typedef\s+)?struct\s+(?P<name>[A-Za-z_]\w*)"),
        (Class, r"^\s*(?:template\s*<[^>]*>\s*)?class\s+(?P<name>[A-Za-z_]\w*)"),
        (Enum, r"^\s*(?:typedef\s+)?enum\s+(?:class\s+)?(?P<name>[A-Za-z_]\w*)"),
        (Module, r"^\s*namespace\s+(?P<name>[A-Za-z_]\w*)"),
        (Constant, r"^#define\s+(?P<name>[A-Za-z_]\w*)"),
        (
            Function,
            r"^(?:[A-Za-z_][\w*&:<>,]*\s+)+\**&?(?:\w+::)*(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
        ),
        (Import, r"^#include\b"),
    ])
});

static RUBY: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use SymbolKind::*;
    rules(&[
        (Function, r"^\s*def\s+(?:self\.)?(?P<name>[A-Za-z_]\w*[?!=]?)"),
        (Class, r"^\s*class\s+(?P<name>[A-Z]\w*)"),
        (Module, r"^\s*module\s+(?P<name>[A-Z]\w*)"),
        (Constant, r"^\s*(?P<name>[A-Z][A-Z0-9_]*)\s*=[^=]"),
        (Import, r"^\s*require(?:_relative)?\s"),
    ])
});

/// A declaration found on one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: SymbolKind,
    /// `None` for imports and impl blocks.
    pub name: Option<String>,
}

/// The declaration on `line`, if any.
pub fn declaration(language: Language, line: &str) -> Option<Declaration> {
    language.rules().iter().find_map(|rule| {
        let caps = rule.regex.captures(line)?;
        Some(Declaration {
            kind: rule.kind,
            name: caps.name("name").map(|m| m.as_str().to_string()),
        })
    })
}

/// Whether `name` can be looked up as a symbol.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// One line of a file outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineItem {
    /// 1-based.
    pub line: u32,
    /// `None` for fallback lines of an unknown language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SymbolKind>,
    pub text: String,
}

/// The declarations of one file, or its first lines when the language is
/// not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutline {
    pub file: FileRef,
    pub language: Language,
    pub total_lines: u32,
    /// Items are the first [`FALLBACK_LINES`] lines, not declarations.
    pub fallback: bool,
    pub items: Vec<OutlineItem>,
}

/// Outline `text`, the full content of `file`.
pub fn outline(file: FileRef, text: &str) -> FileOutline {
    let language = Language::from_path(&file.path);
    let total_lines = text.lines().count() as u32;

    if language == Language::Unknown {
        let items = text
            .lines()
            .take(FALLBACK_LINES)
            .enumerate()
            .map(|(i, line)| OutlineItem {
                line: i as u32 + 1,
                kind: None,
                text: clip(line),
            })
            .collect();
        return FileOutline {
            file,
            language,
            total_lines,
            fallback: true,
            items,
        };
    }

    let items = text
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let decl = declaration(language, line)?;
            Some(OutlineItem {
                line: i as u32 + 1,
                kind: Some(decl.kind),
                text: clip(line),
            })
        })
        .collect();
    FileOutline {
        file,
        language,
        total_lines,
        fallback: false,
        items,
    }
}

fn clip(line: &str) -> String {
    let trimmed = line.trim_end();
    if trimmed.chars().count() <= MAX_OUTLINE_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_OUTLINE_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decl(language: Language, line: &str) -> Option<(SymbolKind, Option<String>)> {
        declaration(language, line).map(|d| (d.kind, d.name))
    }

    fn named(kind: SymbolKind, name: &str) -> Option<(SymbolKind, Option<String>)> {
        Some((kind, Some(name.to_string())))
    }

    #[test]
    fn every_rule_compiles() {
        assert_eq!(RUST.len(), 9);
        assert_eq!(PYTHON.len(), 4);
        assert_eq!(SCRIPT.len(), 8);
        assert_eq!(GO.len(), 6);
        assert_eq!(JAVA.len(), 6);
        assert_eq!(C_LIKE.len(), 7);
        assert_eq!(RUBY.len(), 5);
    }

    #[test]
    fn rust_declarations() {
        use SymbolKind::*;
        let r = Language::Rust;
        assert_eq!(decl(r, "pub async fn open(path: &Path)"), named(Function, "open"));
        assert_eq!(decl(r, "    pub(crate) const fn new() -> Self {"), named(Function, "new"));
        assert_eq!(decl(r, "pub struct RepoHandle {"), named(Struct, "RepoHandle"));
        assert_eq!(decl(r, "enum Kind { A, B }"), named(Enum, "Kind"));
        assert_eq!(decl(r, "pub const MAX_READ_BYTES: u64 = 8;"), named(Constant, "MAX_READ_BYTES"));
        assert_eq!(decl(r, "impl<T> Tool for Wrapper<T> {"), Some((Impl, None)));
        assert_eq!(decl(r, "use std::sync::Arc;"), Some((Import, None)));
        assert_eq!(decl(r, "    let x = open(path);"), None);
    }

    #[test]
    fn python_declarations() {
        use SymbolKind::*;
        let p = Language::Python;
        assert_eq!(decl(p, "API_BASE = \"http://x\""), named(Constant, "API_BASE"));
        assert_eq!(decl(p, "    async def fetch(self):"), named(Function, "fetch"));
        assert_eq!(decl(p, "class Client(Base):"), named(Class, "Client"));
        assert_eq!(decl(p, "from a import API_BASE"), Some((Import, None)));
        assert_eq!(decl(p, "if API_BASE == x:"), None);
    }

    #[test]
    fn script_declarations() {
        use SymbolKind::*;
        let t = Language::TypeScript;
        assert_eq!(decl(t, "export async function load(id) {"), named(Function, "load"));
        assert_eq!(decl(t, "const handler = async (req) => {"), named(Function, "handler"));
        assert_eq!(decl(t, "export interface Props {"), named(Interface, "Props"));
        assert_eq!(decl(t, "export const API_URL = '/api';"), named(Constant, "API_URL"));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("API_BASE"));
        assert!(is_identifier("$store"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier("9lives"));
    }

    #[test]
    fn outline_lists_declarations_in_order() {
        let text = "use std::fmt;\n\npub struct A;\n\nimpl A {\n    pub fn go(&self) {}\n}\n";
        let out = outline(FileRef::new("src/a.rs"), text);
        assert!(!out.fallback);
        assert_eq!(out.total_lines, 7);
        let lines: Vec<(u32, Option<SymbolKind>)> = out.items.iter().map(|i| (i.line, i.kind)).collect();
        assert_eq!(
            lines,
            vec![
                (1, Some(SymbolKind::Import)),
                (3, Some(SymbolKind::Struct)),
                (5, Some(SymbolKind::Impl)),
                (6, Some(SymbolKind::Function)),
            ]
        );
    }

    #[test]
    fn unknown_language_falls_back_to_leading_lines() {
        let text: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        let out = outline(FileRef::new("notes.txt"), &text);
        assert!(out.fallback);
        assert_eq!(out.items.len(), FALLBACK_LINES);
        assert_eq!(out.items[0].text, "line 1");
        assert_eq!(out.total_lines, 30);
    }
}
