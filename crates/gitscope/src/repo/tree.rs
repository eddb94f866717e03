//! Folding a flat file list into a depth-limited directory tree.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::ToolError;

/// Levels shown when the caller does not ask for a depth.
pub const DEFAULT_TREE_DEPTH: u32 = 2;
/// Deepest tree `project_tree` will render.
pub const MAX_TREE_DEPTH: u32 = 8;

/// Directory layout under `root`, `max_depth` levels deep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTree {
    /// Directory the tree starts at; empty for the repository root.
    pub root: String,
    pub max_depth: u32,
    /// Files under `root`, at any depth.
    pub total_files: usize,
    /// Entries in display order: each directory precedes its children.
    pub entries: Vec<TreeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// 0 for entries directly under `root`.
    pub depth: u32,
    #[serde(flatten)]
    pub kind: TreeEntryKind,
}

impl TreeEntry {
    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeEntryKind {
    File,
    /// `files` counts everything beneath. A collapsed directory sits at the
    /// depth limit and its children are not listed.
    Dir { files: usize, collapsed: bool },
}

#[derive(Default)]
struct Node {
    dirs: BTreeMap<String, Node>,
    files: BTreeSet<String>,
    total: usize,
}

impl Node {
    fn insert(&mut self, parts: &[&str]) {
        self.total += 1;
        match parts {
            [] => {}
            [file] => {
                self.files.insert((*file).to_string());
            }
            [dir, rest @ ..] => self.dirs.entry((*dir).to_string()).or_default().insert(rest),
        }
    }

    /// Directories first, then files, each sorted by name.
    fn emit(&self, prefix: &str, depth: u32, max_depth: u32, out: &mut Vec<TreeEntry>) {
        for (name, child) in &self.dirs {
            let path = join(prefix, name);
            let collapsed = depth + 1 >= max_depth;
            out.push(TreeEntry {
                path: path.clone(),
                depth,
                kind: TreeEntryKind::Dir {
                    files: child.total,
                    collapsed,
                },
            });
            if !collapsed {
                child.emit(&path, depth + 1, max_depth, out);
            }
        }
        for name in &self.files {
            out.push(TreeEntry {
                path: join(prefix, name),
                depth,
                kind: TreeEntryKind::File,
            });
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Build the tree of `files` (repository-relative, `/`-separated) under the
/// normalized directory `root`.
pub fn build_tree(files: &[String], root: &str, max_depth: u32) -> Result<ProjectTree, ToolError> {
    if max_depth == 0 || max_depth > MAX_TREE_DEPTH {
        return Err(ToolError::invalid(format!(
            "max_depth must be between 1 and {MAX_TREE_DEPTH}"
        )));
    }
    if files.iter().any(|f| f == root) {
        return Err(ToolError::invalid(format!(
            "'{root}' is a file; use read_file or file_outline"
        )));
    }

    let dir_prefix = if root.is_empty() {
        String::new()
    } else {
        format!("{root}/")
    };
    let mut top = Node::default();
    for file in files {
        if let Some(rel) = file.strip_prefix(&dir_prefix) {
            let parts: Vec<&str> = rel.split('/').filter(|p| !p.is_empty()).collect();
            top.insert(&parts);
        }
    }
    if top.total == 0 && !root.is_empty() {
        return Err(ToolError::not_found(format!("directory '{root}'")));
    }

    let mut entries = Vec::new();
    top.emit(root, 0, max_depth, &mut entries);
    Ok(ProjectTree {
        root: root.to_string(),
        max_depth,
        total_files: top.total,
        entries,
    })
}
