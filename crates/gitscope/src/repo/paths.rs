//! Repository-relative path handling.
//!
//! Every path that arrives from the model passes through [`normalize`] before
//! it touches the filesystem or a git command line, and through
//! [`resolve_in_root`] before a working-tree file is opened.

use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Normalize a repository-relative path to `a/b/c` form.
///
/// Absolute paths and any `..` component are rejected with
/// [`ToolError::PathEscape`], even when the result would land back inside
/// the root. `.` components and redundant separators are dropped. The empty
/// string denotes the root itself.
pub fn normalize(raw: &str) -> Result<String, ToolError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') || trimmed.starts_with('\\') || trimmed.starts_with('~') {
        return Err(ToolError::path_escape(raw));
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s),
                None => return Err(ToolError::invalid(format!("path '{raw}' is not UTF-8"))),
            },
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::path_escape(raw));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Resolve a normalized path against the canonical `root`, following
/// symlinks, and confirm the target is still inside the root.
pub async fn resolve_in_root(root: &Path, rel: &str) -> Result<PathBuf, ToolError> {
    let joined = root.join(rel);
    if tokio::fs::symlink_metadata(&joined).await.is_err() {
        return Err(ToolError::not_found(format!("file '{rel}'")));
    }
    let canonical = tokio::fs::canonicalize(&joined)
        .await
        .map_err(|_| ToolError::not_found(format!("file '{rel}'")))?;
    if !canonical.starts_with(root) {
        return Err(ToolError::path_escape(rel));
    }
    Ok(canonical)
}

/// Whether `bytes` look like binary content: a NUL in the first 8 KiB.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8 * 1024).any(|b| *b == 0)
}

/// Decode file content as text, or fail with [`ToolError::BinaryContent`].
pub fn decode_text(path: &str, bytes: Vec<u8>) -> Result<String, ToolError> {
    if looks_binary(&bytes) {
        return Err(ToolError::BinaryContent { path: path.into() });
    }
    String::from_utf8(bytes).map_err(|_| ToolError::BinaryContent { path: path.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_plain_paths() {
        assert_eq!(normalize("src/main.rs").unwrap(), "src/main.rs");
        assert_eq!(normalize("./src//lib.rs").unwrap(), "src/lib.rs");
        assert_eq!(normalize(".").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
    }

    #[test]
    fn normalize_rejects_escapes() {
        for raw in ["/etc/passwd", "../secret", "src/../../x", "a/..", "~/x", "\\x"] {
            assert!(
                matches!(normalize(raw), Err(ToolError::PathEscape { .. })),
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn resolve_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert!(matches!(
            resolve_in_root(&root, "nope.txt").await,
            Err(ToolError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn resolve_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("src")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "").unwrap();
        assert_eq!(
            resolve_in_root(&root, "src/lib.rs").await.unwrap(),
            root.join("src/lib.rs")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), root.join("link")).unwrap();

        assert!(matches!(
            resolve_in_root(&root, "link").await,
            Err(ToolError::PathEscape { .. })
        ));
    }

    #[test]
    fn binary_detection() {
        assert!(looks_binary(b"abc\0def"));
        assert!(!looks_binary(b"plain text\n"));
        assert!(matches!(
            decode_text("x.bin", vec![0xff, 0xfe, 0x41]),
            Err(ToolError::BinaryContent { .. })
        ));
        assert_eq!(decode_text("x.txt", b"hi".to_vec()).unwrap(), "hi");
    }
}
