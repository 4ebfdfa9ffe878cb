//! Canonical path keys and accepted document types.
//!
//! Every path that reaches the store, or is compared against it, goes through
//! [`normalize_source`] so that a file is never known under two keys. Keys are
//! relative to the watched root and always use `/`.

use std::path::{Component, Path};

/// Extensions the scanner, watcher and listing accept (lowercase, no dot).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "txt", "doc", "docx", "epub", "odt", "pptx"];

/// Whether `path` names a document type we index. Case-insensitive.
pub fn is_accepted(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Whether the file name starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Store key for `path`.
///
/// Paths under `root` become root-relative; anything else keeps its own
/// components. `.` components are dropped in both cases.
pub fn normalize_source(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    join_components(relative)
}

/// Store key for a user-supplied file name.
///
/// Accepts `./notes.txt`, `sub\report.pdf` or an absolute path under `root`.
pub fn normalize_filter(root: &Path, name: &str) -> String {
    let unified = name.trim().replace('\\', "/");
    let path = Path::new(&unified);
    if path.is_absolute() {
        return normalize_source(root, path);
    }
    let stripped = path.strip_prefix(root).unwrap_or(path);
    join_components(stripped)
}

fn join_components(path: &Path) -> String {
    let mut head = String::new();
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => head.push_str(&prefix.as_os_str().to_string_lossy()),
            Component::RootDir => head.push('/'),
            Component::CurDir => {}
            Component::ParentDir => parts.push("..".to_string()),
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    head + &parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_accepted_extensions() {
        assert!(is_accepted(Path::new("notes.txt")));
        assert!(is_accepted(Path::new("deck.PPTX")));
        assert!(is_accepted(Path::new("dir/Book.Epub")));
        assert!(!is_accepted(Path::new("image.png")));
        assert!(!is_accepted(Path::new("Makefile")));
        assert!(!is_accepted(Path::new("archive.txt.gz")));
    }

    #[test]
    fn test_hidden_files() {
        assert!(is_hidden(Path::new("docs/.draft.txt")));
        assert!(!is_hidden(Path::new("docs/draft.txt")));
    }

    #[test]
    fn test_normalize_under_root() {
        let root = PathBuf::from("/data/docs");
        assert_eq!(
            normalize_source(&root, &root.join("sub").join("report.pdf")),
            "sub/report.pdf"
        );
        assert_eq!(normalize_source(&root, &root.join("notes.txt")), "notes.txt");
    }

    #[test]
    fn test_normalize_relative_input() {
        let root = PathBuf::from("/data/docs");
        assert_eq!(normalize_source(&root, Path::new("./notes.txt")), "notes.txt");
        assert_eq!(normalize_source(&root, Path::new("a/./b.txt")), "a/b.txt");
    }

    #[test]
    fn test_normalize_outside_root_keeps_full_path() {
        let root = PathBuf::from("/data/docs");
        assert_eq!(
            normalize_source(&root, Path::new("/elsewhere/x.txt")),
            "/elsewhere/x.txt"
        );
    }

    #[test]
    fn test_same_file_one_key() {
        let root = PathBuf::from("/data/docs");
        let from_watcher = normalize_source(&root, &root.join("sub/a.txt"));
        let from_user = normalize_filter(&root, "./sub/a.txt");
        let from_windows_user = normalize_filter(&root, "sub\\a.txt");
        let from_absolute = normalize_filter(&root, "/data/docs/sub/a.txt");
        assert_eq!(from_watcher, "sub/a.txt");
        assert_eq!(from_user, from_watcher);
        assert_eq!(from_windows_user, from_watcher);
        assert_eq!(from_absolute, from_watcher);
    }
}
