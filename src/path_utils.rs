// src/path_utils.rs

//! Path helpers shared by the registry, the conductor and the watcher.
//!
//! Database names and relative paths are always stored with forward slashes.
//! Comparisons between them are case-insensitive.

use std::path::Path;

/// Render a path with forward slashes and no trailing separator.
pub fn normalize_path(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

/// Lowercase `s` char by char. Every case-insensitive comparison in the crate
/// goes through this fold.
fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

/// Case-insensitive equality of two names.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    fold(a).eq(fold(b))
}

/// Byte length of the head of `haystack` that equals `prefix` ignoring case.
fn matched_prefix_len(haystack: &str, prefix: &str) -> Option<usize> {
    let mut want = fold(prefix).peekable();
    for (idx, c) in haystack.char_indices() {
        if want.peek().is_none() {
            return Some(idx);
        }
        for lower in c.to_lowercase() {
            if want.next() != Some(lower) {
                return None;
            }
        }
    }
    want.peek().is_none().then_some(haystack.len())
}

/// Case-insensitive `starts_with` for normalized path strings.
pub fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    matched_prefix_len(haystack, prefix).is_some()
}

/// If `path` lives strictly below `dir` (case-insensitive), return the part
/// after the separating slash.
pub fn strip_dir_prefix<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(path);
    }
    let len = matched_prefix_len(path, dir)?;
    let rest = &path[len..];
    if dir.ends_with('/') {
        return Some(rest);
    }
    rest.strip_prefix('/')
}

/// Key used for case-insensitive maps of database names.
pub fn name_key(name: &str) -> String {
    fold(&name.replace('\\', "/")).collect()
}
