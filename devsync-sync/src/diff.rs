//! Unified diffs for `--dry-run` previews.

use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

/// A single pending file change, rendered as a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Diff `old` against `new` with `a/<rel>` / `b/<rel>` headers.
///
/// `rel` is `path` relative to `root` when possible. Returns `None` when the
/// contents are identical.
pub fn unified_diff(root: &Path, path: &Path, old: &str, new: &str) -> Option<FileDiff> {
    if old == new {
        return None;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    let shown = relative.to_string_lossy().replace('\\', "/");
    let old_header = format!("a/{shown}");
    let new_header = format!("b/{shown}");
    let unified = TextDiff::from_lines(old, new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();
    Some(FileDiff {
        path: path.to_path_buf(),
        unified_diff: unified,
    })
}
