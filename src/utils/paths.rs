//! Path expansion and resolution helpers.

use std::path::{Path, PathBuf};

/// Expand `~` and resolve a possibly-relative path against a base.
pub fn resolve(base: &Path, value: &str) -> PathBuf {
    let expanded = shellexpand::tilde(value).into_owned();
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Expand `~` in a path string without resolving against a base.
pub fn expand(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).into_owned())
}

/// File name of a path as an owned String (lossy).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Relative path of `path` under `root` as a forward-slashed string.
/// Falls back to the full lossy path when `path` is outside `root`.
pub fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
