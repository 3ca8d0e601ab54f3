//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read file contents with standardized error handling.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::internal_io(
                format!("File not found: {}", path.display()),
                Some(operation.to_string()),
            )
        } else {
            Error::internal_io(e.to_string(), Some(operation.to_string()))
        }
    })
}

/// Read raw bytes with standardized error handling.
pub fn read_bytes(path: &Path, operation: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write content to file with standardized error handling.
pub fn write_file(path: &Path, content: &str, operation: &str) -> Result<()> {
    fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write content to file atomically (write to .tmp, then rename).
///
/// The rename is atomic on POSIX filesystems, so readers always see either
/// the old content or the new content — never a partial write.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let filename = path.file_name().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    let tmp_path = parent.join(format!("{}.tmp", filename.to_string_lossy()));

    fs::write(&tmp_path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("{} (write temp)", operation)))
    })?;

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (rename)", operation))))?;

    Ok(())
}

/// Create a directory (and parents) if it does not already exist.
pub fn ensure_dir(dir: &Path, operation: &str) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
    }
    Ok(())
}

/// Remove a directory tree if it exists. Returns whether anything was removed.
pub fn remove_dir_if_exists(dir: &Path, operation: &str) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
    Ok(true)
}

/// Recursively copy a directory tree. Returns the number of files copied.
pub fn copy_dir_recursive(source: &Path, destination: &Path, operation: &str) -> Result<usize> {
    ensure_dir(destination, operation)?;

    let entries = fs::read_dir(source)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;

    let mut copied = 0;
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
        let path = entry.path();
        let target = destination.join(entry.file_name());

        if path.is_dir() {
            copied += copy_dir_recursive(&path, &target, operation)?;
        } else {
            fs::copy(&path, &target)
                .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Recursively collect all file paths under a root, sorted for determinism.
pub fn collect_files(root: &Path, operation: &str) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    collect_into(root, &mut files, operation)?;
    files.sort();
    Ok(files)
}

fn collect_into(
    dir: &Path,
    files: &mut Vec<std::path::PathBuf>,
    operation: &str,
) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_into(&path, files, operation)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
