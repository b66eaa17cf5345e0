//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Read file contents with standardized error handling.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Read raw bytes with standardized error handling.
pub fn read_bytes(path: &Path, operation: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write bytes to a file, creating parent directories first.
pub fn write_bytes(path: &Path, content: &[u8], operation: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent, operation)?;
    }
    fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

pub fn ensure_dir(path: &Path, operation: &str) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("{} (create {})", operation, path.display())),
        )
    })
}

/// Copy `source` into `target_dir`, keeping the file name. Returns the new path.
pub fn copy_into(source: &Path, target_dir: &Path, operation: &str) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", source.display()),
            Some(operation.to_string()),
        )
    })?;
    let destination = target_dir.join(file_name);
    fs::copy(source, &destination).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("{} ({} -> {})", operation, source.display(), destination.display())),
        )
    })?;
    Ok(destination)
}

/// Remove a file or directory tree. A missing path is not an error.
///
/// Returns whether anything was removed.
pub fn remove_path(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(Error::internal_io(
                e.to_string(),
                Some(format!("stat {}", path.display())),
            ))
        }
    };

    let removal = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removal {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::internal_io(
            e.to_string(),
            Some(format!("remove {}", path.display())),
        )),
    }
}

/// Recursively collect files under `root` whose name ends with `.{ext}`.
pub fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let suffix = format!(".{}", ext);
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(&suffix))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Find a directory named `name` no deeper than two levels below `root`.
pub fn find_dir(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

/// Sorted file names directly inside `dir`.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn is_non_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
