//! Small filesystem and formatting helpers shared by the other modules
//!
//! - Metadata extraction in a cross-platform shape ([`get_file_metadata`])
//! - Path manipulation ([`make_relative`])
//! - Atomic writes for state and settings files ([`atomic_write`])
//! - Human readable sizes ([`format_bytes`])

use crate::error::{Result, SnapsumError};
use crate::types::Attributes;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Metadata of a walked entry
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Size in bytes
    pub length: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Permission and owner bits
    pub attributes: Attributes,
    /// Whether this is a regular file (after following links if requested)
    pub is_file: bool,
}

/// Get file metadata safely
///
/// With `follow_symlinks` unset the link itself is inspected, so a link is
/// never reported as a regular file.
pub fn get_file_metadata(path: &Path, follow_symlinks: bool) -> Result<FileMetadata> {
    let metadata = if follow_symlinks {
        fs::metadata(path)?
    } else {
        fs::symlink_metadata(path)?
    };

    Ok(FileMetadata {
        length: metadata.len(),
        modified: metadata.modified()?.into(),
        attributes: get_attributes(&metadata),
        is_file: metadata.file_type().is_file(),
    })
}

#[cfg(unix)]
fn get_attributes(metadata: &fs::Metadata) -> Attributes {
    use std::os::unix::fs::MetadataExt;
    Attributes {
        permissions: metadata.mode() & 0o7777,
        uid: Some(metadata.uid()),
        gid: Some(metadata.gid()),
    }
}

/// Windows only exposes the read-only flag
#[cfg(not(unix))]
fn get_attributes(metadata: &fs::Metadata) -> Attributes {
    let permissions = if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    };
    Attributes {
        permissions,
        uid: None,
        gid: None,
    }
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symbolic links keep their own path, and
/// falls back to canonical paths when the lexical form differs.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            SnapsumError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Format bytes in human-readable form (1024-based units)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The target is either the previous content or the complete new one, never
/// a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        fs::remove_file(&temp_path).ok();
        return Err(e.into());
    }

    trace!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Length of the shared leading component run of two relative paths
pub fn common_prefix_len(a: &Path, b: &Path) -> usize {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .count()
}
