//! Atomic publication of the result document.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Replace `path` with `content` without readers ever seeing a partial file.
///
/// The content goes to a temp file in the destination directory first and is
/// renamed over the destination. A crash can orphan a temp file but never
/// renames one into place half-written.
pub fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .context(format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .context("failed to write result document to temp file")?;
    tmp.persist(path)
        .context(format!("failed to replace {}", path.display()))?;
    Ok(())
}
