//! Download directory housekeeping.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::install::UNCRYPT_EXTENSION;

/// `dir/name`, or `dir/<stem>-N<ext>` with the smallest free `N` if that
/// is taken.
///
/// The extension is everything from the last dot; a leading dot does not
/// start one.
pub fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, extension) = match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    };
    (1u64..)
        .map(|count| dir.join(format!("{stem}-{count}{extension}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Remove leftovers from `dir`: recovery copies and files no row refers to.
///
/// Returns the number of files removed.
pub fn cleanup_download_dir(dir: &Path, keep: &HashSet<PathBuf>) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_copy = path.extension().is_some_and(|ext| ext == UNCRYPT_EXTENSION);
        if !is_copy && keep.contains(&path) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale download");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove stale download"),
        }
    }
    Ok(removed)
}

/// Delete `path`, treating a missing file as success.
pub(crate) fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Deleted package"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not delete package"),
    }
}
