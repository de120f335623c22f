//! Reading what the installers need out of a package archive.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use zip::ZipArchive;

use super::error::ArchiveError;

/// Entry holding the block-based payload.
pub const PAYLOAD_BIN: &str = "payload.bin";

/// Entry holding the payload properties, one `KEY=VALUE` per line.
pub const PAYLOAD_PROPERTIES: &str = "payload_properties.txt";

/// Entry holding the OTA metadata.
pub const METADATA_ENTRY: &str = "META-INF/com/android/metadata";

/// Fixed part of a zip local file header.
const LOCAL_HEADER_LEN: u64 = 30;

fn open(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    ZipArchive::new(file).map_err(|e| ArchiveError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_entry(path: &Path, entry: &str) -> Result<String, ArchiveError> {
    let mut archive = open(path)?;
    let mut file = archive.by_name(entry).map_err(|_| ArchiveError::MissingEntry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
    })?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| ArchiveError::Entry {
            path: path.to_path_buf(),
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
    Ok(contents)
}

/// Byte offset of `entry`'s data within the archive at `path`.
///
/// Walks the entries in central directory order, adding the local header
/// size of each entry and the compressed size of every entry before the
/// target.
pub fn payload_offset(path: &Path, entry: &str) -> Result<u64, ArchiveError> {
    let mut archive = open(path)?;
    let mut offset = 0u64;
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index).map_err(|e| ArchiveError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let extra_len = file.extra_data().map_or(0, <[u8]>::len) as u64;
        offset += LOCAL_HEADER_LEN + file.name_raw().len() as u64 + extra_len;
        if file.name() == entry {
            return Ok(offset);
        }
        offset += file.compressed_size();
    }

    Err(ArchiveError::MissingEntry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
    })
}

/// Non-empty lines of the payload properties entry.
pub fn read_properties(path: &Path) -> Result<Vec<String>, ArchiveError> {
    Ok(read_entry(path, PAYLOAD_PROPERTIES)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Whether the package targets the block-based engine.
pub fn is_block_based(path: &Path) -> Result<bool, ArchiveError> {
    let archive = open(path)?;
    let mut has_payload = false;
    let mut has_properties = false;
    for name in archive.file_names() {
        has_payload |= name == PAYLOAD_BIN;
        has_properties |= name == PAYLOAD_PROPERTIES;
    }
    Ok(has_payload && has_properties)
}

/// `post-timestamp` from the OTA metadata, if present.
pub fn read_metadata_timestamp(path: &Path) -> Result<Option<i64>, ArchiveError> {
    let metadata = match read_entry(path, METADATA_ENTRY) {
        Ok(metadata) => metadata,
        Err(ArchiveError::MissingEntry { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(metadata
        .lines()
        .filter_map(|line| line.trim().strip_prefix("post-timestamp="))
        .find_map(|value| value.trim().parse().ok()))
}
