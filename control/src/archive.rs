//! Bundle archive extraction and file-map merging

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use crate::errors::ControlError;

/// A path -> bytes file set with deterministic ascending-path ordering
pub type FileMap = BTreeMap<String, Vec<u8>>;

/// Extract a ZIP bundle into a file map.
///
/// Directory entries are skipped and path separators normalized to `/`.
/// The cumulative uncompressed size is checked against `max_total_bytes`.
pub fn extract_zip(bytes: &[u8], max_total_bytes: u64) -> Result<FileMap, ControlError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ControlError::ArchiveCorrupt(e.to_string()))?;

    let mut files = FileMap::new();
    let mut total: u64 = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ControlError::ArchiveCorrupt(e.to_string()))?;

        if entry.is_dir() {
            continue;
        }

        total = total.saturating_add(entry.size());
        if total > max_total_bytes {
            return Err(ControlError::SizeLimitExceeded(format!(
                "bundle exceeds {} bytes uncompressed",
                max_total_bytes
            )));
        }

        let path = entry.name().replace('\\', "/");
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|e| ControlError::ArchiveCorrupt(e.to_string()))?;

        files.insert(path, contents);
    }

    Ok(files)
}

/// Merge an overlay file set over a base file set.
///
/// Paths compare case-insensitively; on collision the overlay value wins
/// and the overlay's spelling of the path is kept. Pure function.
pub fn merge(base: &FileMap, overlay: &FileMap) -> FileMap {
    let mut merged = base.clone();

    for (path, contents) in overlay {
        let lowered = path.to_lowercase();
        let shadowed: Vec<String> = merged
            .keys()
            .filter(|existing| existing.to_lowercase() == lowered)
            .cloned()
            .collect();
        for key in shadowed {
            merged.remove(&key);
        }
        merged.insert(path.clone(), contents.clone());
    }

    merged
}
