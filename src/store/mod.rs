//! Readers for the on-disk stores of a Docker runtime root.
//!
//! Each store names its entries differently: images by config hash, layer
//! metadata by chain id (but looked up by diff id), raw layers by cache id.
//! The indexes here only load; cross-referencing happens in
//! [`crate::verify`].

pub mod imagedb;
pub mod layerdb;
pub mod raw;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};

pub use imagedb::ImageEntry;
pub use layerdb::LayerIndex;
pub use raw::RawLayerIndex;

/// Prefix of content-addressed references in Docker metadata files.
pub const SHA256_PREFIX: &str = "sha256:";

/// Which kind of directory entries to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Dir,
    File,
}

/// List the names of the immediate children of `dir` of the given kind,
/// sorted by name.
pub(crate) fn list_entries(dir: &Path, kind: EntryKind) -> Result<Vec<(String, PathBuf)>> {
    let read_dir_err = |source| AuditError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        let is_dir = entry.file_type().map_err(read_dir_err)?.is_dir();
        if is_dir != (kind == EntryKind::Dir) {
            continue;
        }
        // Docker only ever writes ASCII hex names; anything else is not ours.
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("Skipping non UTF-8 entry in {}", dir.display());
            continue;
        };
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Read a small text descriptor file, trimming surrounding whitespace.
pub(crate) fn read_id_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| AuditError::ReadFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Strip the `sha256:` scheme from a content reference, if present.
pub fn strip_digest_prefix(s: &str) -> &str {
    s.strip_prefix(SHA256_PREFIX).unwrap_or(s)
}
