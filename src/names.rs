//! Reverse lookup from image hash to a human-readable name.
//!
//! Only used to make verbose output readable; nothing here affects which
//! layers are reported.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AuditError, Result};
use crate::store::{self, EntryKind, strip_digest_prefix};

/// Suffix for labels inherited from a tagged ancestor.
pub const INHERITED_SUFFIX: &str = " (inheritance chain)";

#[derive(Deserialize)]
struct RepositoriesFile {
    #[serde(rename = "Repositories", default)]
    repositories: HashMap<String, HashMap<String, String>>,
}

/// Image labels resolved for one run.
#[derive(Debug, Default)]
pub struct ImageNames {
    labels: HashMap<String, String>,
    /// Ancestors that have neither a parent nor a tag.
    pub dangling: BTreeSet<String>,
}

impl ImageNames {
    /// Resolve labels from `repositories.json` and the image metadata dir.
    pub fn resolve(repositories: &Path, metadata_dir: &Path) -> Result<Self> {
        let mut names = Self::from_repositories(repositories)?;
        let edges = parent_edges(metadata_dir)?;
        names.follow_parents(&edges)?;
        Ok(names)
    }

    /// Record a tag for every image named in `repositories.json`.
    pub fn from_repositories(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|source| AuditError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file: RepositoriesFile =
            serde_json::from_slice(&data).map_err(|source| AuditError::ParseJson {
                path: path.to_path_buf(),
                source,
            })?;

        let mut names = Self::default();
        // Sorted so an image with several tags always gets the same one.
        let tags: BTreeMap<&str, &str> = file
            .repositories
            .values()
            .flat_map(|tags| tags.iter())
            .map(|(tag, hash)| (tag.as_str(), hash.as_str()))
            .collect();
        for (tag, hash) in tags {
            // `repo@sha256:...` entries are digest pins, not tags.
            if tag.contains("@sha256") {
                continue;
            }
            names
                .labels
                .entry(strip_digest_prefix(hash).to_string())
                .or_insert_with(|| tag.to_string());
        }
        Ok(names)
    }

    /// Label untagged images after their nearest tagged ancestor.
    ///
    /// `edges` maps child hash to parent hash. A walk that reaches an
    /// ancestor with neither a tag nor a parent records it as dangling.
    pub fn follow_parents(&mut self, edges: &BTreeMap<String, String>) -> Result<()> {
        let mut inherited = Vec::new();

        for (child, parent) in edges {
            if self.labels.contains_key(child) {
                continue;
            }
            let mut seen = HashSet::from([child.as_str()]);
            let mut current = parent.as_str();
            loop {
                if let Some(tag) = self.labels.get(current) {
                    inherited.push((child.clone(), format!("{tag}{INHERITED_SUFFIX}")));
                    break;
                }
                let Some(next) = edges.get(current) else {
                    if self.dangling.insert(current.to_string()) {
                        log::warn!("Dangling image found: {current}");
                    }
                    break;
                };
                if !seen.insert(current) {
                    return Err(AuditError::ParentCycle {
                        image: child.clone(),
                    });
                }
                current = next;
            }
        }

        self.labels.extend(inherited);
        Ok(())
    }

    pub fn get(&self, image: &str) -> Option<&str> {
        self.labels.get(image).map(String::as_str)
    }

    /// Label to show for `image`, falling back to its hash.
    pub fn display(&self, image: &str) -> String {
        match self.get(image) {
            Some(label) => label.to_string(),
            None => format!("({}{image})", store::SHA256_PREFIX),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Read the child → parent edges from `imagedb/metadata/sha256`.
///
/// The `parent` file is optional; an image without one is a root. Read
/// failures other than absence are logged and the image is skipped.
pub fn parent_edges(metadata_dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut edges = BTreeMap::new();
    if !metadata_dir.exists() {
        log::debug!("No image metadata at {}", metadata_dir.display());
        return Ok(edges);
    }

    for (child, path) in store::list_entries(metadata_dir, EntryKind::Dir)? {
        match store::read_id_file(&path.join("parent")) {
            Ok(parent) => {
                edges.insert(child, strip_digest_prefix(&parent).to_string());
            }
            Err(AuditError::ReadFile { source, .. }) if source.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Unable to read parent info for image {child}: {e}"),
        }
    }
    Ok(edges)
}
