use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{EntryKind, list_entries, read_id_file};
use crate::error::Result;

/// One `layerdb/sha256/<id>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Name of the metadata directory (the layer's chain id).
    pub id: String,
    /// Content hash of the layer's filesystem delta, from the `diff` file.
    pub diff_id: String,
    /// Raw layer directory name, from the `cache-id` file.
    pub cache_id: String,
    pub visited: bool,
}

/// The layer-metadata store, keyed by diff id.
///
/// Several chain ids can share a diff id when the same delta is stacked on
/// different parents, so each key holds every descriptor carrying it, in
/// directory order.
#[derive(Debug)]
pub struct LayerIndex {
    dir: PathBuf,
    by_diff: BTreeMap<String, Vec<LayerDescriptor>>,
}

impl LayerIndex {
    /// Load every entry under `dir`.
    ///
    /// Both `diff` and `cache-id` are mandatory. A missing one means the
    /// store is corrupt and fails the whole scan, naming the file.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut by_diff: BTreeMap<String, Vec<LayerDescriptor>> = BTreeMap::new();

        for (id, path) in list_entries(dir, EntryKind::Dir)? {
            let diff_id = read_id_file(&path.join("diff"))?;
            let cache_id = read_id_file(&path.join("cache-id"))?;

            let shared = by_diff.entry(diff_id.clone()).or_default();
            if let Some(first) = shared.first() {
                log::debug!("Layers {} and {id} share diff {diff_id}", first.id);
            }
            shared.push(LayerDescriptor {
                id,
                diff_id,
                cache_id,
                visited: false,
            });
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            by_diff,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of metadata entries (not distinct diff ids).
    pub fn len(&self) -> usize {
        self.by_diff.values().map(Vec::len).sum()
    }

    /// All descriptors carrying `diff_id`.
    pub fn by_diff_mut(&mut self, diff_id: &str) -> Option<&mut Vec<LayerDescriptor>> {
        self.by_diff.get_mut(diff_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerDescriptor> {
        self.by_diff.values().flatten()
    }

    /// Metadata directory names never visited, in sorted order.
    pub fn unvisited(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .iter()
            .filter(|l| !l.visited)
            .map(|l| l.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::test::TestRuntime;

    #[test]
    fn test_scan_keys_by_diff_id() {
        let rt = TestRuntime::new();
        rt.add_layer("l1", "sha256:d1", "c1");
        rt.add_layer("l2", "sha256:d2", "c2");

        let mut index = LayerIndex::scan(&rt.layout().layer_metadata_dir()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.by_diff_mut("sha256:d1").is_some());
        assert!(index.by_diff_mut("l1").is_none());

        let layers = index.by_diff_mut("sha256:d2").unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].id, "l2");
        assert_eq!(layers[0].cache_id, "c2");
        assert!(!layers[0].visited);
    }

    #[test]
    fn test_shared_diff_id_keeps_both() {
        let rt = TestRuntime::new();
        rt.add_layer("chain-b", "sha256:d1", "c2");
        rt.add_layer("chain-a", "sha256:d1", "c1");

        let mut index = LayerIndex::scan(&rt.layout().layer_metadata_dir()).unwrap();
        let ids: Vec<_> = index
            .by_diff_mut("sha256:d1")
            .unwrap()
            .iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(ids, ["chain-a", "chain-b"]);
        assert_eq!(index.unvisited(), ["chain-a", "chain-b"]);
    }

    #[test]
    fn test_missing_cache_id_file_names_path() {
        let rt = TestRuntime::new();
        rt.add_layer("l1", "sha256:d1", "c1");
        let cache_file = rt.layout().layer_metadata_dir().join("l1").join("cache-id");
        std::fs::remove_file(&cache_file).unwrap();

        match LayerIndex::scan(&rt.layout().layer_metadata_dir()) {
            Err(AuditError::ReadFile { path, .. }) => assert_eq!(path, cache_file),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
