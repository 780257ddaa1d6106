use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{EntryKind, list_entries};
use crate::error::Result;

/// A physical layer directory, named by its cache id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLayer {
    pub id: String,
    pub visited: bool,
}

/// All raw layer directories under `<root>/<driver>`, keyed by cache id.
#[derive(Debug)]
pub struct RawLayerIndex {
    dir: PathBuf,
    layers: BTreeMap<String, RawLayer>,
}

impl RawLayerIndex {
    /// Index every immediate subdirectory of `dir`. Names are opaque.
    pub fn scan(dir: &Path) -> Result<Self> {
        let layers = list_entries(dir, EntryKind::Dir)?
            .into_iter()
            .map(|(id, _)| {
                let layer = RawLayer {
                    id: id.clone(),
                    visited: false,
                };
                (id, layer)
            })
            .collect();

        Ok(Self {
            dir: dir.to_path_buf(),
            layers,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Mark a layer as referenced. Returns false if no such layer exists.
    pub fn visit(&mut self, cache_id: &str) -> bool {
        match self.layers.get_mut(cache_id) {
            Some(layer) => {
                layer.visited = true;
                true
            }
            None => false,
        }
    }

    /// Cache ids never visited, in sorted order.
    pub fn unvisited(&self) -> Vec<String> {
        self.layers
            .values()
            .filter(|l| !l.visited)
            .map(|l| l.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_ignores_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("c1")).unwrap();
        fs::create_dir(dir.path().join("c2")).unwrap();
        fs::write(dir.path().join("layerchain.json"), "[]").unwrap();

        let index = RawLayerIndex::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.unvisited(), ["c1", "c2"]);
    }

    #[test]
    fn test_visit_and_unvisited() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["c3", "c1", "c2"] {
            fs::create_dir(dir.path().join(id)).unwrap();
        }
        let mut index = RawLayerIndex::scan(dir.path()).unwrap();
        assert!(index.visit("c2"));
        assert!(!index.visit("c9"));
        assert_eq!(index.unvisited(), ["c1", "c3"]);
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RawLayerIndex::scan(&dir.path().join("windowsfilter")).is_err());
    }
}
