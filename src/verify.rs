//! Reachability check across the image, layer and raw layer stores.
//!
//! Every image of the target platform is walked diff id by diff id:
//! diff id → layer descriptor(s) → raw layer by cache id, marking each hop
//! visited. Container directories then pin the raw layers they are named
//! after. Whatever is left unvisited is unreferenced.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use crate::error::{AuditError, Result};
use crate::names::ImageNames;
use crate::store::{self, EntryKind, ImageEntry, LayerIndex, RawLayerIndex};

/// Counters for the summary line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub images_traversed: usize,
    pub images_skipped: usize,
    pub containers_matched: usize,
}

/// Entries never reached by the walk, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Unreferenced {
    /// Layer metadata directory names.
    pub layers: Vec<String>,
    /// Raw layer directory names (cache ids).
    pub raw_layers: Vec<String>,
}

impl Unreferenced {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.raw_layers.is_empty()
    }
}

/// Indexed stores plus the state accumulated while walking them.
#[derive(Debug)]
pub struct Audit {
    pub layers: LayerIndex,
    pub raw: RawLayerIndex,
    pub stats: WalkStats,
    /// Diff id → labels of the images using it. Only filled when a name
    /// table is passed to [`Audit::walk_images`].
    pub layer_images: BTreeMap<String, BTreeSet<String>>,
}

impl Audit {
    pub fn new(layers: LayerIndex, raw: RawLayerIndex) -> Self {
        Self {
            layers,
            raw,
            stats: WalkStats::default(),
            layer_images: BTreeMap::new(),
        }
    }

    /// Walk every image config in `images`.
    ///
    /// Images whose `os` is not `platform` are skipped. A diff id with no
    /// layer descriptor, or a descriptor whose cache id has no directory,
    /// aborts the walk.
    pub fn walk_images(
        &mut self,
        images: &[ImageEntry],
        platform: &str,
        names: Option<&ImageNames>,
    ) -> Result<()> {
        for image in images {
            let config = image.load()?;
            if !config.targets(platform) {
                log::warn!(
                    "Skipping {} image {}",
                    config.os.as_deref().unwrap_or_default(),
                    image.path.display()
                );
                self.stats.images_skipped += 1;
                continue;
            }
            match &config.rootfs {
                Some(rootfs) => log::debug!(
                    "Walking image {} ({} {} diffs)",
                    image.id,
                    rootfs.diff_ids.len(),
                    rootfs.fs_type
                ),
                None => log::debug!("Image {} has no rootfs", image.id),
            }

            for diff_id in config.diff_ids() {
                self.visit_diff(diff_id, &image.path)?;
                if let Some(names) = names {
                    self.layer_images
                        .entry(diff_id.clone())
                        .or_default()
                        .insert(names.display(&image.id));
                }
            }
            self.stats.images_traversed += 1;
        }
        Ok(())
    }

    fn visit_diff(&mut self, diff_id: &str, image: &Path) -> Result<()> {
        let descriptors =
            self.layers
                .by_diff_mut(diff_id)
                .ok_or_else(|| AuditError::MissingLayer {
                    diff_id: diff_id.to_string(),
                    image: image.to_path_buf(),
                })?;

        for layer in descriptors.iter_mut() {
            if !self.raw.visit(&layer.cache_id) {
                return Err(AuditError::MissingRawLayer {
                    cache_id: layer.cache_id.clone(),
                    layer: layer.id.clone(),
                });
            }
            log::trace!("{} -> {} -> {}", layer.diff_id, layer.id, layer.cache_id);
            layer.visited = true;
        }
        Ok(())
    }

    /// Mark the raw layer named after each container directory as visited.
    pub fn visit_containers(&mut self, container_dir: &Path) -> Result<()> {
        for (id, _) in store::list_entries(container_dir, EntryKind::Dir)? {
            if self.raw.visit(&id) {
                log::debug!("Container {id} holds raw layer {id}");
                self.stats.containers_matched += 1;
            }
        }
        Ok(())
    }

    pub fn unreferenced(&self) -> Unreferenced {
        Unreferenced {
            layers: self.layers.unvisited(),
            raw_layers: self.raw.unvisited(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::imagedb::list_images;
    use crate::test::TestRuntime;
    use similar_asserts::assert_eq;

    fn audit(rt: &TestRuntime, names: Option<&ImageNames>) -> Result<Audit> {
        let layout = rt.layout();
        let layers = LayerIndex::scan(&layout.layer_metadata_dir())?;
        let raw = RawLayerIndex::scan(&layout.raw_layer_dir())?;
        let images = list_images(&layout.image_content_dir())?;
        let mut audit = Audit::new(layers, raw);
        audit.walk_images(&images, "windows", names)?;
        audit.visit_containers(&layout.container_dir())?;
        Ok(audit)
    }

    /// One image `h1` with diffs d1, d2 over cache ids c1, c2.
    fn basic_runtime() -> TestRuntime {
        let rt = TestRuntime::new();
        rt.add_image("h1", "windows", &["d1", "d2"]);
        rt.add_layer("l1", "d1", "c1");
        rt.add_layer("l2", "d2", "c2");
        rt.add_raw_layer("c1");
        rt.add_raw_layer("c2");
        rt
    }

    #[test]
    fn test_fully_referenced_store_is_clean() {
        let rt = basic_runtime();
        let audit = audit(&rt, None).unwrap();

        assert!(audit.unreferenced().is_empty());
        assert!(audit.layers.iter().all(|l| l.visited));
        assert_eq!(audit.stats.images_traversed, 1);
        assert!(audit.layer_images.is_empty());
    }

    #[test]
    fn test_orphan_raw_layer_is_reported() {
        let rt = basic_runtime();
        rt.add_raw_layer("c3");
        let audit = audit(&rt, None).unwrap();

        assert_eq!(
            audit.unreferenced(),
            Unreferenced {
                layers: vec![],
                raw_layers: vec!["c3".to_string()],
            }
        );
    }

    #[test]
    fn test_orphan_layer_and_its_raw_layer() {
        let rt = basic_runtime();
        rt.add_layer("l3", "d3", "c3");
        rt.add_raw_layer("c3");
        let unreferenced = audit(&rt, None).unwrap().unreferenced();

        assert_eq!(unreferenced.layers, vec!["l3".to_string()]);
        assert_eq!(unreferenced.raw_layers, vec!["c3".to_string()]);
    }

    #[test]
    fn test_missing_raw_layer_aborts() {
        let rt = basic_runtime();
        rt.add_image("h2", "windows", &["d3"]);
        rt.add_layer("l3", "d3", "c9");

        match audit(&rt, None) {
            Err(AuditError::MissingRawLayer { cache_id, layer }) => {
                assert_eq!(cache_id, "c9");
                assert_eq!(layer, "l3");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_layer_aborts() {
        let rt = basic_runtime();
        rt.add_image("h2", "windows", &["d1", "d7"]);

        match audit(&rt, None) {
            Err(AuditError::MissingLayer { diff_id, image }) => {
                assert_eq!(diff_id, "d7");
                assert_eq!(image, rt.layout().image_content_dir().join("h2"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_linux_image_is_not_traversed() {
        let rt = basic_runtime();
        rt.add_image("h2", "linux", &["d1", "d3"]);
        rt.add_layer("l3", "d3", "c3");
        rt.add_raw_layer("c3");
        let audit = audit(&rt, None).unwrap();

        assert_eq!(audit.stats.images_skipped, 1);
        assert_eq!(audit.stats.images_traversed, 1);
        let unreferenced = audit.unreferenced();
        assert_eq!(unreferenced.layers, vec!["l3".to_string()]);
        assert_eq!(unreferenced.raw_layers, vec!["c3".to_string()]);
    }

    #[test]
    fn test_image_without_rootfs() {
        let rt = TestRuntime::new();
        rt.add_image_json("h1", r#"{"os": "windows"}"#);
        rt.add_raw_layer("c1");
        let audit = audit(&rt, None).unwrap();

        assert_eq!(audit.stats.images_traversed, 1);
        assert_eq!(audit.unreferenced().raw_layers, vec!["c1".to_string()]);
    }

    #[test]
    fn test_container_pins_raw_layer() {
        let rt = basic_runtime();
        rt.add_raw_layer("c4");
        rt.add_container("c4");
        rt.add_container("unrelated");
        let audit = audit(&rt, None).unwrap();

        assert!(!audit.raw.unvisited().contains(&"c4".to_string()));
        assert_eq!(audit.stats.containers_matched, 1);
        assert!(audit.unreferenced().is_empty());
    }

    #[test]
    fn test_shared_diff_visits_every_chain() {
        let rt = basic_runtime();
        rt.add_layer("l1-other-chain", "d1", "c5");
        rt.add_raw_layer("c5");
        let audit = audit(&rt, None).unwrap();

        assert!(audit.unreferenced().is_empty());
    }

    #[test]
    fn test_shared_diff_with_missing_raw_layer_aborts() {
        let rt = basic_runtime();
        rt.add_layer("l1-other-chain", "d1", "c9");

        match audit(&rt, None) {
            Err(AuditError::MissingRawLayer { cache_id, layer }) => {
                assert_eq!(cache_id, "c9");
                assert_eq!(layer, "l1-other-chain");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_layer_membership_uses_labels() {
        let rt = basic_runtime();
        rt.add_image("h2", "windows", &["d1"]);
        rt.write_repositories(&[("app:1", "sha256:h1")]);
        let names = ImageNames::from_repositories(&rt.layout().repositories_file()).unwrap();

        let audit = audit(&rt, Some(&names)).unwrap();
        let d1: Vec<_> = audit.layer_images["d1"].iter().cloned().collect();
        assert_eq!(d1, vec!["(sha256:h2)".to_string(), "app:1".to_string()]);
        let d2: Vec<_> = audit.layer_images["d2"].iter().cloned().collect();
        assert_eq!(d2, vec!["app:1".to_string()]);
    }

    #[test]
    fn test_reporting_twice_is_stable() {
        let rt = basic_runtime();
        rt.add_raw_layer("c8");
        rt.add_raw_layer("c7");
        rt.add_layer("l9", "d9", "c7");
        let audit = audit(&rt, None).unwrap();

        let first = audit.unreferenced();
        assert_eq!(first, audit.unreferenced());
        assert_eq!(first.raw_layers, vec!["c7".to_string(), "c8".to_string()]);
    }
}
