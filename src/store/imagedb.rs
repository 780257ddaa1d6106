use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use super::{EntryKind, list_entries};
use crate::error::{AuditError, Result};

/// The subset of an image config blob the audit cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub rootfs: Option<RootFs>,
    #[serde(default)]
    pub os: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type", default)]
    pub fs_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub diff_ids: Vec<String>,
}

/// Docker writes `"diff_ids": null` for images without layers.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ImageConfig {
    /// Whether this image belongs to `platform`. An image with no `os`
    /// field is assumed to match.
    pub fn targets(&self, platform: &str) -> bool {
        match self.os.as_deref() {
            None | Some("") => true,
            Some(os) => os.eq_ignore_ascii_case(platform),
        }
    }

    /// Diff ids in stacking order, base layer first.
    pub fn diff_ids(&self) -> &[String] {
        self.rootfs
            .as_ref()
            .map(|r| r.diff_ids.as_slice())
            .unwrap_or_default()
    }
}

/// A file in `imagedb/content/sha256`, named by the image's config hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub id: String,
    pub path: PathBuf,
}

impl ImageEntry {
    pub fn load(&self) -> Result<ImageConfig> {
        let data = fs::read(&self.path).map_err(|source| AuditError::ReadFile {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| AuditError::ParseJson {
            path: self.path.clone(),
            source,
        })
    }
}

/// List the image config files under `dir`, sorted by image id.
pub fn list_images(dir: &Path) -> Result<Vec<ImageEntry>> {
    Ok(list_entries(dir, EntryKind::File)?
        .into_iter()
        .map(|(id, path)| ImageEntry { id, path })
        .collect())
}
