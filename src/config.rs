use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};

/// Default storage driver directory on Windows hosts.
pub const DEFAULT_DRIVER: &str = "windowsfilter";

/// Image OS that gets traversed unless overridden.
pub const DEFAULT_PLATFORM: &str = "windows";

/// Conventional Docker root for the host we are running on.
pub fn default_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ProgramData\docker")
    } else {
        PathBuf::from("/var/lib/docker")
    }
}

/// Paths of every store below a Docker runtime root.
///
/// ```text
/// <root>/
/// +-- image/<driver>/
/// |   +-- repositories.json
/// |   +-- imagedb/content/sha256/<image-hash>          # image config JSON
/// |   +-- imagedb/metadata/sha256/<image-hash>/parent  # optional
/// |   +-- layerdb/sha256/<layer-id>/{diff,cache-id}
/// +-- <driver>/<cache-id>/                             # raw layers
/// +-- containers/<container-id>/
/// ```
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    driver: String,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>, driver: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            driver: driver.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    fn image_root(&self) -> PathBuf {
        self.root.join("image").join(&self.driver)
    }

    pub fn image_content_dir(&self) -> PathBuf {
        self.image_root().join("imagedb").join("content").join("sha256")
    }

    pub fn image_metadata_dir(&self) -> PathBuf {
        self.image_root().join("imagedb").join("metadata").join("sha256")
    }

    pub fn layer_metadata_dir(&self) -> PathBuf {
        self.image_root().join("layerdb").join("sha256")
    }

    pub fn repositories_file(&self) -> PathBuf {
        self.image_root().join("repositories.json")
    }

    pub fn raw_layer_dir(&self) -> PathBuf {
        self.root.join(&self.driver)
    }

    pub fn container_dir(&self) -> PathBuf {
        self.root.join("containers")
    }

    /// Check that every store the audit needs is present.
    ///
    /// The image metadata dir is not required: without it name resolution
    /// just has no parent edges to follow.
    pub fn validate(&self) -> Result<()> {
        let dirs = [
            self.root.clone(),
            self.image_content_dir(),
            self.layer_metadata_dir(),
            self.raw_layer_dir(),
            self.container_dir(),
        ];
        for path in dirs {
            match path.try_exists() {
                Ok(true) => {}
                Ok(false) => return Err(AuditError::MissingPath(path)),
                Err(source) => return Err(AuditError::ReadDir { path, source }),
            }
        }

        let repositories = self.repositories_file();
        match repositories.try_exists() {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuditError::MissingPath(repositories)),
            Err(source) => Err(AuditError::ReadFile {
                path: repositories,
                source,
            }),
        }
    }
}

/// Settings for one audit run, built once from the command line.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub layout: StoreLayout,
    /// Images whose `os` differs from this are not traversed.
    pub platform: String,
    pub remove: bool,
    pub verbose: bool,
    /// `Some("-")` writes the JSON report to stdout.
    pub json: Option<String>,
}

impl AuditConfig {
    pub fn from_cli(
        folder: Option<PathBuf>,
        driver: String,
        platform: String,
        remove: bool,
        verbose: bool,
        json: Option<String>,
    ) -> Self {
        let root = folder.unwrap_or_else(default_root);
        Self {
            layout: StoreLayout::new(root, driver),
            platform,
            remove,
            verbose,
            json,
        }
    }
}
