//! Fatal errors raised while indexing and walking the runtime stores.
//!
//! Anything returned here aborts the run before a report is produced.
//! Unreferenced entries are not errors; they are the report itself (see
//! [`crate::verify::Unreferenced`]).

use std::path::PathBuf;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A directory or file the layout requires is absent.
    #[error("incorrect folder structure: expected {0} to exist")]
    MissingPath(PathBuf),

    #[error("failed to read files in {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read JSON contents of {path}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An image lists a diff id that no layer-metadata entry carries.
    #[error("expected layer with diff {diff_id} (referenced by {image})")]
    MissingLayer { diff_id: String, image: PathBuf },

    /// A layer-metadata entry points at a cache id with no directory on disk.
    #[error("expected on-disk layer {cache_id} (cache id of layer {layer})")]
    MissingRawLayer { cache_id: String, layer: String },

    /// The image parent chain loops back on itself.
    #[error("image parent chain starting at {image} contains a cycle")]
    ParentCycle { image: String },
}
