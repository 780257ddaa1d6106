use std::fs;
use std::io;
use std::path::Path;

/// Deletes a directory tree. Injected into the command so the host decides
/// how a leaked layer is actually removed.
pub trait Remover {
    fn remove_tree(&self, path: &Path) -> io::Result<()>;
}

/// Plain recursive delete.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl Remover for FsRemover {
    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}
