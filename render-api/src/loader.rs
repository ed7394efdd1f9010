//! Blob loading contract: the backend asks for raw bytes by path and the host
//! decides where they come from (disk, archive, HTTP cache, ...).

use std::io;
use std::path::PathBuf;

/// Supplies raw file contents to the backend (pipeline JSON, shader source,
/// mesh and material blobs). Text consumers tolerate a trailing NUL, so an
/// implementation may return C-style buffers unchanged.
pub trait BlobLoader {
    fn load(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Loads blobs from a root directory on the local filesystem.
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlobLoader for DirLoader {
    fn load(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}
