//! Byte streams over tree files
//!
//! Readers snapshot a file's content when opened. Writers buffer everything
//! and commit in one backend call on [`ResourceWriter::finish`]; a writer that
//! is dropped instead discards its buffer, so an abandoned write never leaves
//! a half-written file behind.

use crate::path::{CanonicalPath, TenantRoot};
use crate::tree::{Resource, ResourceTree};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Readable, seekable view of a file's bytes
#[derive(Debug)]
pub struct ResourceReader {
    resource: Resource,
    inner: Cursor<Vec<u8>>,
}

impl ResourceReader {
    pub(crate) fn new(resource: Resource, data: Vec<u8>) -> Self {
        Self {
            resource,
            inner: Cursor::new(data),
        }
    }

    /// The file this reader was opened on
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Consumes the reader, returning the full content
    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl Read for ResourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ResourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Buffered writer that replaces a file's content when finished
pub struct ResourceWriter<'a> {
    tree: &'a ResourceTree,
    root: TenantRoot,
    path: CanonicalPath,
    buffer: Vec<u8>,
    finished: bool,
}

impl<'a> ResourceWriter<'a> {
    pub(crate) fn new(tree: &'a ResourceTree, root: TenantRoot, path: CanonicalPath) -> Self {
        Self {
            tree,
            root,
            path,
            buffer: Vec::new(),
            finished: false,
        }
    }

    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }

    /// Commits the buffered bytes as the file's new content
    ///
    /// # Returns
    ///
    /// * `Ok(Resource)` - The file as stored
    /// * `Err(FolioError)` - The parent vanished, a folder took the path, or the backend failed
    pub fn finish(mut self) -> crate::Result<Resource> {
        self.finished = true;
        let data = std::mem::take(&mut self.buffer);
        self.tree.write_bytes(&self.root, &self.path, &data)
    }
}

impl Write for ResourceWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ResourceWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                "Discarding {} unfinished bytes for {} in tenant {}",
                self.buffer.len(),
                self.path,
                self.root
            );
        }
    }
}
