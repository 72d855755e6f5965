//! Hierarchical resource trees
//!
//! This module provides the structural model every operation goes through:
//! - Lookups and listings of folders and files
//! - Strict folder creation (`add_folder`) and the idempotent variant used by
//!   bulk producers (`ensure_folder`, `ensure_folders`)
//! - Recursive removal and copy with folder merge
//! - Byte streams for reading and writing files
//!
//! Sibling-name uniqueness is enforced under a lock on the parent folder.

mod locks;
mod resource;
mod stream;

pub use resource::{Resource, ResourceKind};
pub use stream::{ResourceReader, ResourceWriter};

use crate::path::{CanonicalPath, TenantRoot};
use crate::storage::Storage;
use crate::{FolioError, PathError, Result};
use locks::FolderLocks;
use std::sync::Arc;

/// Tree model over a storage backend, shared by all tenants
pub struct ResourceTree {
    storage: Arc<dyn Storage>,
    locks: FolderLocks,
}

impl ResourceTree {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: FolderLocks::new(),
        }
    }

    /// Looks up a resource, returning `None` when nothing is at `path`
    pub fn get(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<Option<Resource>> {
        if path.is_root() {
            return Ok(Some(Resource::tenant_root(root)));
        }
        Ok(self
            .storage
            .stat(root, path)?
            .map(|entry| Resource::from_entry(root, entry)))
    }

    /// Lists the direct children of a folder, sorted by name
    pub fn list(&self, root: &TenantRoot, folder: &CanonicalPath) -> Result<Vec<Resource>> {
        self.require_folder(root, folder)?;
        Ok(self
            .storage
            .children(root, folder)?
            .into_iter()
            .map(|entry| Resource::from_entry(root, entry))
            .collect())
    }

    /// Lists the whole tenant tree, sorted by path
    pub fn list_all(&self, root: &TenantRoot) -> Result<Vec<Resource>> {
        self.list_subtree(root, &CanonicalPath::root())
    }

    /// Lists everything beneath a folder, sorted by path
    pub fn list_subtree(&self, root: &TenantRoot, folder: &CanonicalPath) -> Result<Vec<Resource>> {
        self.require_folder(root, folder)?;
        Ok(self
            .storage
            .descendants(root, folder)?
            .into_iter()
            .map(|entry| Resource::from_entry(root, entry))
            .collect())
    }

    /// Creates exactly one folder named `name` under an existing `parent`
    ///
    /// # Returns
    ///
    /// * `Ok(Resource)` - The new folder
    /// * `Err(FolioError::AlreadyExists)` - A sibling named `name` exists
    /// * `Err(FolioError::NotFound)` - `parent` is not an existing folder
    /// * `Err(FolioError::InvalidPath)` - `name` is not a single valid segment
    pub fn add_folder(
        &self,
        root: &TenantRoot,
        parent: &CanonicalPath,
        name: &str,
    ) -> Result<Resource> {
        let path = parent.join(name)?;

        self.locks.with_lock(root, parent, || {
            self.require_folder(root, parent)?;
            let entry = self.storage.create_folder(root, &path)?;
            tracing::debug!("Created folder {} in tenant {}", path, root);
            Ok(Resource::from_entry(root, entry))
        })
    }

    /// Makes sure a folder exists at `path`, creating it if absent
    ///
    /// Returns whether a folder was created. The parent must already exist.
    pub fn ensure_folder(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<bool> {
        let Some(parent) = path.parent() else {
            return Ok(false);
        };

        self.locks.with_lock(root, &parent, || {
            match self.storage.stat(root, path)? {
                Some(entry) if entry.kind == ResourceKind::Folder => Ok(false),
                Some(_) => Err(FolioError::Conflict(format!("{} is a file", path))),
                None => {
                    self.require_folder(root, &parent)?;
                    self.storage.create_folder(root, path)?;
                    tracing::debug!("Created folder {} in tenant {}", path, root);
                    Ok(true)
                }
            }
        })
    }

    /// Makes sure `path` and all its ancestors are folders
    ///
    /// Returns the number of folders created.
    pub fn ensure_folders(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<usize> {
        let mut current = CanonicalPath::root();
        let mut created = 0;
        for segment in path.segments() {
            current = current.join(segment)?;
            if self.ensure_folder(root, &current)? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Removes a file, or a folder with everything beneath it
    pub fn remove(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Err(PathError::Malformed(path.to_string(), "the tenant root cannot be removed").into());
        };

        self.locks.with_lock(root, &parent, || self.storage.delete(root, path))?;
        tracing::debug!("Removed {} in tenant {}", path, root);
        Ok(())
    }

    /// Copies `source` to `destination`
    ///
    /// A file overwrites a file. A folder is copied recursively and merges
    /// into an existing destination folder; a missing destination folder is
    /// created along with its ancestors. Mixing kinds, or copying a folder
    /// into itself, is a conflict.
    pub fn copy(
        &self,
        root: &TenantRoot,
        source: &CanonicalPath,
        destination: &CanonicalPath,
    ) -> Result<Resource> {
        let src = self
            .get(root, source)?
            .ok_or_else(|| FolioError::NotFound(source.to_string()))?;
        let dst = self.get(root, destination)?;

        if destination.starts_with(source) {
            return Err(FolioError::Conflict(format!(
                "cannot copy {} into {}",
                source, destination
            )));
        }

        match (src.kind, dst.as_ref().map(|d| d.kind)) {
            (ResourceKind::File, Some(ResourceKind::Folder))
            | (ResourceKind::Folder, Some(ResourceKind::File)) => {
                return Err(FolioError::Conflict(format!(
                    "cannot copy {} {} onto {} {}",
                    src.kind,
                    source,
                    dst.map(|d| d.kind.to_string()).unwrap_or_default(),
                    destination
                )));
            }
            _ => {}
        }

        if src.is_file() {
            let data = self.storage.read_file(root, source)?;
            return self.write_bytes(root, destination, &data);
        }

        let created = self.ensure_folders(root, destination)?;
        let mut copied = 0usize;
        for entry in self.storage.descendants(root, source)? {
            let relative = entry.path.strip_prefix(source).unwrap_or_default();
            let target = destination.join_path(relative)?;
            match entry.kind {
                ResourceKind::Folder => {
                    self.ensure_folder(root, &target)?;
                }
                ResourceKind::File => {
                    let data = self.storage.read_file(root, &entry.path)?;
                    self.write_bytes(root, &target, &data)?;
                }
            }
            copied += 1;
        }

        tracing::debug!(
            "Copied {} to {} in tenant {} ({} nodes, {} folders created for destination)",
            source,
            destination,
            root,
            copied,
            created
        );

        self.get(root, destination)?
            .ok_or_else(|| FolioError::NotFound(destination.to_string()))
    }

    /// Opens a file for reading
    pub fn open_read(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<ResourceReader> {
        let resource = match self.get(root, path)? {
            Some(resource) if resource.is_file() => resource,
            Some(_) => return Err(FolioError::NotFound(format!("{} is a folder", path))),
            None => return Err(FolioError::NotFound(path.to_string())),
        };

        let data = self.storage.read_file(root, path)?;
        Ok(ResourceReader::new(resource, data))
    }

    /// Opens a file for writing, creating it empty if absent
    ///
    /// The returned writer replaces the file's content only when
    /// [`ResourceWriter::finish`] is called.
    pub fn open_write(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<ResourceWriter<'_>> {
        let parent = path
            .parent()
            .ok_or_else(|| FolioError::Conflict("the tenant root is a folder".to_string()))?;

        self.locks.with_lock(root, &parent, || -> Result<()> {
            self.require_folder(root, &parent)?;
            match self.storage.stat(root, path)? {
                Some(entry) if entry.kind == ResourceKind::Folder => {
                    Err(FolioError::Conflict(format!("{} is a folder", path)))
                }
                Some(_) => Ok(()),
                None => {
                    self.storage.put_file(root, path, &[])?;
                    Ok(())
                }
            }
        })?;

        Ok(ResourceWriter::new(self, root.clone(), path.clone()))
    }

    /// Creates or replaces a file in one step
    pub fn write_bytes(
        &self,
        root: &TenantRoot,
        path: &CanonicalPath,
        data: &[u8],
    ) -> Result<Resource> {
        let parent = path
            .parent()
            .ok_or_else(|| FolioError::Conflict("the tenant root is a folder".to_string()))?;

        self.locks.with_lock(root, &parent, || {
            self.require_folder(root, &parent)?;
            let entry = self.storage.put_file(root, path, data)?;
            tracing::trace!("Wrote {} bytes to {} in tenant {}", data.len(), path, root);
            Ok(Resource::from_entry(root, entry))
        })
    }

    /// Reads a whole file
    pub fn read_bytes(&self, root: &TenantRoot, path: &CanonicalPath) -> Result<Vec<u8>> {
        Ok(self.open_read(root, path)?.into_bytes())
    }

    fn require_folder(&self, root: &TenantRoot, folder: &CanonicalPath) -> Result<()> {
        if folder.is_root() {
            return Ok(());
        }
        match self.storage.stat(root, folder)? {
            Some(entry) if entry.kind == ResourceKind::Folder => Ok(()),
            Some(_) => Err(FolioError::NotFound(format!("{} is not a folder", folder))),
            None => Err(FolioError::NotFound(folder.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve;
    use crate::storage::MemoryStorage;
    use crate::ErrorKind;
    use std::io::{Read, Write};

    fn tree() -> ResourceTree {
        ResourceTree::new(Arc::new(MemoryStorage::new()))
    }

    fn p(s: &str) -> CanonicalPath {
        resolve(&TenantRoot::DEFAULT, &CanonicalPath::root(), s).unwrap()
    }

    #[test]
    fn test_get_absent_is_none() {
        let tree = tree();
        assert!(tree.get(&TenantRoot::DEFAULT, &p("nope")).unwrap().is_none());
        assert!(tree
            .get(&TenantRoot::DEFAULT, &CanonicalPath::root())
            .unwrap()
            .unwrap()
            .is_folder());
    }

    #[test]
    fn test_add_folder_requires_parent() {
        let tree = tree();
        let err = tree
            .add_folder(&TenantRoot::DEFAULT, &p("missing"), "x")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_add_folder_rejects_bad_names() {
        let tree = tree();
        for name in ["", ".", "..", "a/b", "a\\b"] {
            let err = tree
                .add_folder(&TenantRoot::DEFAULT, &CanonicalPath::root(), name)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath, "name {:?}", name);
        }
    }

    #[test]
    fn test_add_folder_under_file_is_not_found() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.write_bytes(&root, &p("file.txt"), b"x").unwrap();

        let err = tree.add_folder(&root, &p("file.txt"), "sub").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_concurrent_add_folder_admits_one_winner() {
        let tree = Arc::new(tree());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tree = Arc::clone(&tree);
                std::thread::spawn(move || {
                    tree.add_folder(&TenantRoot::DEFAULT, &CanonicalPath::root(), "race")
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(
            tree.list(&TenantRoot::DEFAULT, &CanonicalPath::root())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_ensure_folders_is_idempotent() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;

        assert_eq!(tree.ensure_folders(&root, &p("a/b/c")).unwrap(), 3);
        assert_eq!(tree.ensure_folders(&root, &p("a/b/c")).unwrap(), 0);
        assert_eq!(tree.ensure_folders(&root, &p("a/b/d")).unwrap(), 1);
    }

    #[test]
    fn test_ensure_folder_over_file_conflicts() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.write_bytes(&root, &p("x"), b"").unwrap();

        let err = tree.ensure_folder(&root, &p("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_list_requires_folder() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.write_bytes(&root, &p("f"), b"").unwrap();

        assert_eq!(tree.list(&root, &p("f")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(tree.list(&root, &p("none")).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_remove() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.ensure_folders(&root, &p("a/b")).unwrap();
        tree.write_bytes(&root, &p("a/b/c.txt"), b"c").unwrap();

        tree.remove(&root, &p("a")).unwrap();
        assert!(tree.list_all(&root).unwrap().is_empty());
        assert_eq!(tree.remove(&root, &p("a")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            tree.remove(&root, &CanonicalPath::root()).unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_copy_file_overwrites_file() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.write_bytes(&root, &p("a.txt"), b"new").unwrap();
        tree.write_bytes(&root, &p("b.txt"), b"old content").unwrap();

        let copied = tree.copy(&root, &p("a.txt"), &p("b.txt")).unwrap();
        assert_eq!(copied.size, 3);
        assert_eq!(tree.read_bytes(&root, &p("b.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_copy_kind_mismatch_conflicts() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.ensure_folders(&root, &p("dir")).unwrap();
        tree.write_bytes(&root, &p("file"), b"x").unwrap();

        assert_eq!(
            tree.copy(&root, &p("file"), &p("dir")).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            tree.copy(&root, &p("dir"), &p("file")).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_copy_into_itself_conflicts() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.ensure_folders(&root, &p("a")).unwrap();

        assert_eq!(
            tree.copy(&root, &p("a"), &p("a/inner")).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_copy_missing_source() {
        let tree = tree();
        assert_eq!(
            tree.copy(&TenantRoot::DEFAULT, &p("ghost"), &p("x"))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_open_read_folder_is_not_found() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.ensure_folders(&root, &p("dir")).unwrap();

        assert_eq!(tree.open_read(&root, &p("dir")).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(tree.open_read(&root, &p("none")).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_writer_commits_on_finish() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;

        let mut writer = tree.open_write(&root, &p("notes.txt")).unwrap();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        let resource = writer.finish().unwrap();
        assert_eq!(resource.size, 11);

        let mut reader = tree.open_read(&root, &p("notes.txt")).unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_dropped_writer_discards_buffer() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.write_bytes(&root, &p("keep.txt"), b"original").unwrap();

        {
            let mut writer = tree.open_write(&root, &p("keep.txt")).unwrap();
            writer.write_all(b"clobbered").unwrap();
        }
        assert_eq!(tree.read_bytes(&root, &p("keep.txt")).unwrap(), b"original");

        {
            let _writer = tree.open_write(&root, &p("fresh.txt")).unwrap();
        }
        assert_eq!(tree.get(&root, &p("fresh.txt")).unwrap().unwrap().size, 0);
    }

    #[test]
    fn test_open_write_errors() {
        let tree = tree();
        let root = TenantRoot::DEFAULT;
        tree.ensure_folders(&root, &p("dir")).unwrap();

        assert_eq!(
            tree.open_write(&root, &p("missing/f")).err().unwrap().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            tree.open_write(&root, &p("dir")).err().unwrap().kind(),
            ErrorKind::Conflict
        );
    }
}
