//! In-memory storage implementation
//!
//! Keeps every tenant's nodes in one ordered map keyed by (root, path), so
//! descendant scans are range queries.

use crate::path::{CanonicalPath, TenantRoot};
use crate::storage::descendant_range;
use crate::storage::traits::{Storage, StorageError, StorageResult, StoredEntry};
use crate::tree::ResourceKind;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type NodeKey = (String, String);

#[derive(Debug, Clone)]
struct Node {
    kind: ResourceKind,
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

impl Node {
    fn entry(&self, path: &str) -> StoredEntry {
        StoredEntry {
            path: CanonicalPath::from_stored(path),
            kind: self.kind,
            size: self.data.len() as u64,
            last_modified: self.last_modified,
        }
    }
}

/// Volatile storage backend
#[derive(Debug, Default)]
pub struct MemoryStorage {
    nodes: RwLock<BTreeMap<NodeKey, Node>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<NodeKey, Node>> {
        // Every mutation below leaves the map consistent, so a poisoned lock is still usable
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<NodeKey, Node>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }

    fn key(root: &TenantRoot, path: &CanonicalPath) -> NodeKey {
        (root.as_str().to_string(), path.as_str().to_string())
    }

    /// The root is always a folder; any other parent must be a stored folder
    fn parent_is_folder(
        nodes: &BTreeMap<NodeKey, Node>,
        root: &TenantRoot,
        path: &CanonicalPath,
    ) -> bool {
        match path.parent() {
            Some(parent) if !parent.is_root() => nodes
                .get(&Self::key(root, &parent))
                .is_some_and(|node| node.kind == ResourceKind::Folder),
            _ => true,
        }
    }

    fn scan<'a>(
        nodes: &'a BTreeMap<NodeKey, Node>,
        root: &'a TenantRoot,
        folder: &CanonicalPath,
    ) -> Box<dyn Iterator<Item = (&'a NodeKey, &'a Node)> + 'a> {
        let tenant = root.as_str().to_string();
        match descendant_range(folder) {
            Some((low, high)) => Box::new(nodes.range((tenant.clone(), low)..(tenant, high))),
            None => Box::new(
                nodes
                    .range((tenant.clone(), String::new())..)
                    .take_while(move |((r, _), _)| r == root.as_str()),
            ),
        }
    }
}

impl Storage for MemoryStorage {
    fn stat(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<Option<StoredEntry>> {
        let nodes = self.read();
        Ok(nodes
            .get(&Self::key(root, path))
            .map(|node| node.entry(path.as_str())))
    }

    fn children(
        &self,
        root: &TenantRoot,
        folder: &CanonicalPath,
    ) -> StorageResult<Vec<StoredEntry>> {
        let nodes = self.read();
        let depth = folder.segments().count() + 1;
        let mut children: Vec<StoredEntry> = Self::scan(&nodes, root, folder)
            .filter(|((_, path), _)| path.split('/').count() == depth)
            .map(|((_, path), node)| node.entry(path))
            .collect();
        children.sort_by(|a, b| a.path.name().cmp(b.path.name()));
        Ok(children)
    }

    fn descendants(
        &self,
        root: &TenantRoot,
        folder: &CanonicalPath,
    ) -> StorageResult<Vec<StoredEntry>> {
        let nodes = self.read();
        Ok(Self::scan(&nodes, root, folder)
            .map(|((_, path), node)| node.entry(path))
            .collect())
    }

    fn create_folder(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<StoredEntry> {
        let mut nodes = self.write();
        let key = Self::key(root, path);
        if nodes.contains_key(&key) {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        if !Self::parent_is_folder(&nodes, root, path) {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let node = Node {
            kind: ResourceKind::Folder,
            data: Vec::new(),
            last_modified: Utc::now(),
        };
        let entry = node.entry(path.as_str());
        nodes.insert(key, node);
        Ok(entry)
    }

    fn put_file(
        &self,
        root: &TenantRoot,
        path: &CanonicalPath,
        data: &[u8],
    ) -> StorageResult<StoredEntry> {
        let mut nodes = self.write();
        let key = Self::key(root, path);
        if let Some(existing) = nodes.get(&key) {
            if existing.kind == ResourceKind::Folder {
                return Err(StorageError::NotAFile(path.to_string()));
            }
        }
        if !Self::parent_is_folder(&nodes, root, path) {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let node = Node {
            kind: ResourceKind::File,
            data: data.to_vec(),
            last_modified: Utc::now(),
        };
        let entry = node.entry(path.as_str());
        nodes.insert(key, node);
        Ok(entry)
    }

    fn read_file(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<Vec<u8>> {
        let nodes = self.read();
        match nodes.get(&Self::key(root, path)) {
            Some(node) if node.kind == ResourceKind::File => Ok(node.data.clone()),
            Some(_) => Err(StorageError::NotAFile(path.to_string())),
            None => Err(StorageError::NotFound(path.to_string())),
        }
    }

    fn delete(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<()> {
        let mut nodes = self.write();
        if nodes.remove(&Self::key(root, path)).is_none() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let doomed: Vec<NodeKey> = Self::scan(&nodes, root, path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            nodes.remove(&key);
        }
        Ok(())
    }
}
