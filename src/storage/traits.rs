//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::path::{CanonicalPath, TenantRoot};
use crate::tree::ResourceKind;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Corrupt entry {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata of one stored node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub path: CanonicalPath,
    pub kind: ResourceKind,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Trait for storage backend implementations
///
/// Backends are keyed by (tenant root, canonical path) and must keep the
/// folder/file distinction. The tree checks structure up front, but the
/// backend has the final word: `create_folder` never overwrites an existing
/// node, and neither insert succeeds unless the parent is a stored folder
/// (the tenant root always is). A parent removed between the tree's check
/// and the insert therefore surfaces as `NotFound` instead of an orphan.
///
/// Implementations must be safe to share between threads.
pub trait Storage: Send + Sync {
    /// Looks up a single node
    fn stat(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<Option<StoredEntry>>;

    /// Lists the direct children of a folder, sorted by name
    fn children(&self, root: &TenantRoot, folder: &CanonicalPath)
        -> StorageResult<Vec<StoredEntry>>;

    /// Lists every node beneath a folder (not the folder itself), sorted by path
    fn descendants(
        &self,
        root: &TenantRoot,
        folder: &CanonicalPath,
    ) -> StorageResult<Vec<StoredEntry>>;

    /// Creates a folder node; fails with `AlreadyExists` if any node is at
    /// `path` and `NotFound` if its parent is not a folder
    fn create_folder(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<StoredEntry>;

    /// Creates or replaces a file node with `data`; fails with `NotFound` if
    /// its parent is not a folder
    fn put_file(
        &self,
        root: &TenantRoot,
        path: &CanonicalPath,
        data: &[u8],
    ) -> StorageResult<StoredEntry>;

    /// Reads a file node's content
    fn read_file(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<Vec<u8>>;

    /// Deletes a node and everything beneath it
    fn delete(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<()>;
}
