//! Storage backends for resource trees
//!
//! This module holds the seam between the resource tree and the physical
//! store behind it:
//! - The `Storage` trait keyed by (tenant root, canonical path)
//! - An in-memory backend for tests and ephemeral deployments
//! - A SQLite backend that persists metadata and content

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult, StoredEntry};

use crate::config::{StorageBackend, StorageConfig};
use crate::path::CanonicalPath;
use crate::FolioError;
use std::path::Path;
use std::sync::Arc;

/// Opens the backend selected by the configuration
///
/// # Arguments
///
/// * `config` - The storage section of the configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn Storage>)` - The opened backend
/// * `Err(FolioError)` - The database could not be opened
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, FolioError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::debug!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::Sqlite => {
            tracing::debug!("Opening SQLite storage at {}", config.database_path);
            let storage = SqliteStorage::new(Path::new(&config.database_path))?;
            Ok(Arc::new(storage))
        }
    }
}

/// Returns the half-open path range holding `folder`'s descendants
///
/// Descendants of `a/b` are exactly the paths in `["a/b/", "a/b0")`, since `0`
/// is the byte after `/`. The root folder has no bound: every path is beneath it.
pub(crate) fn descendant_range(folder: &CanonicalPath) -> Option<(String, String)> {
    if folder.is_root() {
        None
    } else {
        Some((format!("{}/", folder.as_str()), format!("{}0", folder.as_str())))
    }
}
