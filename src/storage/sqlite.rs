//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::path::{CanonicalPath, TenantRoot};
use crate::storage::descendant_range;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult, StoredEntry};
use crate::tree::ResourceKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const ENTRY_COLUMNS: &str = "path, kind, size, last_modified";

/// Insert guard: `?1` is the root, `?3` the parent path; the tree root needs no row
const PARENT_IS_FOLDER: &str = "(?3 = '' OR EXISTS (
    SELECT 1 FROM resources WHERE root = ?1 AND path = ?3 AND kind = 'folder'))";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no partial transaction behind, so the connection stays usable
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn kind_at(
        conn: &Connection,
        root: &TenantRoot,
        path: &CanonicalPath,
    ) -> StorageResult<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT kind FROM resources WHERE root = ?1 AND path = ?2",
                params![root.as_str(), path.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn query_entries(
        conn: &Connection,
        root: &TenantRoot,
        folder: &CanonicalPath,
        direct_only: bool,
    ) -> StorageResult<Vec<StoredEntry>> {
        let rows = if direct_only {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM resources WHERE root = ?1 AND parent = ?2 ORDER BY name"
            ))?;
            let rows = stmt
                .query_map(params![root.as_str(), folder.as_str()], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else if let Some((low, high)) = descendant_range(folder) {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM resources
                 WHERE root = ?1 AND path >= ?2 AND path < ?3 ORDER BY path"
            ))?;
            let rows = stmt
                .query_map(params![root.as_str(), low, high], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM resources WHERE root = ?1 ORDER BY path"
            ))?;
            let rows = stmt
                .query_map(params![root.as_str()], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(RawEntry::into_entry).collect()
    }
}

/// A row as stored, before its kind and timestamp are validated
struct RawEntry {
    path: String,
    kind: String,
    size: i64,
    last_modified: String,
}

impl RawEntry {
    fn into_entry(self) -> StorageResult<StoredEntry> {
        let kind = ResourceKind::from_db_string(&self.kind).ok_or_else(|| StorageError::Corrupt {
            path: self.path.clone(),
            reason: format!("unknown kind '{}'", self.kind),
        })?;
        let last_modified = DateTime::parse_from_rfc3339(&self.last_modified)
            .map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                reason: format!("bad timestamp: {}", e),
            })?
            .with_timezone(&Utc);

        Ok(StoredEntry {
            path: CanonicalPath::from_stored(&self.path),
            kind,
            size: self.size.max(0) as u64,
            last_modified,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        path: row.get(0)?,
        kind: row.get(1)?,
        size: row.get(2)?,
        last_modified: row.get(3)?,
    })
}

fn parent_of(path: &CanonicalPath) -> String {
    path.parent()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

impl Storage for SqliteStorage {
    fn stat(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<Option<StoredEntry>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM resources WHERE root = ?1 AND path = ?2"),
                params![root.as_str(), path.as_str()],
                read_row,
            )
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }

    fn children(
        &self,
        root: &TenantRoot,
        folder: &CanonicalPath,
    ) -> StorageResult<Vec<StoredEntry>> {
        let conn = self.conn();
        Self::query_entries(&conn, root, folder, true)
    }

    fn descendants(
        &self,
        root: &TenantRoot,
        folder: &CanonicalPath,
    ) -> StorageResult<Vec<StoredEntry>> {
        let conn = self.conn();
        Self::query_entries(&conn, root, folder, false)
    }

    fn create_folder(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<StoredEntry> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let folder = ResourceKind::Folder.to_db_string();
        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO resources (root, path, parent, name, kind, size, content, last_modified)
                 SELECT ?1, ?2, ?3, ?4, ?5, 0, NULL, ?6 WHERE {PARENT_IS_FOLDER}"
            ),
            params![
                root.as_str(),
                path.as_str(),
                parent_of(path),
                path.name(),
                folder,
                now.to_rfc3339()
            ],
        )?;

        if inserted == 0 {
            let taken = Self::kind_at(&tx, root, path)?.is_some();
            return Err(if taken {
                StorageError::AlreadyExists(path.to_string())
            } else {
                StorageError::NotFound(path.to_string())
            });
        }
        tx.commit()?;

        Ok(StoredEntry {
            path: path.clone(),
            kind: ResourceKind::Folder,
            size: 0,
            last_modified: now,
        })
    }

    fn put_file(
        &self,
        root: &TenantRoot,
        path: &CanonicalPath,
        data: &[u8],
    ) -> StorageResult<StoredEntry> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = Self::kind_at(&tx, root, path)?;
        if existing.as_deref() == Some(ResourceKind::Folder.to_db_string()) {
            return Err(StorageError::NotAFile(path.to_string()));
        }

        let now = Utc::now();
        let written = tx.execute(
            &format!(
                "INSERT INTO resources (root, path, parent, name, kind, size, content, last_modified)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8 WHERE {PARENT_IS_FOLDER}
                 ON CONFLICT(root, path) DO UPDATE SET
                    size = excluded.size,
                    content = excluded.content,
                    last_modified = excluded.last_modified"
            ),
            params![
                root.as_str(),
                path.as_str(),
                parent_of(path),
                path.name(),
                ResourceKind::File.to_db_string(),
                data.len() as i64,
                data,
                now.to_rfc3339()
            ],
        )?;
        if written == 0 {
            return Err(StorageError::NotFound(path.to_string()));
        }
        tx.commit()?;

        Ok(StoredEntry {
            path: path.clone(),
            kind: ResourceKind::File,
            size: data.len() as u64,
            last_modified: now,
        })
    }

    fn read_file(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<Vec<u8>> {
        let conn = self.conn();
        let row: Option<(String, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT kind, content FROM resources WHERE root = ?1 AND path = ?2",
                params![root.as_str(), path.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((kind, content)) if kind == ResourceKind::File.to_db_string() => {
                Ok(content.unwrap_or_default())
            }
            Some(_) => Err(StorageError::NotAFile(path.to_string())),
            None => Err(StorageError::NotFound(path.to_string())),
        }
    }

    fn delete(&self, root: &TenantRoot, path: &CanonicalPath) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM resources WHERE root = ?1 AND path = ?2",
            params![root.as_str(), path.as_str()],
        )?;
        if removed == 0 {
            return Err(StorageError::NotFound(path.to_string()));
        }

        if let Some((low, high)) = descendant_range(path) {
            tx.execute(
                "DELETE FROM resources WHERE root = ?1 AND path >= ?2 AND path < ?3",
                params![root.as_str(), low, high],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
