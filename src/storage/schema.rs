//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Folio resource store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per folder or file, keyed by tenant root and canonical path
CREATE TABLE IF NOT EXISTS resources (
    root TEXT NOT NULL,
    path TEXT NOT NULL,
    parent TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('folder', 'file')),
    size INTEGER NOT NULL DEFAULT 0,
    content BLOB,
    last_modified TEXT NOT NULL,
    PRIMARY KEY (root, path)
);

CREATE INDEX IF NOT EXISTS idx_resources_parent ON resources(root, parent);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
