/// Resource definitions for tree nodes
///
/// A resource is identified by its tenant root and canonical path; two values
/// with the same pair denote the same node.
use crate::path::{CanonicalPath, TenantRoot};
use crate::storage::StoredEntry;
use chrono::{DateTime, Utc};
use std::fmt;

/// Whether a node holds children or bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Folder,
    File,
}

impl ResourceKind {
    /// Converts the kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::File => "file",
        }
    }

    /// Parses a kind from its database string representation
    ///
    /// Returns None if the string doesn't match any known kind.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(Self::Folder),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A folder or file in a tenant's tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub root: TenantRoot,
    pub path: CanonicalPath,
    pub name: String,
    pub kind: ResourceKind,

    /// Byte length for files, always 0 for folders
    pub size: u64,

    /// `None` only for the implicit tenant root folder
    pub last_modified: Option<DateTime<Utc>>,
}

impl Resource {
    pub(crate) fn from_entry(root: &TenantRoot, entry: StoredEntry) -> Self {
        Self {
            root: root.clone(),
            name: entry.path.name().to_string(),
            path: entry.path,
            kind: entry.kind,
            size: entry.size,
            last_modified: Some(entry.last_modified),
        }
    }

    /// The implicit folder at the top of every tenant tree
    pub(crate) fn tenant_root(root: &TenantRoot) -> Self {
        Self {
            root: root.clone(),
            path: CanonicalPath::root(),
            name: String::new(),
            kind: ResourceKind::Folder,
            size: 0,
            last_modified: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }
}
