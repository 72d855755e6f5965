//! Zip archive ingestion and export
//!
//! Extraction turns an archive that already lives in a tenant's tree into
//! folders and files. Every entry path is checked before anything is written,
//! so an archive with escaping entries is rejected without side effects.
//! Export goes the other way and packs a folder's subtree into zip bytes.

mod export;
mod extractor;

pub use crate::config::FileCollisionPolicy;
pub use export::export_folder;
pub use extractor::ArchiveExtractor;

use crate::path::CanonicalPath;

/// What an extraction wrote
///
/// Invalid entries and refused collisions are caught before the first
/// write. A backend failure midway is not rolled back; the entries logged
/// before the error are the ones that made it into the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Folder the entries were extracted into
    pub target: CanonicalPath,

    /// Folders created, including the target when it was created
    pub folders_created: usize,

    /// Files written, in archive order
    pub files_written: Vec<CanonicalPath>,

    /// Whether the archive itself was removed afterwards
    pub archive_removed: bool,
}
