use crate::path::{CanonicalPath, TenantRoot};
use crate::tree::{ResourceKind, ResourceTree};
use crate::Result;
use std::io::{self, Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packs everything beneath `folder` into a zip archive
///
/// Entry names are relative to `folder`, so extracting the result into a
/// fresh folder reproduces the subtree. Empty folders are kept as directory
/// entries.
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - The archive bytes
/// * `Err(FolioError::NotFound)` - `folder` is not an existing folder
pub fn export_folder(
    tree: &ResourceTree,
    root: &TenantRoot,
    folder: &CanonicalPath,
) -> Result<Vec<u8>> {
    let resources = tree.list_subtree(root, folder)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for resource in &resources {
        let Some(relative) = resource.path.strip_prefix(folder) else {
            continue;
        };
        match resource.kind {
            ResourceKind::Folder => {
                writer
                    .add_directory(format!("{}/", relative), options)
                    .map_err(io::Error::from)?;
            }
            ResourceKind::File => {
                let data = tree.read_bytes(root, &resource.path)?;
                writer
                    .start_file(relative, options)
                    .map_err(io::Error::from)?;
                writer.write_all(&data)?;
            }
        }
    }

    let cursor = writer.finish().map_err(io::Error::from)?;
    tracing::info!(
        "Exported {} ({} entries) from tenant {}",
        folder,
        resources.len(),
        root
    );
    Ok(cursor.into_inner())
}
