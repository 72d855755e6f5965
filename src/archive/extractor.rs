use crate::archive::ExtractionReport;
use crate::config::{ArchiveConfig, FileCollisionPolicy};
use crate::path::{resolve_contained, CanonicalPath, TenantRoot};
use crate::tree::{ResourceReader, ResourceTree};
use crate::{FolioError, Result};
use std::fmt::Display;
use std::io::Read;
use zip::ZipArchive;

/// An archive entry whose path has been validated but not yet written
#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    relative: CanonicalPath,
    is_dir: bool,
}

/// Materializes zip archives stored in a tree
pub struct ArchiveExtractor<'a> {
    tree: &'a ResourceTree,
    config: &'a ArchiveConfig,
}

impl<'a> ArchiveExtractor<'a> {
    pub fn new(tree: &'a ResourceTree, config: &'a ArchiveConfig) -> Self {
        Self { tree, config }
    }

    /// Extracts the archive at `zip_path`
    ///
    /// # Extraction Steps
    ///
    /// 1. Open the archive and validate every entry path against the target
    ///    (absolute or `..`-escaping entries fail with `InvalidArchive`)
    /// 2. Pick the target: a new folder named after the archive's stem when
    ///    `create_folder` is set (`AlreadyExists` if taken), else the
    ///    archive's parent
    /// 3. Check every entry against the existing tree: kind clashes are
    ///    `Conflict`, and under the `fail` policy an existing file is
    ///    `AlreadyExists`
    /// 4. Create directory entries idempotently and write file entries
    /// 5. Remove the archive if `remove_zip` is set and every entry succeeded
    ///
    /// # Arguments
    ///
    /// * `root` - Tenant owning the archive
    /// * `zip_path` - Canonical path of the archive file
    /// * `create_folder` - Extract into a new folder named after the archive
    /// * `remove_zip` - Remove the archive after a complete extraction
    ///
    /// # Returns
    ///
    /// * `Ok(ExtractionReport)` - Everything was extracted
    /// * `Err(FolioError)` - Path, limit and collision errors are reported
    ///   before anything is written; a backend failure midway leaves the
    ///   earlier entries in place
    pub fn extract(
        &self,
        root: &TenantRoot,
        zip_path: &CanonicalPath,
        create_folder: bool,
        remove_zip: bool,
    ) -> Result<ExtractionReport> {
        let resource = self
            .tree
            .get(root, zip_path)?
            .ok_or_else(|| FolioError::NotFound(zip_path.to_string()))?;
        if resource.is_folder() {
            return Err(invalid_archive(zip_path, "a folder is not an archive"));
        }

        let reader = self.tree.open_read(root, zip_path)?;
        let mut archive = ZipArchive::new(reader).map_err(|e| invalid_archive(zip_path, e))?;
        let plan = self.plan(root, zip_path, &mut archive)?;

        let parent = zip_path.parent().unwrap_or_default();
        if !create_folder {
            self.preflight(root, &parent, zip_path, &plan)?;
        }

        let mut report = ExtractionReport {
            target: parent.clone(),
            folders_created: 0,
            files_written: Vec::new(),
            archive_removed: false,
        };

        if create_folder {
            let folder = self.tree.add_folder(root, &parent, archive_stem(resource.name.as_str()))?;
            report.target = folder.path;
            report.folders_created += 1;
        }

        tracing::info!(
            "Extracting {} entries from {} into {} (tenant {})",
            plan.len(),
            zip_path,
            report.target,
            root
        );

        let mut budget = self.config.max_total_bytes;
        for entry in &plan {
            let target = report.target.join_path(entry.relative.as_str())?;
            if entry.is_dir {
                report.folders_created += self.tree.ensure_folders(root, &target)?;
                tracing::debug!("Folder {}", target);
                continue;
            }

            if let Some(folder) = target.parent() {
                report.folders_created += self.tree.ensure_folders(root, &folder)?;
            }

            let data = read_entry(&mut archive, entry.index, budget, zip_path)?;
            budget -= data.len() as u64;
            self.tree.write_bytes(root, &target, &data)?;
            tracing::debug!("File {} ({} bytes)", target, data.len());
            report.files_written.push(target);
        }

        if remove_zip {
            self.tree.remove(root, zip_path)?;
            report.archive_removed = true;
        }

        tracing::info!(
            "Extracted {}: {} files, {} folders created{}",
            zip_path,
            report.files_written.len(),
            report.folders_created,
            if report.archive_removed { ", archive removed" } else { "" }
        );
        Ok(report)
    }

    /// Validates entry count, declared sizes and every entry path
    fn plan(
        &self,
        root: &TenantRoot,
        zip_path: &CanonicalPath,
        archive: &mut ZipArchive<ResourceReader>,
    ) -> Result<Vec<PlannedEntry>> {
        if archive.len() > self.config.max_entries {
            return Err(invalid_archive(
                zip_path,
                format!(
                    "{} entries exceed the limit of {}",
                    archive.len(),
                    self.config.max_entries
                ),
            ));
        }

        let mut declared_total: u64 = 0;
        let mut plan = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| invalid_archive(zip_path, e))?;

            let name = file.name().to_string();
            let relative = resolve_contained(root, &CanonicalPath::root(), &name)
                .map_err(|e| invalid_archive(zip_path, format!("entry '{}': {}", name, e)))?;

            declared_total = declared_total.saturating_add(file.size());
            if declared_total > self.config.max_total_bytes {
                return Err(invalid_archive(
                    zip_path,
                    format!(
                        "uncompressed size exceeds the limit of {} bytes",
                        self.config.max_total_bytes
                    ),
                ));
            }

            if relative.is_root() {
                continue;
            }
            plan.push(PlannedEntry {
                index,
                relative,
                is_dir: file.is_dir(),
            });
        }
        Ok(plan)
    }

    /// Checks every planned entry against what `base` already holds
    ///
    /// Runs before the first write, so a collision the policy refuses leaves
    /// the tree untouched.
    fn preflight(
        &self,
        root: &TenantRoot,
        base: &CanonicalPath,
        zip_path: &CanonicalPath,
        plan: &[PlannedEntry],
    ) -> Result<()> {
        for entry in plan {
            let target = base.join_path(entry.relative.as_str())?;

            let mut ancestor = base.clone();
            for segment in entry.relative.parent().unwrap_or_default().segments() {
                ancestor = ancestor.join(segment)?;
                if let Some(existing) = self.tree.get(root, &ancestor)? {
                    if !existing.is_folder() {
                        return Err(FolioError::Conflict(format!(
                            "entry {} needs {} to be a folder",
                            entry.relative, ancestor
                        )));
                    }
                }
            }

            if entry.is_dir {
                if let Some(existing) = self.tree.get(root, &target)? {
                    if !existing.is_folder() {
                        return Err(FolioError::Conflict(format!(
                            "folder entry {} collides with a file",
                            target
                        )));
                    }
                }
                continue;
            }

            if target == *zip_path {
                return Err(FolioError::Conflict(format!(
                    "entry {} would overwrite the archive itself",
                    entry.relative
                )));
            }
            match self.tree.get(root, &target)? {
                Some(existing) if existing.is_folder() => {
                    return Err(FolioError::Conflict(format!(
                        "file entry {} collides with a folder",
                        target
                    )))
                }
                Some(_) if self.config.file_collision == FileCollisionPolicy::Fail => {
                    return Err(FolioError::AlreadyExists(target.to_string()))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Reads one entry, refusing to inflate more than `budget` bytes
fn read_entry(
    archive: &mut ZipArchive<ResourceReader>,
    index: usize,
    budget: u64,
    zip_path: &CanonicalPath,
) -> Result<Vec<u8>> {
    let file = archive
        .by_index(index)
        .map_err(|e| invalid_archive(zip_path, e))?;

    let mut data = Vec::new();
    file.take(budget.saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|e| invalid_archive(zip_path, e))?;

    if data.len() as u64 > budget {
        return Err(invalid_archive(zip_path, "entry inflates past the size limit"));
    }
    Ok(data)
}

/// Name of the folder created for an archive: its name minus the last extension
fn archive_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn invalid_archive(path: &CanonicalPath, reason: impl Display) -> FolioError {
    FolioError::InvalidArchive(format!("{}: {}", path, reason))
}
