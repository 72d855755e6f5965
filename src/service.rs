//! Public façade over the tree, archive and crawler components
//!
//! Every operation takes the tenant root explicitly and a logical path that
//! is resolved (and confined) before anything touches the tree. Paths may be
//! written with or without a leading `/`; both address the tenant root.

use crate::archive::{export_folder, ArchiveExtractor, ExtractionReport};
use crate::config::{self, Config};
use crate::crawler::{CrawlHandle, WebCrawler};
use crate::path::{resolve, CanonicalPath, TenantRoot};
use crate::storage::{open_storage, Storage};
use crate::tree::{Resource, ResourceReader, ResourceTree, ResourceWriter};
use crate::Result;
use std::sync::Arc;

/// The virtual-folder service
#[derive(Clone)]
pub struct ResourceService {
    tree: Arc<ResourceTree>,
    crawler: WebCrawler,
    config: Arc<Config>,
}

impl ResourceService {
    /// Opens the backend named by the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(ResourceService)` - Ready to serve every tenant in the backend
    /// * `Err(FolioError)` - Invalid configuration, or the backend failed to open
    pub fn from_config(config: Config) -> Result<Self> {
        config::validate(&config)?;
        let storage = open_storage(&config.storage)?;
        Self::new(storage, config)
    }

    /// Builds the service over an already opened backend
    pub fn new(storage: Arc<dyn Storage>, config: Config) -> Result<Self> {
        config::validate(&config)?;
        let tree = Arc::new(ResourceTree::new(storage));
        let crawler = WebCrawler::new(Arc::clone(&tree), &config.crawler, &config.user_agent)?;
        Ok(Self {
            tree,
            crawler,
            config: Arc::new(config),
        })
    }

    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves a logical path from the tenant root
    pub fn resolve(&self, root: &TenantRoot, path: &str) -> Result<CanonicalPath> {
        Ok(resolve(root, &CanonicalPath::root(), path)?)
    }

    /// Looks up a resource; `None` when nothing is there
    pub fn get_resource(&self, root: &TenantRoot, path: &str) -> Result<Option<Resource>> {
        let path = self.resolve(root, path)?;
        self.tree.get(root, &path)
    }

    /// Lists a folder's children, sorted by name
    pub fn get_resources(&self, root: &TenantRoot, folder: &str) -> Result<Vec<Resource>> {
        let folder = self.resolve(root, folder)?;
        self.tree.list(root, &folder)
    }

    /// Lists the whole tree of a tenant, sorted by path
    pub fn get_all_resources(&self, root: &TenantRoot) -> Result<Vec<Resource>> {
        self.tree.list_all(root)
    }

    /// Creates one folder under an existing parent
    pub fn add_folder(&self, root: &TenantRoot, parent: &str, name: &str) -> Result<Resource> {
        let parent = self.resolve(root, parent)?;
        self.tree.add_folder(root, &parent, name)
    }

    /// Removes a resource, recursively for folders
    pub fn remove_resource(&self, root: &TenantRoot, path: &str) -> Result<()> {
        let path = self.resolve(root, path)?;
        self.tree.remove(root, &path)
    }

    /// Copies a resource; folders merge into an existing destination folder
    pub fn copy_resource(
        &self,
        root: &TenantRoot,
        source: &str,
        destination: &str,
    ) -> Result<Resource> {
        let source = self.resolve(root, source)?;
        let destination = self.resolve(root, destination)?;
        self.tree.copy(root, &source, &destination)
    }

    /// Opens a file for reading
    pub fn open_input_stream(&self, root: &TenantRoot, path: &str) -> Result<ResourceReader> {
        let path = self.resolve(root, path)?;
        self.tree.open_read(root, &path)
    }

    /// Opens a file for writing, creating it if needed
    ///
    /// Nothing is stored until [`ResourceWriter::finish`] is called.
    pub fn open_output_stream(&self, root: &TenantRoot, path: &str) -> Result<ResourceWriter<'_>> {
        let path = self.resolve(root, path)?;
        self.tree.open_write(root, &path)
    }

    /// Extracts a zip archive stored in the tree
    ///
    /// # Arguments
    ///
    /// * `root` - Tenant owning the archive
    /// * `zip` - Path of the archive file
    /// * `create_folder` - Extract into a new folder named after the archive
    ///   instead of merging into the archive's folder
    /// * `remove_zip` - Remove the archive once every entry is written
    pub fn extract_zip(
        &self,
        root: &TenantRoot,
        zip: &str,
        create_folder: bool,
        remove_zip: bool,
    ) -> Result<ExtractionReport> {
        let zip = self.resolve(root, zip)?;
        ArchiveExtractor::new(&self.tree, &self.config.archive).extract(
            root,
            &zip,
            create_folder,
            remove_zip,
        )
    }

    /// Packs a folder's subtree into zip bytes
    pub fn export_zip(&self, root: &TenantRoot, folder: &str) -> Result<Vec<u8>> {
        let folder = self.resolve(root, folder)?;
        export_folder(&self.tree, root, &folder)
    }

    /// Starts ingesting a web page into a folder
    ///
    /// Must be called from within a Tokio runtime. Remote failures never
    /// surface here; they arrive through the returned handle.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlHandle)` - The job is running
    /// * `Err(FolioError::NotFound)` - `parent` is not an existing folder
    /// * `Err(FolioError::NoRuntime)` - Called outside a Tokio runtime
    pub fn crawl_web_page(
        &self,
        root: &TenantRoot,
        parent: &str,
        page_url: &str,
        follow_links: bool,
    ) -> Result<CrawlHandle> {
        let parent = self.resolve(root, parent)?;
        self.crawler.crawl(root, &parent, page_url, follow_links)
    }
}
