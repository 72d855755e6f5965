//! Crawler module for ingesting web pages into a tree
//!
//! This module contains the web ingestion logic, including:
//! - HTTP fetching with retry logic
//! - HTML parsing, reference extraction and rewriting
//! - Local naming of remote resources
//! - Crawl job coordination and its completion handle
//!
//! A crawl runs as a background task on the current Tokio runtime. The call
//! that starts it only validates where the pages go; everything that can go
//! wrong remotely is reported through the returned [`CrawlHandle`].

mod coordinator;
mod fetcher;
mod handle;
mod naming;
mod parser;

pub use fetcher::{build_http_client, fetch_url, Fetched, RetryPolicy};
pub use handle::{CrawlHandle, CrawlOutcome, CrawlReport, ResourceFailure};
pub use parser::{parse_html, rewrite_references, ParsedPage, Reference};

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::path::{CanonicalPath, TenantRoot};
use crate::tree::ResourceTree;
use crate::url::{normalize_url, SiteScope};
use crate::{FetchError, FolioError, Result};
use coordinator::{CrawlJob, JobTarget};
use reqwest::Client;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Starts crawl jobs against one resource tree
#[derive(Clone)]
pub struct WebCrawler {
    tree: Arc<ResourceTree>,
    client: Client,
    config: CrawlerConfig,
}

impl WebCrawler {
    /// Builds a crawler with its own HTTP client
    ///
    /// # Returns
    ///
    /// * `Ok(WebCrawler)` - Ready to start jobs
    /// * `Err(FolioError)` - The HTTP client could not be built
    pub fn new(
        tree: Arc<ResourceTree>,
        config: &CrawlerConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self> {
        let client = build_http_client(config, user_agent)
            .map_err(|e| FolioError::Io(std::io::Error::other(e)))?;
        Ok(Self {
            tree,
            client,
            config: config.clone(),
        })
    }

    /// Starts ingesting `page_url` into the folder `parent`
    ///
    /// The seed page and its embedded resources are downloaded, references
    /// are rewritten to the local copies, and with `follow_links` the
    /// same-site pages it links to are ingested the same way.
    ///
    /// # Arguments
    ///
    /// * `root` - The tenant whose tree receives the pages
    /// * `parent` - Existing folder the crawl writes into
    /// * `page_url` - The seed URL
    /// * `follow_links` - Also ingest linked same-site pages
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlHandle)` - The job is running; an unusable URL is reported
    ///   through the handle as a failed outcome
    /// * `Err(FolioError)` - `parent` is not a folder, or no Tokio runtime
    ///   is available to run the job
    pub fn crawl(
        &self,
        root: &TenantRoot,
        parent: &CanonicalPath,
        page_url: &str,
        follow_links: bool,
    ) -> Result<CrawlHandle> {
        match self.tree.get(root, parent)? {
            Some(resource) if resource.is_folder() => {}
            _ => return Err(FolioError::NotFound(parent.to_string())),
        }

        let runtime = Handle::try_current().map_err(|_| FolioError::NoRuntime)?;
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let handle = CrawlHandle::new(page_url.to_string(), rx, token.clone());

        let seed = match normalize_url(page_url).and_then(|url| {
            let scope = SiteScope::from_seed(&url, self.config.include_subdomains)?;
            Ok((url, scope))
        }) {
            Ok(seed) => seed,
            Err(e) => {
                tracing::warn!("Refusing to crawl {}: {}", page_url, e);
                let _ = tx.send(CrawlOutcome::Failed {
                    seed: page_url.to_string(),
                    error: FetchError::InvalidUrl {
                        url: page_url.to_string(),
                        reason: e.to_string(),
                    },
                });
                return Ok(handle);
            }
        };
        let (seed_url, scope) = seed;

        let job = Arc::new(CrawlJob::new(
            Arc::clone(&self.tree),
            self.client.clone(),
            &self.config,
            JobTarget {
                root: root.clone(),
                base: parent.clone(),
                scope,
                follow_links,
            },
            token,
        ));

        let requested = page_url.to_string();
        runtime.spawn(async move {
            let outcome = job.run(seed_url, requested).await;
            // The caller may have dropped the handle
            let _ = tx.send(outcome);
        });

        Ok(handle)
    }
}
