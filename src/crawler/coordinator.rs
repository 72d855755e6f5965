//! Crawl job coordination
//!
//! One [`CrawlJob`] owns everything a crawl shares between its page tasks:
//! the visit map (every URL is fetched at most once), the frontier of pages
//! still to process, the local namer and the running report. The map is
//! behind a plain mutex that is never held across an await point; resource
//! downloads are coalesced through a per-URL `OnceCell`, so a resource
//! referenced by many pages is fetched by exactly one of them while the
//! others wait for its outcome.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{fetch_url, Fetched, RetryPolicy};
use crate::crawler::handle::{CrawlOutcome, CrawlReport, ResourceFailure};
use crate::crawler::naming::{relative_href, LocalKind, LocalNamer};
use crate::crawler::parser::{parse_html, rewrite_references, Reference};
use crate::path::{CanonicalPath, TenantRoot};
use crate::state::{CrawlPhase, PageProgress};
use crate::tree::ResourceTree;
use crate::url::{normalize, SiteScope};
use crate::{FetchError, PathError};
use futures::future::join_all;
use reqwest::Client;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Where a crawl writes and what it follows
#[derive(Debug, Clone)]
pub(crate) struct JobTarget {
    pub root: TenantRoot,
    pub base: CanonicalPath,
    pub scope: SiteScope,
    pub follow_links: bool,
}

/// A page waiting in the frontier
#[derive(Debug, Clone)]
struct PageTask {
    url: Url,
    path: CanonicalPath,
}

#[derive(Debug)]
struct PageSlot {
    path: CanonicalPath,
    written: bool,
}

#[derive(Debug)]
struct ResourceSlot {
    path: CanonicalPath,
    stored: OnceCell<bool>,
}

/// What a visit key is known as
#[derive(Debug)]
enum Visit {
    Page(PageSlot),
    Resource(Arc<ResourceSlot>),
}

/// A local reference from a written page to another page
///
/// Kept so the reference can be turned back into the absolute URL if the
/// target page never gets written.
#[derive(Debug)]
struct Referral {
    target: Url,
    page: CanonicalPath,
    local: String,
    absolute: String,
}

#[derive(Debug)]
struct JobState {
    namer: LocalNamer,
    visits: HashMap<Url, Visit>,
    frontier: VecDeque<PageTask>,
    pages_scheduled: usize,
    referrals: Vec<Referral>,
    pages_written: Vec<CanonicalPath>,
    resources_written: Vec<CanonicalPath>,
    failures: Vec<ResourceFailure>,
}

/// Shared state of one running crawl
pub(crate) struct CrawlJob {
    tree: Arc<ResourceTree>,
    client: Client,
    retry: RetryPolicy,
    target: JobTarget,
    max_pages: usize,
    max_concurrent_pages: usize,
    fetch_permits: Semaphore,
    cancel: CancellationToken,
    state: Mutex<JobState>,
}

impl CrawlJob {
    pub(crate) fn new(
        tree: Arc<ResourceTree>,
        client: Client,
        config: &CrawlerConfig,
        target: JobTarget,
        cancel: CancellationToken,
    ) -> Self {
        let namer = LocalNamer::new(target.base.clone(), target.scope.clone(), &config.external_folder);
        Self {
            tree,
            client,
            retry: RetryPolicy::from(config),
            target,
            max_pages: config.max_pages,
            max_concurrent_pages: config.max_concurrent_pages,
            fetch_permits: Semaphore::new(config.max_concurrent_fetches),
            cancel,
            state: Mutex::new(JobState {
                namer,
                visits: HashMap::new(),
                frontier: VecDeque::new(),
                pages_scheduled: 0,
                referrals: Vec::new(),
                pages_written: Vec::new(),
                resources_written: Vec::new(),
                failures: Vec::new(),
            }),
        }
    }

    /// Runs the job until the frontier is drained or the job is cancelled
    ///
    /// # Arguments
    ///
    /// * `seed` - The normalized seed URL
    /// * `requested` - The seed as the caller wrote it, echoed in the outcome
    pub(crate) async fn run(self: Arc<Self>, seed: Url, requested: String) -> CrawlOutcome {
        tracing::info!(
            "Starting crawl of {} into {} (tenant {})",
            seed,
            self.target.base,
            self.target.root
        );

        let seed_task = match self.schedule_seed(&seed) {
            Ok(task) => task,
            Err(e) => {
                return CrawlOutcome::Failed {
                    seed: requested,
                    error: FetchError::Store {
                        url: seed.to_string(),
                        message: e.to_string(),
                    },
                }
            }
        };

        if self.cancel.is_cancelled() {
            tracing::info!("Crawl of {} cancelled before it started", seed);
            return CrawlOutcome::Done(self.finish(requested, true));
        }

        if let Err(error) = Arc::clone(&self).process_page(seed_task, true).await {
            tracing::warn!("Seed page {} failed: {}", seed, error);
            return CrawlOutcome::Failed {
                seed: requested,
                error,
            };
        }

        let mut tasks = JoinSet::new();
        loop {
            while tasks.len() < self.max_concurrent_pages && !self.cancel.is_cancelled() {
                let Some(task) = self.lock().frontier.pop_front() else {
                    break;
                };
                let job = Arc::clone(&self);
                tasks.spawn(async move {
                    // Only the seed reports its fetch failure to the caller
                    let _ = job.process_page(task, false).await;
                });
            }

            match tasks.join_next().await {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::error!("Page task of {} failed: {}", seed, e),
                None => break,
            }
        }

        let cancelled = self.cancel.is_cancelled() && !self.lock().frontier.is_empty();
        self.repair_broken_links();

        let report = self.finish(requested, cancelled);
        tracing::info!(
            "Crawl of {} finished: {} pages, {} resources, {} failures{}",
            seed,
            report.pages_written.len(),
            report.resources_written.len(),
            report.failures.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        CrawlOutcome::Done(report)
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_seed(&self, seed: &Url) -> Result<PageTask, PathError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let path = state.namer.assign(seed, LocalKind::Page)?;
        state.visits.insert(
            seed.clone(),
            Visit::Page(PageSlot {
                path: path.clone(),
                written: false,
            }),
        );
        state.pages_scheduled = 1;
        Ok(PageTask {
            url: seed.clone(),
            path,
        })
    }

    /// Fetches, rewrites and stores one page
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The page was handled; its own failures are in the report
    /// * `Err(FetchError)` - The seed page could not be fetched
    async fn process_page(self: Arc<Self>, task: PageTask, is_seed: bool) -> Result<(), FetchError> {
        let mut progress = PageProgress::new(task.url.as_str());
        step(&mut progress, CrawlPhase::Fetching);

        let fetched = match self.fetch(&task.url).await {
            Ok(fetched) => fetched,
            Err(error) => {
                step(&mut progress, CrawlPhase::Failed);
                if is_seed {
                    return Err(error);
                }
                self.record_failure(error);
                return Ok(());
            }
        };

        if !fetched.is_html() {
            tracing::debug!("Storing non-HTML page {} verbatim", task.url);
            let stored = self.store_page(&task, &fetched.body);
            step(&mut progress, if stored { CrawlPhase::Done } else { CrawlPhase::Failed });
            return Ok(());
        }

        step(&mut progress, CrawlPhase::Parsing);
        let html = String::from_utf8_lossy(&fetched.body).into_owned();
        let parsed = parse_html(&html, &fetched.url);
        tracing::debug!(
            "{}: {} resources, {} links",
            task.url,
            parsed.resources.len(),
            parsed.links.len()
        );

        step(&mut progress, CrawlPhase::Downloading);
        let mut replacements = HashMap::new();
        self.download_resources(&task, parsed.resources, &mut replacements)
            .await;

        if self.target.follow_links {
            step(&mut progress, CrawlPhase::Enqueuing);
        }
        self.resolve_links(&task, &parsed.links, &mut replacements);

        let rewritten = rewrite_references(&html, &replacements);
        let stored = self.store_page(&task, rewritten.as_bytes());
        step(&mut progress, if stored { CrawlPhase::Done } else { CrawlPhase::Failed });
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<Fetched, FetchError> {
        let _permit = self
            .fetch_permits
            .acquire()
            .await
            .map_err(|_| FetchError::Aborted {
                url: url.to_string(),
            })?;
        fetch_url(&self.client, url, self.retry).await
    }

    /// Downloads a page's resources concurrently and maps their references
    ///
    /// Resources that were stored map to a relative reference; resources
    /// that failed keep pointing at their absolute URL.
    async fn download_resources(
        &self,
        page: &PageTask,
        resources: Vec<Reference>,
        replacements: &mut HashMap<String, String>,
    ) {
        let mut pending = Vec::new();

        for reference in resources {
            if replacements.contains_key(&reference.raw) {
                continue;
            }
            let Ok(key) = normalize(reference.url.clone()) else {
                continue;
            };

            match self.claim_resource(&key) {
                Ok(Visit::Page(slot)) => {
                    let local = relative_href(&page.path, &slot.path, reference.url.fragment());
                    self.refer(page, key, &local, &reference.url);
                    replacements.insert(reference.raw, local);
                }
                Ok(Visit::Resource(slot)) => pending.push((reference, key, slot)),
                Err(e) => {
                    self.record_failure(FetchError::Store {
                        url: key.to_string(),
                        message: e.to_string(),
                    });
                    replacements.insert(reference.raw, reference.url.to_string());
                }
            }
        }

        let outcomes = join_all(
            pending
                .iter()
                .map(|(_, key, slot)| self.download(key, slot)),
        )
        .await;

        for ((reference, _, slot), stored) in pending.into_iter().zip(outcomes) {
            let value = if stored {
                relative_href(&page.path, &slot.path, reference.url.fragment())
            } else {
                reference.url.to_string()
            };
            replacements.insert(reference.raw, value);
        }
    }

    /// Looks up or registers a resource; a URL already known as a page
    /// answers with a detached copy of its page slot
    fn claim_resource(&self, key: &Url) -> Result<Visit, PathError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        match state.visits.get(key) {
            Some(Visit::Page(slot)) => {
                return Ok(Visit::Page(PageSlot {
                    path: slot.path.clone(),
                    written: slot.written,
                }))
            }
            Some(Visit::Resource(slot)) => return Ok(Visit::Resource(Arc::clone(slot))),
            None => {}
        }

        let path = state.namer.assign(key, LocalKind::Resource)?;
        let slot = Arc::new(ResourceSlot {
            path,
            stored: OnceCell::new(),
        });
        state
            .visits
            .insert(key.clone(), Visit::Resource(Arc::clone(&slot)));
        Ok(Visit::Resource(slot))
    }

    /// Fetches and stores a resource once, however many pages ask for it
    async fn download(&self, key: &Url, slot: &ResourceSlot) -> bool {
        *slot
            .stored
            .get_or_init(|| async {
                let fetched = match self.fetch(key).await {
                    Ok(fetched) => fetched,
                    Err(error) => {
                        self.record_failure(error);
                        return false;
                    }
                };
                match self.store(&slot.path, &fetched.body) {
                    Ok(()) => {
                        tracing::debug!("Stored {} at {}", key, slot.path);
                        self.lock().resources_written.push(slot.path.clone());
                        true
                    }
                    Err(e) => {
                        self.record_failure(FetchError::Store {
                            url: key.to_string(),
                            message: e.to_string(),
                        });
                        false
                    }
                }
            })
            .await
    }

    /// Maps a page's links, enqueuing same-site pages when following links
    fn resolve_links(
        &self,
        page: &PageTask,
        links: &[Reference],
        replacements: &mut HashMap<String, String>,
    ) {
        for reference in links {
            if replacements.contains_key(&reference.raw) {
                continue;
            }
            let absolute = reference.url.to_string();
            let Ok(key) = normalize(reference.url.clone()) else {
                continue;
            };

            if !self.target.follow_links || !self.target.scope.contains(&key) {
                replacements.insert(reference.raw.clone(), absolute);
                continue;
            }

            match self.local_page(&key) {
                Some((path, is_page)) => {
                    let local = relative_href(&page.path, &path, reference.url.fragment());
                    if is_page {
                        self.refer(page, key, &local, &reference.url);
                    }
                    replacements.insert(reference.raw.clone(), local);
                }
                None => {
                    replacements.insert(reference.raw.clone(), absolute);
                }
            }
        }
    }

    /// Local path a followed link points at, scheduling the page if it is new
    ///
    /// Returns the path and whether it belongs to a page, or `None` when the
    /// link has to stay absolute (page budget spent, or a resource that was
    /// not stored).
    fn local_page(&self, key: &Url) -> Option<(CanonicalPath, bool)> {
        let mut guard = self.lock();
        let state = &mut *guard;

        match state.visits.get(key) {
            Some(Visit::Page(slot)) => return Some((slot.path.clone(), true)),
            Some(Visit::Resource(slot)) => {
                return (slot.stored.get() == Some(&true)).then(|| (slot.path.clone(), false))
            }
            None => {}
        }

        if state.pages_scheduled >= self.max_pages {
            tracing::debug!("Page budget spent, leaving {} absolute", key);
            return None;
        }

        let path = match state.namer.assign(key, LocalKind::Page) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("No local name for {}: {}", key, e);
                return None;
            }
        };
        state.visits.insert(
            key.clone(),
            Visit::Page(PageSlot {
                path: path.clone(),
                written: false,
            }),
        );
        state.frontier.push_back(PageTask {
            url: key.clone(),
            path: path.clone(),
        });
        state.pages_scheduled += 1;
        Some((path, true))
    }

    fn refer(&self, page: &PageTask, target: Url, local: &str, absolute: &Url) {
        self.lock().referrals.push(Referral {
            target,
            page: page.path.clone(),
            local: local.to_string(),
            absolute: absolute.to_string(),
        });
    }

    /// Writes a page and marks its visit as written
    fn store_page(&self, task: &PageTask, body: &[u8]) -> bool {
        match self.store(&task.path, body) {
            Ok(()) => {
                tracing::debug!("Stored page {} at {}", task.url, task.path);
                let mut state = self.lock();
                if let Some(Visit::Page(slot)) = state.visits.get_mut(&task.url) {
                    slot.written = true;
                }
                state.pages_written.push(task.path.clone());
                true
            }
            Err(e) => {
                self.record_failure(FetchError::Store {
                    url: task.url.to_string(),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    fn store(&self, path: &CanonicalPath, body: &[u8]) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            self.tree.ensure_folders(&self.target.root, &parent)?;
        }
        self.tree.write_bytes(&self.target.root, path, body)?;
        Ok(())
    }

    fn record_failure(&self, error: FetchError) {
        tracing::warn!("{}", error);
        self.lock().failures.push(ResourceFailure {
            url: error.url().to_string(),
            error,
        });
    }

    /// Points local links to pages that were never written back at the web
    fn repair_broken_links(&self) {
        let fixes: HashMap<CanonicalPath, HashMap<String, String>> = {
            let state = self.lock();
            let written: HashSet<&CanonicalPath> = state.pages_written.iter().collect();
            let mut fixes: HashMap<CanonicalPath, HashMap<String, String>> = HashMap::new();

            for referral in &state.referrals {
                let target_written = matches!(
                    state.visits.get(&referral.target),
                    Some(Visit::Page(slot)) if slot.written
                );
                if !target_written && written.contains(&referral.page) {
                    fixes
                        .entry(referral.page.clone())
                        .or_default()
                        .insert(referral.local.clone(), referral.absolute.clone());
                }
            }
            fixes
        };

        for (page, replacements) in fixes {
            tracing::debug!("Repairing {} broken links in {}", replacements.len(), page);
            let result = self
                .tree
                .read_bytes(&self.target.root, &page)
                .and_then(|bytes| {
                    let html = String::from_utf8_lossy(&bytes);
                    let repaired = rewrite_references(&html, &replacements);
                    self.tree
                        .write_bytes(&self.target.root, &page, repaired.as_bytes())
                });
            if let Err(e) = result {
                tracing::warn!("Could not repair links in {}: {}", page, e);
            }
        }
    }

    fn finish(&self, seed: String, cancelled: bool) -> CrawlReport {
        let mut state = self.lock();
        let mut pages_written = std::mem::take(&mut state.pages_written);
        let mut resources_written = std::mem::take(&mut state.resources_written);
        pages_written.sort();
        resources_written.sort();

        CrawlReport {
            seed,
            pages_written,
            resources_written,
            failures: std::mem::take(&mut state.failures),
            cancelled,
        }
    }
}

fn step(progress: &mut PageProgress, phase: CrawlPhase) {
    if let Err(e) = progress.advance(phase) {
        tracing::debug!("{}", e);
    }
}
