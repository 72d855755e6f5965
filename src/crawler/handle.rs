//! Completion signal of a crawl job
//!
//! A job reports exactly once through a oneshot channel. The caller's
//! [`CrawlHandle`] owns the receiving end and a drop guard on the job's
//! cancellation token: dropping the handle before the job ends asks the job
//! to stop scheduling new pages, while fetches already in flight drain.

use crate::path::CanonicalPath;
use crate::FetchError;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::{CancellationToken, DropGuard};

/// A remote resource or page that could not be ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub url: String,
    pub error: FetchError,
}

/// What a finished crawl job wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// The seed URL as requested
    pub seed: String,

    /// Pages written, sorted by path
    pub pages_written: Vec<CanonicalPath>,

    /// Embedded resources written, sorted by path
    pub resources_written: Vec<CanonicalPath>,

    /// Per-resource and per-page failures, in the order they happened
    pub failures: Vec<ResourceFailure>,

    /// The job stopped early because its handle was cancelled or dropped
    pub cancelled: bool,
}

/// Final state of a crawl job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The frontier was drained; individual failures are in the report
    Done(CrawlReport),

    /// The seed page could not be fetched; nothing was written
    Failed { seed: String, error: FetchError },
}

impl CrawlOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn report(&self) -> Option<&CrawlReport> {
        match self {
            Self::Done(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }

    pub fn into_report(self) -> Option<CrawlReport> {
        match self {
            Self::Done(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}

/// Caller's side of a running crawl job
#[derive(Debug)]
pub struct CrawlHandle {
    seed: String,
    outcome: oneshot::Receiver<CrawlOutcome>,
    token: CancellationToken,
    guard: Option<DropGuard>,
}

impl CrawlHandle {
    pub(crate) fn new(
        seed: String,
        outcome: oneshot::Receiver<CrawlOutcome>,
        token: CancellationToken,
    ) -> Self {
        let guard = token.clone().drop_guard();
        Self {
            seed,
            outcome,
            token,
            guard: Some(guard),
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Asks the job to stop scheduling new pages
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Lets the job run to completion without anyone waiting for it
    pub fn detach(mut self) {
        if let Some(guard) = self.guard.take() {
            let _token = guard.disarm();
        }
    }

    /// Waits for the job's outcome
    ///
    /// A job that vanished without reporting (its task panicked or the
    /// runtime shut down) is reported as failed with [`FetchError::Aborted`].
    pub async fn wait(mut self) -> CrawlOutcome {
        match (&mut self.outcome).await {
            Ok(outcome) => outcome,
            Err(_) => self.aborted(),
        }
    }

    /// Returns the outcome if the job has already finished
    pub fn try_outcome(&mut self) -> Option<CrawlOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(self.aborted()),
        }
    }

    fn aborted(&self) -> CrawlOutcome {
        CrawlOutcome::Failed {
            seed: self.seed.clone(),
            error: FetchError::Aborted {
                url: self.seed.clone(),
            },
        }
    }
}
