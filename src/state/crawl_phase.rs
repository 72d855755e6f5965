/// Phase definitions for tracking page processing within a crawl job
///
/// Every page a job touches moves through
/// `Pending -> Fetching -> Parsing -> Downloading -> (Enqueuing) -> Done | Failed`.
use std::fmt;
use thiserror::Error;

/// Represents how far a page has progressed through a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Page is known to the job but not yet requested
    Pending,

    /// Page request is in flight
    Fetching,

    /// Page body is being scanned for references
    Parsing,

    /// Embedded resources are being downloaded
    Downloading,

    /// Same-site links are being pushed onto the frontier
    Enqueuing,

    // ===== Terminal Phases =====
    /// Page (possibly rewritten) was written to the tree
    Done,

    /// Page could not be fetched or stored
    Failed,
}

/// A phase change the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid crawl phase transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: CrawlPhase,
    pub to: CrawlPhase,
}

impl CrawlPhase {
    /// Returns true if this is a terminal phase (no further processing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    ///
    /// Any active phase may fail. Non-HTML pages skip straight from
    /// `Fetching` to `Done`, and pages without link following skip
    /// `Enqueuing`.
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Fetching)
            | (Fetching, Parsing)
            | (Fetching, Done)
            | (Parsing, Downloading)
            | (Downloading, Enqueuing)
            | (Downloading, Done)
            | (Enqueuing, Done) => true,
            _ => false,
        }
    }

    /// Short lowercase name, used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Downloading => "downloading",
            Self::Enqueuing => "enqueuing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The phase of one page, with validated transitions
#[derive(Debug, Clone)]
pub struct PageProgress {
    url: String,
    phase: CrawlPhase,
}

impl PageProgress {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            phase: CrawlPhase::Pending,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Moves to `next`, leaving the phase unchanged if the move is invalid
    pub fn advance(&mut self, next: CrawlPhase) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!("{}: {} -> {}", self.url, self.phase, next);
        self.phase = next;
        Ok(())
    }
}
