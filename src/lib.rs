//! Folio: per-tenant virtual folders for static assets
//!
//! This crate gives every tenant of a content-management product an isolated,
//! hierarchical tree of files and folders, decoupled from the physical storage
//! layout. On top of the tree it offers bulk ingestion of zip archives and
//! ingestion of remote web pages together with the resources they reference.

pub mod archive;
pub mod config;
pub mod crawler;
pub mod path;
pub mod service;
pub mod state;
pub mod storage;
pub mod tree;
pub mod url;

use thiserror::Error;

/// Main error type for Folio operations
#[derive(Debug, Error)]
pub enum FolioError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No async runtime available to run the crawl")]
    NoRuntime,
}

/// The error taxonomy every [`FolioError`] maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidPath,
    InvalidArchive,
    Conflict,
    Io,
    Fetch,
    Config,
}

impl FolioError {
    /// Classifies this error into the service's error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::InvalidArchive(_) => ErrorKind::InvalidArchive,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) | Self::Io(_) | Self::NoRuntime => ErrorKind::Io,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<storage::StorageError> for FolioError {
    fn from(err: storage::StorageError) -> Self {
        use storage::StorageError;
        match err {
            StorageError::NotFound(path) => Self::NotFound(path),
            StorageError::AlreadyExists(path) => Self::AlreadyExists(path),
            StorageError::NotAFile(path) => Self::Conflict(format!("{} is a folder", path)),
            other => Self::Storage(other),
        }
    }
}

/// Path confinement and naming errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path '{0}' escapes its root")]
    Escapes(String),

    #[error("malformed path '{0}': {1}")]
    Malformed(String, &'static str),

    #[error("invalid name '{0}'")]
    InvalidName(String),

    #[error("invalid tenant root '{0}'")]
    InvalidTenant(String),
}

/// Remote fetch failures
///
/// Only a failure to fetch the seed page is fatal to a crawl job; every other
/// occurrence is accumulated in the job report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("request timeout for {url}")]
    Timeout { url: String },

    #[error("connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("could not store {url}: {message}")]
    Store { url: String, message: String },

    #[error("crawl job for {url} ended before reporting")]
    Aborted { url: String },
}

impl FetchError {
    /// Returns the URL this failure concerns
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::Http { url, .. }
            | Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Network { url, .. }
            | Self::Store { url, .. }
            | Self::Aborted { url } => url,
        }
    }

    /// Returns true if retrying the request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500,
            Self::Timeout { .. } | Self::Network { .. } => true,
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Folio operations
pub type Result<T> = std::result::Result<T, FolioError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlHandle, CrawlOutcome, CrawlReport, ResourceFailure};
pub use path::{CanonicalPath, TenantRoot};
pub use service::ResourceService;
pub use tree::{Resource, ResourceKind, ResourceTree};
