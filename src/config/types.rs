use serde::Deserialize;

/// Main configuration structure for Folio
///
/// Every section is optional in the TOML file; missing sections and keys
/// take the values of [`Config::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Which backend holds the resource trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, process-local trees
    #[default]
    Memory,
    /// SQLite database file
    Sqlite,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Path to the SQLite database file, used by the sqlite backend
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: "./folio.db".to_string(),
        }
    }
}

/// Web page ingestion configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of HTTP requests in flight per crawl job
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: usize,

    /// Maximum number of pages processed at once per crawl job
    #[serde(rename = "max-concurrent-pages")]
    pub max_concurrent_pages: usize,

    /// Maximum number of pages fetched per crawl job, seed included
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Retries for server errors and timeouts
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Delay between retries (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Refuse plain-HTTP URLs
    #[serde(rename = "https-only")]
    pub https_only: bool,

    /// Treat subdomains of the seed host as the same site
    #[serde(rename = "include-subdomains")]
    pub include_subdomains: bool,

    /// Folder (under the crawl's parent) that receives cross-site resources
    #[serde(rename = "external-folder")]
    pub external_folder: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            max_concurrent_pages: 4,
            max_pages: 200,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 2,
            retry_delay_ms: 500,
            https_only: false,
            include_subdomains: false,
            external_folder: "_external".to_string(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Folio".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

/// What extraction does when a file entry lands on an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCollisionPolicy {
    /// Replace the existing file's content
    #[default]
    Overwrite,
    /// Stop extraction with `AlreadyExists`
    Fail,
}

/// Archive extraction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    #[serde(rename = "file-collision")]
    pub file_collision: FileCollisionPolicy,

    /// Maximum number of entries in one archive
    #[serde(rename = "max-entries")]
    pub max_entries: usize,

    /// Maximum sum of uncompressed entry sizes (bytes)
    #[serde(rename = "max-total-bytes")]
    pub max_total_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            file_collision: FileCollisionPolicy::default(),
            max_entries: 10_000,
            max_total_bytes: 512 * 1024 * 1024,
        }
    }
}
