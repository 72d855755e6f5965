//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of a crawl job, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with redirects followed by the client
//! - Retry logic for transient failures
//! - Error classification

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::FetchError;
use reqwest::{header, redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Upper bound on redirect hops for one request
const MAX_REDIRECTS: usize = 10;

/// A successful response
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Final URL after redirects, used to resolve relative references
    pub url: Url,

    /// Content-Type header value, if any
    pub content_type: Option<String>,

    /// Raw response body
    pub body: Vec<u8>,
}

impl Fetched {
    /// Returns true if the body should be parsed as HTML
    ///
    /// The Content-Type decides; bodies served without one, or with a
    /// generic one, are sniffed for an HTML preamble.
    pub fn is_html(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) if ct.to_ascii_lowercase().contains("html") => true,
            Some(ct) if !is_generic_content_type(ct) => false,
            _ => sniff_html(&self.body),
        }
    }
}

fn is_generic_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/plain") || ct.starts_with("application/octet-stream")
}

fn sniff_html(body: &[u8]) -> bool {
    let start = body
        .strip_prefix(b"\xEF\xBB\xBF".as_slice())
        .unwrap_or(body);
    let start = match start.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(idx) => &start[idx..],
        None => return false,
    };
    let head = start[..start.len().min(16)].to_ascii_lowercase();
    head.starts_with(b"<!doctype html") || head.starts_with(b"<html")
}

/// How many times, and how far apart, transient failures are retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl From<&CrawlerConfig> for RetryPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `crawler` - Timeouts and the https-only switch
/// * `user_agent` - The user agent identification
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use folio::config::{CrawlerConfig, UserAgentConfig};
/// use folio::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlerConfig::default(), &UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .https_only(crawler.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL, retrying transient failures
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx | Success |
/// | HTTP 5xx | Retry up to `max_retries` times |
/// | Timeout | Retry up to `max_retries` times |
/// | Other network error | Retry up to `max_retries` times |
/// | Any other HTTP status | Immediate failure |
/// | Connection refused | Immediate failure |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `retry` - The retry policy
///
/// # Returns
///
/// * `Ok(Fetched)` - Final URL, content type and body
/// * `Err(FetchError)` - The classified failure of the last attempt
pub async fn fetch_url(client: &Client, url: &Url, retry: RetryPolicy) -> Result<Fetched, FetchError> {
    let mut attempt = 0;
    loop {
        match fetch_once(client, url).await {
            Ok(fetched) => return Ok(fetched),
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                attempt += 1;
                tracing::debug!(
                    "Retrying {} ({}/{}) after: {}",
                    url,
                    attempt,
                    retry.max_retries,
                    e
                );
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(client: &Client, url: &Url) -> Result<Fetched, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .bytes()
        .await
        .map_err(|e| classify_error(url, e))?;

    Ok(Fetched {
        url: final_url,
        content_type,
        body: body.to_vec(),
    })
}

/// Maps a client error onto the fetch error taxonomy
fn classify_error(url: &Url, error: reqwest::Error) -> FetchError {
    let url = url.to_string();
    if error.is_timeout() {
        FetchError::Timeout { url }
    } else if error.is_connect() {
        FetchError::Connect {
            url,
            message: error.to_string(),
        }
    } else if error.is_builder() {
        FetchError::InvalidUrl {
            url,
            reason: error.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::Http {
            url,
            status: status.as_u16(),
        }
    } else {
        FetchError::Network {
            url,
            message: error.to_string(),
        }
    }
}
