use crate::UrlError;
use url::Url;

/// Extracts the lowercase host of a URL without its `www.` prefix
///
/// # Examples
///
/// ```
/// use url::Url;
/// use folio::url::extract_domain;
///
/// let url = Url::parse("https://WWW.Example.com:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| {
        let host = h.to_lowercase();
        match host.strip_prefix("www.") {
            Some(bare) if !bare.is_empty() => bare.to_string(),
            _ => host,
        }
    })
}

/// The set of URLs that count as "the same site" as a crawl's seed
///
/// Two URLs are on the same site when their domains (see [`extract_domain`])
/// and effective ports match; the scheme is ignored, so an `http` page may
/// link to its `https` twin. With subdomains included, `*.seed-domain` also
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteScope {
    domain: String,
    port: Option<u16>,
    include_subdomains: bool,
}

impl SiteScope {
    /// Builds the scope of a seed URL
    pub fn from_seed(seed: &Url, include_subdomains: bool) -> Result<Self, UrlError> {
        let domain = extract_domain(seed).ok_or(UrlError::MissingDomain)?;
        Ok(Self {
            domain,
            port: seed.port(),
            include_subdomains,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns true if `url` belongs to this site
    pub fn contains(&self, url: &Url) -> bool {
        let Some(candidate) = extract_domain(url) else {
            return false;
        };
        if url.port() != self.port {
            return false;
        }

        if self.include_subdomains {
            candidate == self.domain
                || candidate
                    .strip_suffix(self.domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        } else {
            candidate == self.domain
        }
    }
}
