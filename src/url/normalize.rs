use crate::UrlError;
use url::Url;

/// Query parameters that never change the resource being served
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Parses and normalizes a URL string into its visit key
///
/// See [`normalize`] for the rules.
///
/// # Examples
///
/// ```
/// use folio::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/a/../logo.png?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/logo.png");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize(url)
}

/// Normalizes a parsed URL into the key a crawl job deduplicates on
///
/// # Normalization Steps
///
/// 1. Reject anything but `http` and `https`, and URLs without a host
/// 2. Host lowercasing, default-port removal and dot-segment removal are
///    already done by the parser
/// 3. Remove the fragment
/// 4. Remove tracking query parameters
/// 5. Sort remaining query parameters by key
/// 6. Remove an empty query string
///
/// The scheme, `www.` prefix and trailing slash are kept: each of them can
/// select a different resource, or change how relative references resolve.
///
/// # Arguments
///
/// * `url` - The URL to normalize
///
/// # Returns
///
/// * `Ok(Url)` - The visit key, which is also the URL that gets fetched
/// * `Err(UrlError)` - Unsupported scheme or missing host
pub fn normalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Stable sort keeps repeated keys in document order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
