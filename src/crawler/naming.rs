//! Local names for crawled URLs
//!
//! Same-site URLs keep their path layout under the crawl's parent folder;
//! cross-site URLs go under `<external>/<host>/`. Every name is reduced to
//! `[A-Za-z0-9._-]`, and a query string becomes a short hash suffix so that
//! `a.png?v=1` and `a.png?v=2` stay apart.

use crate::path::CanonicalPath;
use crate::url::SiteScope;
use crate::PathError;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use url::Url;

/// Longest segment a local name keeps, in bytes
const MAX_SEGMENT_LEN: usize = 120;

/// Upper bound on `-N` suffixes tried for one URL
const MAX_COLLISION_SUFFIX: usize = 10_000;

/// Whether a URL is stored as a page or as an embedded resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalKind {
    Page,
    Resource,
}

/// Assigns collision-free tree paths to URLs within one crawl job
#[derive(Debug)]
pub(crate) struct LocalNamer {
    base: CanonicalPath,
    scope: SiteScope,
    external_folder: String,
    files: HashSet<CanonicalPath>,
    folders: HashSet<CanonicalPath>,
}

impl LocalNamer {
    /// Names paths beneath `base`, the folder the crawl writes into
    pub(crate) fn new(base: CanonicalPath, scope: SiteScope, external_folder: &str) -> Self {
        Self {
            base,
            scope,
            external_folder: external_folder.to_string(),
            files: HashSet::new(),
            folders: HashSet::new(),
        }
    }

    /// Claims a file path for `url`
    ///
    /// Callers ask once per URL. A path that is already taken by another file,
    /// or that would have to be both a file and a folder, gets a `-2`, `-3`...
    /// suffix on the first conflicting segment.
    pub(crate) fn assign(&mut self, url: &Url, kind: LocalKind) -> Result<CanonicalPath, PathError> {
        let segments = self.candidate_segments(url, kind);
        let Some(conflict) = self.conflict_index(&segments)? else {
            return self.claim(&segments);
        };

        for n in 2..=MAX_COLLISION_SUFFIX {
            let mut attempt = segments.clone();
            attempt[conflict] = with_suffix(&segments[conflict], n);
            if self.conflict_index(&attempt)?.is_none() {
                return self.claim(&attempt);
            }
        }

        Err(PathError::Malformed(
            url.to_string(),
            "no free local name for this URL",
        ))
    }

    /// Index of the first segment that clashes with an earlier claim
    ///
    /// Intermediate segments clash with claimed files, the last one with
    /// claimed files and folders alike.
    fn conflict_index(&self, segments: &[String]) -> Result<Option<usize>, PathError> {
        let mut prefix = self.base.clone();
        for (idx, segment) in segments.iter().enumerate() {
            prefix = prefix.join(segment)?;
            let clash = if idx + 1 == segments.len() {
                self.files.contains(&prefix) || self.folders.contains(&prefix)
            } else {
                self.files.contains(&prefix)
            };
            if clash {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    fn claim(&mut self, segments: &[String]) -> Result<CanonicalPath, PathError> {
        let (last, folders) = segments
            .split_last()
            .ok_or_else(|| PathError::InvalidName(String::new()))?;
        let mut folder = self.base.clone();
        for segment in folders {
            folder = folder.join(segment)?;
            self.folders.insert(folder.clone());
        }
        let path = folder.join(last)?;
        self.files.insert(path.clone());
        Ok(path)
    }

    /// Relative segments before collision handling
    fn candidate_segments(&self, url: &Url, kind: LocalKind) -> Vec<String> {
        let mut segments: Vec<String> = Vec::new();

        if !self.scope.contains(url) {
            segments.push(self.external_folder.clone());
            let host = url.host_str().unwrap_or("unknown");
            segments.push(match url.port() {
                Some(port) => sanitize_segment(&format!("{}-{}", host, port)),
                None => sanitize_segment(host),
            });
        }

        let raw: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let directory_like = raw.is_empty() || url.path().ends_with('/');
        segments.extend(raw.iter().map(|s| sanitize_segment(s)));

        match kind {
            LocalKind::Page if directory_like => segments.push("index.html".to_string()),
            LocalKind::Page => {
                let last = segments.len() - 1;
                match extension(&segments[last]) {
                    Some(ext) if ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm") => {}
                    Some(_) => segments[last].push_str(".html"),
                    None => segments.push("index.html".to_string()),
                }
            }
            LocalKind::Resource if directory_like => segments.push("index".to_string()),
            LocalKind::Resource => {}
        }

        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            let last = segments.len() - 1;
            segments[last] = with_tag(&segments[last], &query_tag(query));
        }

        segments
    }
}

/// Reduces a URL path segment to characters every tree accepts
fn sanitize_segment(segment: &str) -> String {
    let mut cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.len() > MAX_SEGMENT_LEN {
        cleaned.truncate(MAX_SEGMENT_LEN);
    }
    if cleaned.chars().all(|c| c == '.') {
        cleaned = cleaned.replace('.', "_");
    }
    if cleaned.is_empty() {
        cleaned.push('_');
    }
    cleaned
}

/// Extension of a file name, ignoring a leading dot
fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]).filter(|ext| !ext.is_empty()),
    }
}

/// Inserts `-tag` before the extension
fn with_tag(name: &str, tag: &str) -> String {
    match extension(name) {
        Some(ext) => {
            let stem = &name[..name.len() - ext.len() - 1];
            format!("{}-{}.{}", stem, tag, ext)
        }
        None => format!("{}-{}", name, tag),
    }
}

fn with_suffix(name: &str, n: usize) -> String {
    with_tag(name, &n.to_string())
}

/// Short, stable tag for a query string
fn query_tag(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    hex::encode(&digest[..4])
}

/// Reference from the page stored at `from` to the file stored at `to`
///
/// Both paths are tree paths; the result is relative to the folder holding
/// `from`, so the stored pages keep working wherever the folder is exported.
pub(crate) fn relative_href(from: &CanonicalPath, to: &CanonicalPath, fragment: Option<&str>) -> String {
    let from_segments: Vec<&str> = from.segments().collect();
    let from_dir = &from_segments[..from_segments.len().saturating_sub(1)];
    let to_segments: Vec<&str> = to.segments().collect();

    let common = from_dir
        .iter()
        .zip(to_segments.iter())
        .take(to_segments.len().saturating_sub(1))
        .take_while(|(a, b)| a == b)
        .count();

    let mut href = "../".repeat(from_dir.len() - common);
    href.push_str(&to_segments[common..].join("/"));

    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        href.push('#');
        href.push_str(fragment);
    }
    href
}
