//! HTML parser for extracting and rewriting references
//!
//! This module handles scanning fetched HTML for:
//! - Embedded resources to download (images, scripts, stylesheets, icons, media)
//! - Links to other pages (from `<a>` and `<area>` tags)
//!
//! and rewriting the attribute values that point at them.

use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use std::collections::HashMap;
use url::Url;

/// One URL reference found in a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The attribute value as written in the page, entities decoded
    pub raw: String,

    /// The reference resolved against the page's base URL, fragment kept
    pub url: Url,
}

/// References extracted from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Resources the page embeds
    pub resources: Vec<Reference>,

    /// Pages the page links to
    pub links: Vec<Reference>,
}

/// Resource-bearing attributes, as (selector, attribute)
const RESOURCE_ATTRIBUTES: &[(&str, &str)] = &[
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("link[href]", "href"),
    ("source[src]", "src"),
    ("video[src]", "src"),
    ("video[poster]", "poster"),
    ("audio[src]", "src"),
    ("input[type='image'][src]", "src"),
];

/// Elements whose `href` links to another page
const LINK_ELEMENTS: &[&str] = &["a", "area"];

/// Parses HTML content and extracts its references
///
/// # Extraction Rules
///
/// **Resources:**
/// - `src` of `<img>`, `<script>`, `<source>`, `<video>`, `<audio>`, `<input type="image">`
/// - `poster` of `<video>`
/// - `href` of `<link>` with a `stylesheet`, icon or `manifest` relation
///
/// **Links:**
/// - `href` of `<a>` and `<area>`, except `<a download>`
///
/// **Never extracted:**
/// - `javascript:`, `mailto:`, `tel:` and `data:` references
/// - Fragment-only references (same page anchors)
/// - Anything that is not HTTP(S) after resolution
///
/// Relative references resolve against `<base href>` when the page has one,
/// otherwise against `page_url`.
///
/// # Example
///
/// ```
/// use folio::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><body><img src="logo.png"><a href="/about">About</a></body></html>"#;
/// let page = Url::parse("https://example.com/docs/").unwrap();
/// let parsed = parse_html(html, &page);
/// assert_eq!(parsed.resources[0].url.as_str(), "https://example.com/docs/logo.png");
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/about");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base_url = extract_base(&document, page_url);

    ParsedPage {
        resources: extract_resources(&document, &base_url),
        links: extract_links(&document, &base_url),
    }
}

/// The URL relative references resolve against
fn extract_base(document: &Html, page_url: &Url) -> Url {
    let Ok(selector) = Selector::parse("base[href]") else {
        return page_url.clone();
    };

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn extract_resources(document: &Html, base_url: &Url) -> Vec<Reference> {
    let mut resources = Vec::new();

    for (selector, attribute) in RESOURCE_ATTRIBUTES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if element.value().name() == "link" && !is_resource_link(&element) {
                continue;
            }
            if let Some(reference) = element
                .value()
                .attr(attribute)
                .and_then(|raw| resolve_reference(raw, base_url))
            {
                resources.push(reference);
            }
        }
    }

    resources
}

/// `<link>` relations whose target is part of rendering the page
fn is_resource_link(element: &ElementRef<'_>) -> bool {
    element.value().attr("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace().any(|token| {
            let token = token.to_ascii_lowercase();
            token == "stylesheet" || token == "manifest" || token.contains("icon")
        })
    })
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Reference> {
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href], area[href]") else {
        return links;
    };

    for element in document.select(&selector) {
        // Skip if it has the download attribute
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(reference) = element
            .value()
            .attr("href")
            .and_then(|raw| resolve_reference(raw, base_url))
        {
            links.push(reference);
        }
    }

    links
}

/// Resolves a reference to an absolute URL and validates it
///
/// Returns None if the reference should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only references
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_reference(raw: &str, base_url: &Url) -> Option<Reference> {
    let href = raw.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    Some(Reference {
        raw: raw.to_string(),
        url,
    })
}

/// Rewrites reference attributes in a page
///
/// Only the attributes references are extracted from are touched: the
/// resource attributes above and `href` on `<a>` and `<area>`. A value
/// (quoted or not) whose decoded text is a key of `replacements` is replaced
/// by the mapped value, HTML-escaped and in the same quoting style. Text,
/// comments and the bodies of `<script>` and `<style>` are never rewritten.
/// The page is scanned once, so a replacement is never itself rewritten
/// again. Everything else is copied byte for byte.
///
/// # Example
///
/// ```
/// use folio::crawler::rewrite_references;
/// use std::collections::HashMap;
///
/// let replacements = HashMap::from([("/logo.png".to_string(), "logo.png".to_string())]);
/// let html = r#"<img src="/logo.png" alt=/logo.png>"#;
/// assert_eq!(rewrite_references(html, &replacements), r#"<img src="logo.png" alt=/logo.png>"#);
/// ```
pub fn rewrite_references(html: &str, replacements: &HashMap<String, String>) -> String {
    if replacements.is_empty() {
        return html.to_string();
    }

    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        rest = &rest[lt..];

        if rest.starts_with("<!--") {
            let end = rest.find("-->").map_or(rest.len(), |idx| idx + 3);
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }

        if !rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            out.push('<');
            rest = &rest[1..];
            continue;
        }

        let name_len = rest[1..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len() - 1);
        let tag = rest[1..1 + name_len].to_ascii_lowercase();
        out.push_str(&rest[..1 + name_len]);
        rest = rewrite_attributes(&tag, &rest[1 + name_len..], replacements, &mut out);

        if tag == "script" || tag == "style" {
            let end = find_closing_tag(rest, &tag).unwrap_or(rest.len());
            out.push_str(&rest[..end]);
            rest = &rest[end..];
        }
    }

    out.push_str(rest);
    out
}

/// Copies one tag's attributes into `out`, rewriting reference values
///
/// Returns what follows the tag's closing `>`.
fn rewrite_attributes<'a>(
    tag: &str,
    mut rest: &'a str,
    replacements: &HashMap<String, String>,
    out: &mut String,
) -> &'a str {
    loop {
        let skip = rest
            .find(|c: char| !(c.is_ascii_whitespace() || c == '/'))
            .unwrap_or(rest.len());
        out.push_str(&rest[..skip]);
        rest = &rest[skip..];

        if rest.is_empty() {
            return rest;
        }
        if let Some(after) = rest.strip_prefix('>') {
            out.push('>');
            return after;
        }

        let name_len = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len())
            .max(1);
        let name = rest[..name_len].to_ascii_lowercase();
        out.push_str(&rest[..name_len]);
        rest = &rest[name_len..];

        let gap = rest
            .find(|c: char| !c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let Some(after_eq) = rest[gap..].strip_prefix('=') else {
            // No value; the whitespace is copied on the next turn
            continue;
        };
        let lead = after_eq
            .find(|c: char| !c.is_ascii_whitespace())
            .unwrap_or(after_eq.len());
        out.push_str(&rest[..gap + 1 + lead]);
        rest = &after_eq[lead..];

        let Some(first) = rest.chars().next() else {
            return rest;
        };
        let (value, quote, consumed) = if first == '"' || first == '\'' {
            match rest[1..].find(first) {
                Some(end) => (&rest[1..1 + end], Some(first), end + 2),
                None => {
                    out.push_str(rest);
                    return "";
                }
            }
        } else {
            let end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '>')
                .unwrap_or(rest.len());
            (&rest[..end], None, end)
        };

        let replacement = if is_reference_attribute(tag, &name) {
            replacements.get(decode_entities(value).as_ref())
        } else {
            None
        };
        match replacement {
            Some(replacement) => {
                let escaped = escape_attribute(replacement, quote);
                match quote {
                    Some(q) => {
                        out.push(q);
                        out.push_str(&escaped);
                        out.push(q);
                    }
                    None => out.push_str(&escaped),
                }
            }
            None => out.push_str(&rest[..consumed]),
        }
        rest = &rest[consumed..];
    }
}

/// Whether `attribute` on `tag` is one references are extracted from
fn is_reference_attribute(tag: &str, attribute: &str) -> bool {
    if attribute == "href" && LINK_ELEMENTS.contains(&tag) {
        return true;
    }
    RESOURCE_ATTRIBUTES.iter().any(|(selector, attr)| {
        *attr == attribute && selector.split('[').next() == Some(tag)
    })
}

/// Byte offset of `</tag`, matched case-insensitively
fn find_closing_tag(html: &str, tag: &str) -> Option<usize> {
    let needle = format!("</{}", tag);
    html.as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Decodes the entities that commonly appear inside URL attributes
fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&#38;", "&")
            .replace("&amp;", "&"),
    )
}

fn escape_attribute(value: &str, quote: Option<char>) -> String {
    let escaped = value.replace('&', "&amp;");
    match quote {
        Some('\'') => escaped.replace('\'', "&#39;"),
        _ => escaped.replace('"', "&quot;"),
    }
}
