//! URL handling module for Ripple-Harvest
//!
//! This module resolves links found in listing payloads against the page they
//! came from, and produces the canonical form used to recognise a page that
//! has already been visited during a run.

mod normalize;

use url::Url;

pub use normalize::normalize_url;

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be ignored:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel: and data: schemes
/// - hrefs that do not resolve against the base
/// - non-HTTP(S) URLs after resolution
///
/// # Example
///
/// ```
/// use ripple_harvest::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/posts?page=1").unwrap();
/// let next = resolve_link("?page=2", &base).unwrap();
/// assert_eq!(next.as_str(), "https://example.com/posts?page=2");
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Returns the key used to compare page links within a run
///
/// Two links with the same key are the same page. Links that cannot be
/// normalized fall back to their literal form.
pub fn page_key(url: &Url) -> String {
    normalize_url(url.as_str())
        .map(|normalized| normalized.to_string())
        .unwrap_or_else(|_| url.to_string())
}
