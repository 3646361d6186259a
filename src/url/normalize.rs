use crate::UrlError;
use url::Url;

/// Query parameters that never select a different page
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Canonical comparison form of a page link
///
/// Host is lowercased, dot segments and repeated or trailing slashes are
/// dropped from the path, the fragment is removed, and the query loses its
/// tracking parameters (`utm_*`, `gclid`, ...) and is sorted by key. Repeated
/// keys keep their relative order because `?tag=a&tag=b` and `?tag=b&tag=a`
/// may be different pages.
///
/// Scheme and `www.` prefixes are left alone: an API may serve different
/// content on `http://` and `https://`.
///
/// # Examples
///
/// ```
/// use ripple_harvest::url::normalize_url;
///
/// let url = normalize_url("https://API.EXAMPLE.COM/posts/?page=2&utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://api.example.com/posts?page=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(e.to_string()))?;

    let path = canonical_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    let query = canonical_query(&url);
    if query.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(query);
    }

    Ok(url)
}

fn canonical_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." {
            segments.pop();
        } else {
            segments.push(segment);
        }
    }
    format!("/{}", segments.join("/"))
}

fn canonical_query(url: &Url) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()) && !key.starts_with("utm_"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}
