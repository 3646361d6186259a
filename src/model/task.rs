use crate::model::Attributes;
use crate::url::page_key;
use crate::UrlError;
use std::fmt;
use url::Url;

/// One page of the paginated collection
///
/// Created once (the seed, or a page's "next" link) and consumed exactly once
/// by a Discovery worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageTask {
    url: Url,
}

impl PageTask {
    /// Creates a page task for an already-parsed URL
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Parses a page URL, accepting only http(s)
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let url = Url::parse(url.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Self { url }),
            other => Err(UrlError::InvalidScheme(other.to_string())),
        }
    }

    /// The URL to fetch
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Canonical key used for duplicate suppression within a run
    pub fn key(&self) -> String {
        page_key(&self.url)
    }
}

impl fmt::Display for PageTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// One collection member as listed on a page
///
/// Carries everything the listing already revealed about the item so the
/// Detail stage can merge it with the detail payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReference {
    /// Stable identifier of the item within the collection
    pub key: String,

    /// Where the item's full record is fetched from
    pub detail_url: Url,

    /// Attributes already known from the listing page
    pub attributes: Attributes,
}

impl ItemReference {
    pub fn new(key: impl Into<String>, detail_url: Url) -> Self {
        Self {
            key: key.into(),
            detail_url,
            attributes: Attributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_task() {
        let task = PageTask::parse("https://example.com/posts?page=1").unwrap();
        assert_eq!(task.url().as_str(), "https://example.com/posts?page=1");
        assert_eq!(task.to_string(), "https://example.com/posts?page=1");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let result = PageTask::parse("ftp://example.com/listing");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(PageTask::parse("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_key_matches_equivalent_links() {
        let a = PageTask::parse("https://example.com/posts/?page=2#top").unwrap();
        let b = PageTask::parse("https://example.com/posts?page=2").unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_item_reference_builder() {
        let url = Url::parse("https://example.com/posts/7").unwrap();
        let attributes = Attributes {
            title: Some("Seven".to_string()),
            ..Attributes::default()
        };
        let item = ItemReference::new("7", url.clone()).with_attributes(attributes);

        assert_eq!(item.key, "7");
        assert_eq!(item.detail_url, url);
        assert_eq!(item.attributes.title.as_deref(), Some("Seven"));
    }
}
