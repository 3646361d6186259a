//! Listing and detail payload parsers
//!
//! A listing page yields the item references it lists plus an optional link
//! to the next page. A detail payload yields the attributes of one item.
//! Both come in a JSON flavor (`serde_json` pointers) and an HTML flavor
//! (`scraper` CSS selectors).

use crate::config::{
    DetailConfig, HtmlDetailConfig, HtmlListingConfig, JsonDetailConfig, JsonListingConfig,
    ListingConfig,
};
use crate::model::{Attributes, ItemReference, PageTask};
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors raised while decoding a payload
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unexpected payload shape: {0}")]
    Shape(String),
}

/// Everything a listing page reveals
#[derive(Debug, Default)]
pub struct ListingPage {
    /// Items in page order
    pub items: Vec<ItemReference>,

    /// The following page, if the listing links one
    pub next: Option<PageTask>,

    /// Entries dropped for lacking a key or a usable link
    pub skipped: usize,
}

/// Decodes listing pages
pub trait ListingParser: Send + Sync {
    fn parse_listing(&self, page_url: &Url, payload: &[u8]) -> Result<ListingPage, ParseError>;
}

/// Decodes detail payloads
pub trait DetailParser: Send + Sync {
    fn parse_detail(&self, payload: &[u8]) -> Result<Attributes, ParseError>;
}

/// Builds the listing parser named by the configuration
pub fn build_listing_parser(config: &ListingConfig) -> Result<Arc<dyn ListingParser>, ConfigError> {
    match config {
        ListingConfig::Json(json) => Ok(Arc::new(JsonListingParser::new(json))),
        ListingConfig::Html(html) => {
            let parser = HtmlListingParser::new(html)
                .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
            Ok(Arc::new(parser))
        }
    }
}

/// Builds the detail parser named by the configuration
pub fn build_detail_parser(config: &DetailConfig) -> Result<Arc<dyn DetailParser>, ConfigError> {
    match config {
        DetailConfig::Json(json) => Ok(Arc::new(JsonDetailParser::new(json))),
        DetailConfig::Html(html) => {
            let parser = HtmlDetailParser::new(html)
                .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
            Ok(Arc::new(parser))
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Keys may be strings or numbers in the source
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Listing pages served as JSON documents
#[derive(Debug, Clone)]
pub struct JsonListingParser {
    items_pointer: String,
    next_pointer: String,
    key_field: String,
    url_field: String,
}

impl JsonListingParser {
    pub fn new(config: &JsonListingConfig) -> Self {
        Self {
            items_pointer: config.items_pointer.clone(),
            next_pointer: config.next_pointer.clone(),
            key_field: config.key_field.clone(),
            url_field: config.url_field.clone(),
        }
    }

    fn parse_item(&self, page_url: &Url, item: &Value) -> Option<ItemReference> {
        let fields = item.as_object()?;
        let key = fields.get(&self.key_field).and_then(key_text)?;
        let href = fields.get(&self.url_field).and_then(Value::as_str)?;
        let detail_url = resolve_link(href, page_url)?;

        let mut attributes = Attributes::default();
        for (name, value) in fields {
            if name == &self.key_field || name == &self.url_field {
                continue;
            }
            attributes.set(name, value.clone());
        }

        Some(ItemReference::new(key, detail_url).with_attributes(attributes))
    }

    fn next_page(&self, page_url: &Url, document: &Value) -> Option<PageTask> {
        // An empty pointer would select the whole document
        if self.next_pointer.is_empty() {
            return None;
        }
        let href = document.pointer(&self.next_pointer)?.as_str()?;
        match resolve_link(href, page_url) {
            Some(url) => Some(PageTask::new(url)),
            None => {
                tracing::debug!("Ignoring unusable next link '{}' on {}", href, page_url);
                None
            }
        }
    }
}

impl ListingParser for JsonListingParser {
    fn parse_listing(&self, page_url: &Url, payload: &[u8]) -> Result<ListingPage, ParseError> {
        let document: Value = serde_json::from_slice(payload)?;

        let entries = match document.pointer(&self.items_pointer) {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(other) => {
                return Err(ParseError::Shape(format!(
                    "expected an array at '{}', found {}",
                    self.items_pointer,
                    json_kind(other)
                )))
            }
        };

        let mut page = ListingPage {
            next: self.next_page(page_url, &document),
            ..ListingPage::default()
        };

        for entry in entries {
            match self.parse_item(page_url, entry) {
                Some(item) => page.items.push(item),
                None => page.skipped += 1,
            }
        }

        Ok(page)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Detail payloads served as JSON documents
#[derive(Debug, Clone)]
pub struct JsonDetailParser {
    root_pointer: String,
}

impl JsonDetailParser {
    pub fn new(config: &JsonDetailConfig) -> Self {
        Self {
            root_pointer: config.root_pointer.clone(),
        }
    }
}

impl DetailParser for JsonDetailParser {
    fn parse_detail(&self, payload: &[u8]) -> Result<Attributes, ParseError> {
        let document: Value = serde_json::from_slice(payload)?;

        let root = document
            .pointer(&self.root_pointer)
            .ok_or_else(|| ParseError::MissingField(self.root_pointer.clone()))?;
        let fields = root.as_object().ok_or_else(|| {
            ParseError::Shape(format!(
                "expected an object at '{}', found {}",
                self.root_pointer,
                json_kind(root)
            ))
        })?;

        let mut attributes = Attributes::default();
        for (name, value) in fields {
            attributes.set(name, value.clone());
        }
        Ok(attributes)
    }
}

/// Listing pages served as HTML
///
/// Each element matched by the item selector is one item. Its link attribute
/// gives the detail URL, its key attribute (or the detail URL) the key, and
/// its text the title.
#[derive(Debug)]
pub struct HtmlListingParser {
    item_selector: Selector,
    link_attribute: String,
    key_attribute: Option<String>,
    next_selector: Option<Selector>,
}

impl HtmlListingParser {
    pub fn new(config: &HtmlListingConfig) -> Result<Self, ParseError> {
        Ok(Self {
            item_selector: parse_selector(&config.item_selector)?,
            link_attribute: config.link_attribute.clone(),
            key_attribute: config.key_attribute.clone(),
            next_selector: config
                .next_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?,
        })
    }

    fn parse_item(&self, page_url: &Url, element: ElementRef<'_>) -> Option<ItemReference> {
        let href = element.value().attr(&self.link_attribute)?;
        let detail_url = resolve_link(href, page_url)?;

        let key = match &self.key_attribute {
            Some(name) => element.value().attr(name)?.trim().to_string(),
            None => detail_url.to_string(),
        };
        if key.is_empty() {
            return None;
        }

        let mut attributes = Attributes::default();
        let text = element_text(element);
        if !text.is_empty() {
            attributes.set("title", Value::String(text));
        }

        Some(ItemReference::new(key, detail_url).with_attributes(attributes))
    }
}

impl ListingParser for HtmlListingParser {
    fn parse_listing(&self, page_url: &Url, payload: &[u8]) -> Result<ListingPage, ParseError> {
        let text = String::from_utf8_lossy(payload);
        let document = Html::parse_document(&text);

        let mut page = ListingPage::default();
        for element in document.select(&self.item_selector) {
            match self.parse_item(page_url, element) {
                Some(item) => page.items.push(item),
                None => page.skipped += 1,
            }
        }

        if let Some(selector) = &self.next_selector {
            page.next = document
                .select(selector)
                .filter_map(|element| element.value().attr("href"))
                .find_map(|href| resolve_link(href, page_url))
                .map(PageTask::new);
        }

        Ok(page)
    }
}

/// Detail pages served as HTML
///
/// Each configured field takes the text of its first match; tag fields
/// collect every match. The document `<title>` stands in for a missing title.
#[derive(Debug)]
pub struct HtmlDetailParser {
    fields: Vec<(String, Selector)>,
}

impl HtmlDetailParser {
    pub fn new(config: &HtmlDetailConfig) -> Result<Self, ParseError> {
        let fields = config
            .fields
            .iter()
            .map(|(name, selector)| Ok((name.clone(), parse_selector(selector)?)))
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(Self { fields })
    }
}

impl DetailParser for HtmlDetailParser {
    fn parse_detail(&self, payload: &[u8]) -> Result<Attributes, ParseError> {
        let text = String::from_utf8_lossy(payload);
        let document = Html::parse_document(&text);

        let mut attributes = Attributes::default();
        for (name, selector) in &self.fields {
            let mut matches = document
                .select(selector)
                .map(element_text)
                .filter(|text| !text.is_empty());

            if is_tag_field(name) {
                let tags: Vec<Value> = matches.map(Value::String).collect();
                if !tags.is_empty() {
                    attributes.set(name, Value::Array(tags));
                }
            } else if let Some(first) = matches.next() {
                attributes.set(name, Value::String(first));
            }
        }

        if attributes.title.is_none() {
            attributes.title = extract_title(&document);
        }

        Ok(attributes)
    }
}

fn is_tag_field(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "tags" | "keywords" | "labels"
    )
}

/// Collapsed, trimmed text content of an element
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page_url() -> Url {
        Url::parse("https://api.example.com/posts?page=1").unwrap()
    }

    fn json_listing() -> JsonListingParser {
        JsonListingParser::new(&JsonListingConfig::default())
    }

    #[test]
    fn test_json_listing_items_and_next() {
        let payload = br#"{
            "items": [
                {"id": 1, "url": "/posts/1", "title": "First", "tags": ["a"]},
                {"id": "two", "url": "https://api.example.com/posts/2"}
            ],
            "next": "?page=2"
        }"#;

        let page = json_listing().parse_listing(&page_url(), payload).unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].key, "1");
        assert_eq!(
            page.items[0].detail_url.as_str(),
            "https://api.example.com/posts/1"
        );
        assert_eq!(page.items[0].attributes.title.as_deref(), Some("First"));
        assert_eq!(page.items[0].attributes.tags, vec!["a"]);
        assert!(page.items[0].attributes.extra.get("id").is_none());
        assert_eq!(page.items[1].key, "two");
        assert_eq!(
            page.next.unwrap().url().as_str(),
            "https://api.example.com/posts?page=2"
        );
        assert_eq!(page.skipped, 0);
    }

    #[test]
    fn test_json_listing_last_page() {
        let payload = br#"{"items": [{"id": 1, "url": "/posts/1"}], "next": null}"#;
        let page = json_listing().parse_listing(&page_url(), payload).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next.is_none());
    }

    #[test]
    fn test_json_listing_empty_page() {
        let page = json_listing().parse_listing(&page_url(), b"{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn test_json_listing_skips_incomplete_items() {
        let payload = br#"{"items": [
            {"id": 1},
            {"url": "/posts/2"},
            {"id": 3, "url": "mailto:someone@example.com"},
            "not an object",
            {"id": 5, "url": "/posts/5"}
        ]}"#;

        let page = json_listing().parse_listing(&page_url(), payload).unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key, "5");
        assert_eq!(page.skipped, 4);
    }

    #[test]
    fn test_json_listing_rejects_non_array_items() {
        let result = json_listing().parse_listing(&page_url(), br#"{"items": {"id": 1}}"#);
        assert!(matches!(result, Err(ParseError::Shape(_))));
    }

    #[test]
    fn test_json_listing_rejects_invalid_json() {
        let result = json_listing().parse_listing(&page_url(), b"<html>");
        assert!(matches!(result, Err(ParseError::Json(_))));
    }

    #[test]
    fn test_json_rejects_invalid_utf8() {
        // Latin-1 "é" inside a string literal
        let payload = b"{\"items\": [{\"id\": 1, \"url\": \"/caf\xe9\"}]}";
        let result = json_listing().parse_listing(&page_url(), payload);
        assert!(matches!(result, Err(ParseError::Json(_))));

        let detail = JsonDetailParser::new(&JsonDetailConfig::default());
        let result = detail.parse_detail(b"{\"title\": \"caf\xe9\"}");
        assert!(matches!(result, Err(ParseError::Json(_))));
    }

    #[test]
    fn test_json_detail_with_root_pointer() {
        let parser = JsonDetailParser::new(&JsonDetailConfig {
            root_pointer: "/data".to_string(),
        });
        let payload = br#"{"data": {"title": "Full title", "author": "Ada", "words": 1200}}"#;

        let attrs = parser.parse_detail(payload).unwrap();

        assert_eq!(attrs.title.as_deref(), Some("Full title"));
        assert_eq!(attrs.author.as_deref(), Some("Ada"));
        assert_eq!(attrs.extra.get("words"), Some(&serde_json::json!(1200)));
    }

    #[test]
    fn test_json_detail_missing_root() {
        let parser = JsonDetailParser::new(&JsonDetailConfig {
            root_pointer: "/data".to_string(),
        });
        let result = parser.parse_detail(br#"{"other": {}}"#);
        assert!(matches!(result, Err(ParseError::MissingField(_))));

        let result = parser.parse_detail(br#"{"data": [1, 2]}"#);
        assert!(matches!(result, Err(ParseError::Shape(_))));
    }

    #[test]
    fn test_html_listing() {
        let parser = HtmlListingParser::new(&HtmlListingConfig {
            item_selector: "ul.items a".to_string(),
            link_attribute: "href".to_string(),
            key_attribute: Some("data-key".to_string()),
            next_selector: Some("a.next".to_string()),
        })
        .unwrap();
        let html = br#"<html><body>
            <ul class="items">
                <li><a data-key="k1" href="/items/1">  First
                    item </a></li>
                <li><a data-key="k2" href="/items/2">Second</a></li>
                <li><a href="/items/3">No key</a></li>
            </ul>
            <a class="next" href="/catalog?page=2">Next</a>
        </body></html>"#;

        let page = parser.parse_listing(&page_url(), html).unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].key, "k1");
        assert_eq!(page.items[0].attributes.title.as_deref(), Some("First item"));
        assert_eq!(page.skipped, 1);
        assert_eq!(
            page.next.unwrap().url().as_str(),
            "https://api.example.com/catalog?page=2"
        );
    }

    #[test]
    fn test_html_listing_key_falls_back_to_url() {
        let parser = HtmlListingParser::new(&HtmlListingConfig {
            item_selector: "a.item".to_string(),
            link_attribute: "href".to_string(),
            key_attribute: None,
            next_selector: None,
        })
        .unwrap();
        let html = br#"<a class="item" href="/items/9">Nine</a>"#;

        let page = parser.parse_listing(&page_url(), html).unwrap();

        assert_eq!(page.items[0].key, "https://api.example.com/items/9");
        assert!(page.next.is_none());
    }

    #[test]
    fn test_html_detail() {
        let mut fields = BTreeMap::new();
        fields.insert("summary".to_string(), "p.lede".to_string());
        fields.insert("tags".to_string(), "ul.tags li".to_string());
        let parser = HtmlDetailParser::new(&HtmlDetailConfig { fields }).unwrap();
        let html = br#"<html><head><title>Doc title</title></head><body>
            <p class="lede">The lede</p>
            <ul class="tags"><li>rust</li><li> async </li></ul>
        </body></html>"#;

        let attrs = parser.parse_detail(html).unwrap();

        assert_eq!(attrs.title.as_deref(), Some("Doc title"));
        assert_eq!(attrs.summary.as_deref(), Some("The lede"));
        assert_eq!(attrs.tags, vec!["rust", "async"]);
    }

    #[test]
    fn test_build_parsers_from_config() {
        assert!(build_listing_parser(&ListingConfig::Json(JsonListingConfig::default())).is_ok());
        assert!(build_detail_parser(&DetailConfig::default()).is_ok());

        let bad = ListingConfig::Html(HtmlListingConfig {
            item_selector: "[[".to_string(),
            link_attribute: "href".to_string(),
            key_attribute: None,
            next_selector: None,
        });
        assert!(matches!(
            build_listing_parser(&bad),
            Err(ConfigError::InvalidSelector(_))
        ));
    }
}
