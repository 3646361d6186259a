use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub listing: ListingConfig,
    #[serde(default)]
    pub detail: DetailConfig,
    pub output: OutputConfig,
}

/// Stage sizing and batching
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// First listing page of the collection
    pub seed: String,

    #[serde(rename = "discovery-workers", default = "default_discovery_workers")]
    pub discovery_workers: usize,

    #[serde(rename = "detail-workers", default = "default_detail_workers")]
    pub detail_workers: usize,

    #[serde(rename = "persist-workers", default = "default_persist_workers")]
    pub persist_workers: usize,

    /// Records accumulated before a size-triggered flush
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum age of a non-empty batch before a time-triggered flush (milliseconds)
    #[serde(rename = "flush-interval-ms", default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// How long a persistence worker waits for a record before checking the flush timer (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed flushes tolerated before the run is cancelled
    #[serde(rename = "max-flush-failures", default = "default_max_flush_failures")]
    pub max_flush_failures: u32,
}

fn default_discovery_workers() -> usize {
    1
}

fn default_detail_workers() -> usize {
    4
}

fn default_persist_workers() -> usize {
    1
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_interval_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_flush_failures() -> u32 {
    3
}

/// Bounded queue capacities between stages
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(rename = "page-capacity", default = "default_page_capacity")]
    pub page_capacity: usize,

    #[serde(rename = "item-capacity", default = "default_item_capacity")]
    pub item_capacity: usize,

    #[serde(rename = "record-capacity", default = "default_record_capacity")]
    pub record_capacity: usize,
}

fn default_page_capacity() -> usize {
    16
}

fn default_item_capacity() -> usize {
    256
}

fn default_record_capacity() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            page_capacity: default_page_capacity(),
            item_capacity: default_item_capacity(),
            record_capacity: default_record_capacity(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP client behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Extra attempts for timeouts and 5xx responses
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// How listing pages are decoded
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ListingConfig {
    Json(JsonListingConfig),
    Html(HtmlListingConfig),
}

/// Listing pages served as JSON documents
#[derive(Debug, Clone, Deserialize)]
pub struct JsonListingConfig {
    /// JSON pointer to the array of items
    #[serde(rename = "items-pointer", default = "default_items_pointer")]
    pub items_pointer: String,

    /// JSON pointer to the next page link
    #[serde(rename = "next-pointer", default = "default_next_pointer")]
    pub next_pointer: String,

    /// Item field holding the stable key
    #[serde(rename = "key-field", default = "default_key_field")]
    pub key_field: String,

    /// Item field holding the detail URL
    #[serde(rename = "url-field", default = "default_url_field")]
    pub url_field: String,
}

fn default_items_pointer() -> String {
    "/items".to_string()
}

fn default_next_pointer() -> String {
    "/next".to_string()
}

fn default_key_field() -> String {
    "id".to_string()
}

fn default_url_field() -> String {
    "url".to_string()
}

impl Default for JsonListingConfig {
    fn default() -> Self {
        Self {
            items_pointer: default_items_pointer(),
            next_pointer: default_next_pointer(),
            key_field: default_key_field(),
            url_field: default_url_field(),
        }
    }
}

/// Listing pages served as HTML
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlListingConfig {
    /// Selector matching one element per item
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Attribute of the item element holding the detail link
    #[serde(rename = "link-attribute", default = "default_link_attribute")]
    pub link_attribute: String,

    /// Attribute holding the item key; the detail URL is used when absent
    #[serde(rename = "key-attribute", default)]
    pub key_attribute: Option<String>,

    /// Selector for the element linking to the next page
    #[serde(rename = "next-selector", default)]
    pub next_selector: Option<String>,
}

fn default_link_attribute() -> String {
    "href".to_string()
}

/// How detail payloads are decoded
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum DetailConfig {
    Json(JsonDetailConfig),
    Html(HtmlDetailConfig),
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self::Json(JsonDetailConfig::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDetailConfig {
    /// JSON pointer to the object holding the attributes; empty for the document root
    #[serde(rename = "root-pointer", default)]
    pub root_pointer: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HtmlDetailConfig {
    /// Attribute name to CSS selector
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Snapshot backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the snapshot file or database
    #[serde(rename = "snapshot-path")]
    pub snapshot_path: String,
}
