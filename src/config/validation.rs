use crate::config::types::{
    Config, DetailConfig, FetchConfig, ListingConfig, OutputConfig, PipelineConfig, QueueConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

const MAX_WORKERS: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_queue_config(&config.queues)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_fetch_config(&config.fetch)?;
    validate_listing_config(&config.listing)?;
    validate_detail_config(&config.detail)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates stage sizing, batching and the seed URL
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", config.seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use HTTP or HTTPS scheme",
            config.seed
        )));
    }

    validate_worker_count("discovery-workers", config.discovery_workers)?;
    validate_worker_count("detail-workers", config.detail_workers)?;
    validate_worker_count("persist-workers", config.persist_workers)?;

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.flush_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "flush-interval-ms must be >= 1ms".to_string(),
        ));
    }

    if config.poll_interval_ms < 1 || config.poll_interval_ms > config.flush_interval_ms {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms must be between 1 and flush-interval-ms ({}), got {}",
            config.flush_interval_ms, config.poll_interval_ms
        )));
    }

    if config.max_flush_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max-flush-failures must be >= 1, got {}",
            config.max_flush_failures
        )));
    }

    Ok(())
}

fn validate_worker_count(name: &str, count: usize) -> Result<(), ConfigError> {
    if count < 1 || count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_WORKERS, count
        )));
    }
    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    for (name, capacity) in [
        ("page-capacity", config.page_capacity),
        ("item-capacity", config.item_capacity),
        ("record-capacity", config.record_capacity),
    ] {
        if capacity < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, capacity
            )));
        }
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "connect-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_listing_config(config: &ListingConfig) -> Result<(), ConfigError> {
    match config {
        ListingConfig::Json(json) => {
            validate_pointer("items-pointer", &json.items_pointer)?;
            validate_pointer("next-pointer", &json.next_pointer)?;
            if json.key_field.is_empty() || json.url_field.is_empty() {
                return Err(ConfigError::Validation(
                    "key-field and url-field cannot be empty".to_string(),
                ));
            }
        }
        ListingConfig::Html(html) => {
            validate_selector(&html.item_selector)?;
            if let Some(next) = &html.next_selector {
                validate_selector(next)?;
            }
            if html.link_attribute.is_empty() {
                return Err(ConfigError::Validation(
                    "link-attribute cannot be empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_detail_config(config: &DetailConfig) -> Result<(), ConfigError> {
    match config {
        DetailConfig::Json(json) => validate_pointer("root-pointer", &json.root_pointer),
        DetailConfig::Html(html) => {
            if html.fields.is_empty() {
                return Err(ConfigError::Validation(
                    "HTML detail format needs at least one entry in [detail.fields]".to_string(),
                ));
            }
            for selector in html.fields.values() {
                validate_selector(selector)?;
            }
            Ok(())
        }
    }
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.snapshot_path.is_empty() {
        return Err(ConfigError::Validation(
            "snapshot_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// JSON pointers are either empty (whole document) or start with '/'
fn validate_pointer(name: &str, pointer: &str) -> Result<(), ConfigError> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "{} must be empty or start with '/', got '{}'",
            name, pointer
        )));
    }
    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
