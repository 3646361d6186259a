//! Typed attributes and resolved records
//!
//! Listing and detail payloads both decode into [`Attributes`]. Well-known
//! fields get their own slot; anything else lands in `extra`. The two sides
//! are combined with [`Attributes::merge`], where the detail payload wins.

use crate::model::ItemReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute set of one collection member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Publication timestamp as the source reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,

    /// Last modification timestamp as the source reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Fields without a dedicated slot, ordered by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Attributes {
    /// Stores a raw payload field under its typed slot
    ///
    /// Field names are matched case-insensitively against a fixed alias table
    /// (`name`/`headline` → title, `description`/`excerpt` → summary,
    /// `date`/`published_at` → published, ...). Null values are ignored.
    /// Scalars for text slots are stringified; structured values for text
    /// slots, and unknown names, go to `extra` under the original name.
    pub fn set(&mut self, name: &str, value: Value) {
        if value.is_null() {
            return;
        }

        let slot = match name.to_ascii_lowercase().as_str() {
            "title" | "name" | "headline" => Some(&mut self.title),
            "summary" | "description" | "excerpt" => Some(&mut self.summary),
            "author" | "creator" | "byline" => Some(&mut self.author),
            "category" | "section" => Some(&mut self.category),
            "published" | "published_at" | "date" | "created_at" => Some(&mut self.published),
            "updated" | "updated_at" | "modified" => Some(&mut self.updated),
            "tags" | "keywords" | "labels" => {
                self.tags = tags_from_value(&value);
                return;
            }
            _ => None,
        };

        match (slot, scalar_text(&value)) {
            (Some(slot), Some(text)) => *slot = Some(text),
            _ => {
                self.extra.insert(name.to_string(), value);
            }
        }
    }

    /// Returns true when no attribute is set
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.author.is_none()
            && self.category.is_none()
            && self.published.is_none()
            && self.updated.is_none()
            && self.tags.is_empty()
            && self.extra.is_empty()
    }

    /// Merges listing attributes with detail attributes
    ///
    /// The detail payload is the source of truth: every slot takes the detail
    /// value when present and falls back to the listing value otherwise.
    /// Detail tags replace listing tags when non-empty; `extra` entries from
    /// the detail side replace listing entries with the same name.
    pub fn merge(listing: Attributes, detail: Attributes) -> Attributes {
        let mut extra = listing.extra;
        extra.extend(detail.extra);

        Attributes {
            title: detail.title.or(listing.title),
            summary: detail.summary.or(listing.summary),
            author: detail.author.or(listing.author),
            category: detail.category.or(listing.category),
            published: detail.published.or(listing.published),
            updated: detail.updated.or(listing.updated),
            tags: if detail.tags.is_empty() {
                listing.tags
            } else {
                detail.tags
            },
            extra,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags arrive either as an array or as a comma-separated string
fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

/// A fully resolved collection member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier carried over from the listing
    pub key: String,

    /// Detail URL the record was resolved from
    pub source_url: String,

    /// When the detail payload was resolved
    pub fetched_at: DateTime<Utc>,

    pub attributes: Attributes,
}

impl Record {
    /// Resolves an item reference against its detail attributes
    pub fn resolve(reference: ItemReference, detail: Attributes) -> Self {
        Self {
            key: reference.key,
            source_url: reference.detail_url.to_string(),
            fetched_at: Utc::now(),
            attributes: Attributes::merge(reference.attributes, detail),
        }
    }
}
