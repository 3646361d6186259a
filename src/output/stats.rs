//! Statistics over a committed snapshot
//!
//! This module provides functionality for extracting and displaying
//! statistics about the records a snapshot store holds.

use crate::storage::{Snapshot, SnapshotStore};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Snapshot statistics summary
#[derive(Debug, Clone, Default)]
pub struct SnapshotStatistics {
    /// Total number of committed records
    pub total_records: u64,

    /// Number of distinct record keys
    pub distinct_keys: u64,

    /// Count of records by category (records without one are not counted)
    pub records_by_category: HashMap<String, u64>,

    /// Records that carry no title
    pub untitled_records: u64,

    /// Number of distinct hosts the records were resolved from
    pub source_hosts: u64,

    /// When the last batch was committed
    pub updated_at: Option<DateTime<Utc>>,
}

impl SnapshotStatistics {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut keys = HashSet::new();
        let mut hosts = HashSet::new();
        let mut records_by_category = HashMap::new();
        let mut untitled_records = 0;

        for record in &snapshot.records {
            keys.insert(record.key.as_str());

            if let Some(host) = url::Url::parse(&record.source_url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
            {
                hosts.insert(host);
            }

            if let Some(category) = &record.attributes.category {
                *records_by_category.entry(category.clone()).or_insert(0) += 1;
            }

            if record.attributes.title.is_none() {
                untitled_records += 1;
            }
        }

        Self {
            total_records: snapshot.len() as u64,
            distinct_keys: keys.len() as u64,
            records_by_category,
            untitled_records,
            source_hosts: hosts.len() as u64,
            updated_at: snapshot.updated_at,
        }
    }
}

/// Loads statistics from a snapshot store
pub fn load_statistics<S>(store: &S) -> Result<SnapshotStatistics, HarvestError>
where
    S: SnapshotStore + ?Sized,
{
    let snapshot = store.load_snapshot()?;
    Ok(SnapshotStatistics::from_snapshot(&snapshot))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SnapshotStatistics) {
    println!("=== Snapshot Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Distinct keys: {}", stats.distinct_keys);
    println!("  Source hosts: {}", stats.source_hosts);
    match stats.updated_at {
        Some(updated_at) => println!("  Last commit: {}", updated_at.to_rfc3339()),
        None => println!("  Last commit: never"),
    }
    println!();

    if !stats.records_by_category.is_empty() {
        println!("Records by Category:");
        // Sort categories by count (descending), then name
        let mut category_counts: Vec<_> = stats.records_by_category.iter().collect();
        category_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (category, count) in category_counts {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category, count, percentage);
        }
        println!();
    }

    let duplicates = stats.total_records - stats.distinct_keys;
    if duplicates > 0 {
        println!("Repeated keys: {} records share a key with an earlier record", duplicates);
    }
    if stats.untitled_records > 0 {
        println!("Untitled records: {}", stats.untitled_records);
    }
}
