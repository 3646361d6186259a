//! Output module for run summaries and snapshot statistics
//!
//! This module handles:
//! - Printing the summary of a finished run
//! - Computing and printing statistics over a committed snapshot

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, SnapshotStatistics};
pub use summary::print_run_summary;
