//! Run summary printing

use crate::crawler::{RunStatus, RunSummary};

/// Prints a finished run's summary to stdout
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Status: {}", summary.status);
    println!("Elapsed: {:.2?}", summary.elapsed);
    println!();

    println!("Discovery:");
    println!("  Pages processed: {}", summary.pages_processed);
    println!("  Pages failed: {}", summary.pages_failed);
    println!("  Items discovered: {}", summary.items_discovered);
    println!();

    println!("Detail:");
    println!("  Items resolved: {}", summary.items_processed);
    println!("  Items failed: {}", summary.items_failed);
    println!();

    println!("Persistence:");
    println!("  Records persisted: {}", summary.records_persisted);

    if summary.status == RunStatus::CancelledFatal {
        println!();
        match &summary.error {
            Some(error) => println!("Cancelled by: {}", error),
            None => println!("Cancelled"),
        }
    }
}
