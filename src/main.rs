//! Ripple-Harvest main entry point
//!
//! This is the command-line interface for the Ripple-Harvest collection harvester.

use clap::Parser;
use ripple_harvest::config::{load_config_with_hash, Config, DetailConfig, ListingConfig};
use ripple_harvest::crawler::build_pipeline;
use ripple_harvest::output::print_run_summary;
use ripple_harvest::storage::SnapshotStore;
use ripple_harvest::{HarvestError, PageTask};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ripple-Harvest: A paginated collection harvester
///
/// Ripple-Harvest walks a paginated listing, resolves every listed item
/// through its detail endpoint, and commits the resulting records to a
/// snapshot in atomic batches.
#[derive(Parser, Debug)]
#[command(name = "ripple-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A paginated collection harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard the existing snapshot before harvesting
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the snapshot and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_harvest=info,warn"),
            1 => EnvFilter::new("ripple_harvest=debug,info"),
            2 => EnvFilter::new("ripple_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Ripple-Harvest Dry Run ===\n");

    println!("Pipeline Configuration:");
    println!("  Seed: {}", config.pipeline.seed);
    println!(
        "  Workers: {} discovery, {} detail, {} persistence",
        config.pipeline.discovery_workers,
        config.pipeline.detail_workers,
        config.pipeline.persist_workers
    );
    println!("  Batch size: {}", config.pipeline.batch_size);
    println!("  Flush interval: {}ms", config.pipeline.flush_interval_ms);
    println!("  Poll interval: {}ms", config.pipeline.poll_interval_ms);
    println!(
        "  Max consecutive flush failures: {}",
        config.pipeline.max_flush_failures
    );

    println!("\nQueues:");
    println!("  Page capacity: {}", config.queues.page_capacity);
    println!("  Item capacity: {}", config.queues.item_capacity);
    println!("  Record capacity: {}", config.queues.record_capacity);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nFetch:");
    println!(
        "  Timeout: {}s (connect {}s)",
        config.fetch.timeout_secs, config.fetch.connect_timeout_secs
    );
    println!(
        "  Retries: {} ({}ms apart)",
        config.fetch.max_retries, config.fetch.retry_delay_ms
    );

    println!("\nListing:");
    match &config.listing {
        ListingConfig::Json(json) => {
            println!("  Format: json");
            println!("  Items pointer: {}", json.items_pointer);
            println!("  Next pointer: {}", json.next_pointer);
            println!("  Key field: {}", json.key_field);
            println!("  URL field: {}", json.url_field);
        }
        ListingConfig::Html(html) => {
            println!("  Format: html");
            println!("  Item selector: {}", html.item_selector);
            println!("  Link attribute: {}", html.link_attribute);
            if let Some(key) = &html.key_attribute {
                println!("  Key attribute: {}", key);
            }
            if let Some(next) = &html.next_selector {
                println!("  Next selector: {}", next);
            }
        }
    }

    println!("\nDetail:");
    match &config.detail {
        DetailConfig::Json(json) => {
            println!("  Format: json");
            if !json.root_pointer.is_empty() {
                println!("  Root pointer: {}", json.root_pointer);
            }
        }
        DetailConfig::Html(html) => {
            println!("  Format: html");
            for (name, selector) in &html.fields {
                println!("  - {}: {}", name, selector);
            }
        }
    }

    println!("\nOutput:");
    println!("  Backend: {}", config.output.backend.as_str());
    println!("  Snapshot: {}", config.output.snapshot_path);

    println!("\n✓ Configuration is valid");
    println!("✓ Would start harvesting at {}", config.pipeline.seed);

    Ok(())
}

/// Handles the --stats mode: shows statistics from the snapshot
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use ripple_harvest::output::{load_statistics, print_statistics};
    use ripple_harvest::storage::open_store;

    println!("Snapshot: {}\n", config.output.snapshot_path);

    // Open the snapshot store
    let store = open_store(&config.output)?;

    // Load statistics
    let stats = load_statistics(&store)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, fresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    let seed = PageTask::parse(&config.pipeline.seed)?;
    let pipeline = build_pipeline(&config)?;

    if fresh {
        tracing::info!(
            "Starting fresh harvest (discarding {})",
            pipeline.store().describe()
        );
        pipeline.store().reset()?;
    } else {
        tracing::info!(
            "Starting harvest (appending to {})",
            pipeline.store().describe()
        );
    }

    // Ctrl-C is treated like any other fatal error: stop every stage, keep what was committed
    let cancel = pipeline.cancel_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel(HarvestError::Interrupted(
                "received Ctrl-C".to_string(),
            ));
        }
    });

    let summary = pipeline.run(seed).await;
    interrupt.abort();

    print_run_summary(&summary);

    match summary.error {
        Some(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
        None => {
            tracing::info!("Harvest completed successfully");
            Ok(())
        }
    }
}
