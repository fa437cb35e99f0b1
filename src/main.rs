//! Steam Sentinel main entry point
//!
//! This is the command-line interface for the Steam Sentinel crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use steam_sentinel::config::{load_config_with_hash, Config};
use steam_sentinel::crawler::Crawler;
use steam_sentinel::profile::ProfileReference;
use tracing_subscriber::EnvFilter;

/// Steam Sentinel: a social-graph crawler for flagged profile comments
///
/// Steam Sentinel walks Steam community profiles outward from seed profiles,
/// following comment authors and friend lists, and records comments that
/// match the configured term list.
#[derive(Parser, Debug)]
#[command(name = "steam-sentinel")]
#[command(version = "1.0.0")]
#[command(about = "A social-graph crawler for flagged profile comments", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed profiles (URL, /id/<name>, /profiles/<id>, id or vanity name);
    /// defaults to [targets].seeds
    #[arg(value_name = "SEEDS")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and seeds and show what would be crawled
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }

    let seeds = select_seeds(&cli.seeds, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &seeds);
        Ok(())
    } else {
        handle_crawl(config, &seeds).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("steam_sentinel=info,warn"),
            1 => EnvFilter::new("steam_sentinel=debug,info"),
            2 => EnvFilter::new("steam_sentinel=trace,debug"),
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

/// CLI seeds win over configured ones; every seed must parse
fn select_seeds(cli_seeds: &[String], config: &Config) -> anyhow::Result<Vec<String>> {
    let seeds = if cli_seeds.is_empty() {
        config.targets.seeds.clone()
    } else {
        cli_seeds.to_vec()
    };

    if seeds.is_empty() {
        bail!("No seeds given; pass SEEDS or set [targets].seeds");
    }

    for seed in &seeds {
        ProfileReference::parse(seed).with_context(|| format!("Invalid seed '{}'", seed))?;
    }

    Ok(seeds)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, seeds: &[String]) {
    println!("=== Steam Sentinel Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.max_concurrent_requests);
    println!(
        "  Rate: {} req/s (burst {})",
        config.crawler.requests_per_second, config.crawler.burst_capacity
    );
    println!(
        "  Max profiles: {}",
        limit_label(config.crawler.max_profiles_to_process)
    );
    println!(
        "  Max runtime (minutes): {}",
        limit_label(config.crawler.max_processing_time_minutes)
    );
    println!(
        "  Retries: {} (base {}ms, max {}ms, x{})",
        config.retry.max_retries,
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
        config.retry.backoff_factor
    );

    println!("\nFilter:");
    println!("  Terms: {}", config.filter.terms.len());
    println!("  Patterns: {}", config.filter.patterns.len());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} seed(s) sequentially", seeds.len());
}

fn limit_label(value: u64) -> String {
    if value == 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use steam_sentinel::output::{load_statistics, print_statistics};
    use steam_sentinel::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation, one seed at a time
async fn handle_crawl(config: Config, seeds: &[String]) -> anyhow::Result<()> {
    tracing::info!(
        seeds = seeds.len(),
        workers = config.crawler.max_concurrent_requests,
        "Starting crawl"
    );

    let crawler = Crawler::from_config(config)?;
    let mut failed = Vec::new();

    for seed in seeds {
        match crawler.crawl(seed).await {
            Ok(summary) => {
                println!("Seed {} ({}):", seed, summary.seed_id);
                println!("  Exit reason: {}", summary.exit_reason());
                println!("  Profiles processed: {}", summary.processed_count);
                println!("  Flagged comments stored: {}", summary.flagged_count);
                if summary.unprocessed_saved > 0 {
                    println!(
                        "  Unprocessed profiles saved: {}",
                        summary.unprocessed_saved
                    );
                }
            }
            Err(e) => {
                tracing::error!(seed = %seed, error = %e, "Crawl failed");
                failed.push(seed.clone());
            }
        }
    }

    println!(
        "Total flagged comments in database: {}",
        crawler.gateway().count_flagged_items()
    );

    if !failed.is_empty() {
        bail!("Crawl failed for seed(s): {}", failed.join(", "));
    }

    Ok(())
}
