//! Follow-graph main entry point
//!
//! This is the command-line interface for crawling and querying the GitHub
//! follow graph.

use clap::{Parser, Subcommand};
use follow_graph::config::{load_config_with_hash, Config};
use follow_graph::crawler::build_crawler;
use follow_graph::output::{load_statistics, print_statistics, print_users};
use follow_graph::query::{sort_users, DistanceQueryEngine, UserOrder};
use follow_graph::storage::{open_storage, share, SqliteStorage};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Follow-graph: an incremental GitHub follower graph
///
/// Follow-graph crawls follower/following relations outward from a seed
/// account into a local SQLite database, using etags so repeat crawls only
/// download what changed, and answers hop-distance queries over the result.
#[derive(Parser, Debug)]
#[command(name = "follow-graph")]
#[command(version)]
#[command(about = "An incremental GitHub follower graph", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl outward from a seed account
    Crawl {
        /// Login of the seed account
        login: String,

        /// Hops to expand (defaults to crawler.max-depth)
        depth: Option<u32>,

        /// Ignore stored etags and rebuild edge sets
        #[arg(long)]
        force: bool,
    },

    /// List users exactly DISTANCE hops from an account
    At {
        login: String,
        distance: u32,

        /// Sort by login, github-id, followers or following
        #[arg(long, default_value = "login")]
        order_by: UserOrder,
    },

    /// List users 1 to DISTANCE hops from an account
    Within {
        login: String,
        distance: u32,

        /// Sort by login, github-id, followers or following
        #[arg(long, default_value = "login")]
        order_by: UserOrder,
    },

    /// Show statistics from the database and exit
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Crawl {
            login,
            depth,
            force,
        } => {
            let depth = depth.unwrap_or(config.crawler.max_depth);
            let force = force || config.crawler.force_refresh;
            handle_crawl(&config, &config_hash, &login, depth, force).await?;
        }
        Command::At {
            login,
            distance,
            order_by,
        } => {
            let storage = open_database(&config)?;
            let mut users = DistanceQueryEngine::new(&storage).users_at_distance(&login, distance)?;
            sort_users(&mut users, order_by);
            print_users(&users);
        }
        Command::Within {
            login,
            distance,
            order_by,
        } => {
            let storage = open_database(&config)?;
            let mut users =
                DistanceQueryEngine::new(&storage).users_within_distance(&login, distance)?;
            sort_users(&mut users, order_by);
            print_users(&users);
        }
        Command::Stats => handle_stats(&config)?,
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
            0 => EnvFilter::new("follow_graph=info,warn"),
            1 => EnvFilter::new("follow_graph=debug,info"),
            2 => EnvFilter::new("follow_graph=trace,debug"),
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

fn open_database(config: &Config) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
    tracing::debug!("Opening database: {}", config.output.database_path);
    Ok(open_storage(Path::new(&config.output.database_path))?)
}

/// Handles the stats subcommand: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the crawl subcommand
///
/// Ctrl-C cancels the token shared with the fetcher, which aborts a pending
/// rate-limit wait and stops the crawl before the next node.
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    login: &str,
    depth: u32,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = share(open_database(config)?);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl (press Ctrl-C again to exit now)");
            interrupt.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let mut crawler = build_crawler(config, config_hash, store, cancel).await?;

    match crawler.crawl(login, depth, force).await {
        Ok(report) => {
            println!(
                "Crawl run {} finished: {} visits, {} profiles refreshed, {} new edges",
                report.run_id, report.visited, report.profiles_refreshed, report.edges_added
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
