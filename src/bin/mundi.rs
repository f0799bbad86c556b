//! Mundi command line
//!
//! Thin adapter over the query surface of [`mundi::Context`].
//!
//! # Commands
//!
//! - `resolve <REF>...` - Print the canonical id of each reference
//! - `region <REF>` - Print a region as JSON
//! - `children <REF> [--relation R]` - List children in a relation
//! - `collect <DATASET>...` - Merge staged chunks into canonical tables
//! - `check-config` - Validate the configuration file
//!
//! # Configuration
//!
//! Read from `--config`, else from the `MUNDI_CONFIG` environment variable,
//! else defaults. Environment overrides apply in every case.
//!
//! Failures print `<ErrorKind>: <message>` and exit with status 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mundi::config::Config;
use mundi::error::StoreError;
use mundi::store::JsonDirStore;
use mundi::types::DEFAULT_RELATION;
use mundi::Context;
use tracing::debug;

#[derive(Parser)]
#[command(name = "mundi")]
#[command(version)]
#[command(about = "Region registry, code resolution and hierarchical aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides MUNDI_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory path
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve references to canonical region ids
    Resolve {
        /// References (codes, names, country/division paths)
        #[arg(required = true)]
        references: Vec<String>,
    },

    /// Show one region
    Region {
        /// Region reference
        reference: String,
    },

    /// List the children of a region
    Children {
        /// Region reference
        reference: String,

        /// Relation to follow
        #[arg(short, long, default_value = DEFAULT_RELATION)]
        relation: String,
    },

    /// Collect staged chunks into canonical dataset tables
    Collect {
        /// Dataset names (all declared datasets when omitted)
        datasets: Vec<String>,
    },

    /// Validate configuration file
    CheckConfig,
}

fn load_config(cli: &Cli) -> mundi::Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("MUNDI_CONFIG").map(PathBuf::from));

    let mut config = match path {
        Some(path) => Config::from_file_with_env(&path.to_string_lossy())?,
        None => Config::from_env(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.store.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_check_config(config: &Config) {
    println!("Configuration is valid!");
    println!();
    println!("Store:");
    println!("  Data directory: {:?}", config.store.data_dir);
    println!();
    println!("Resolver:");
    println!("  Cache capacity: {}", config.resolver.cache_capacity);
    println!("  Type priority: {}", config.resolver.type_priority.join(" > "));
    println!();
    println!("Aggregation:");
    println!("  Relation order: {}", config.aggregation.relation_order.join(", "));
    println!("  Iteration margin: {}", config.aggregation.iteration_margin);
    println!("  Repair levels: {}", config.aggregation.repair_levels);
    println!();
    println!("Collector:");
    println!("  Backfill: {}", config.collector.backfill);
    println!("  Global scope: {}", config.collector.global_scope);
    println!();
    println!("Datasets: {}", config.datasets.len());
    for schema in &config.datasets {
        println!("  {} ({} columns)", schema.name, schema.columns.len());
    }
    println!("Log level: {}", config.logging.log_level);
}

fn cmd_collect(context: &Context, config: &Config, datasets: &[String]) -> mundi::Result<bool> {
    let datasets = if datasets.is_empty() {
        context.schemas().names()
    } else {
        datasets.to_vec()
    };
    let chunks = JsonDirStore::open(&config.store.data_dir)?;
    let report = context
        .collector()
        .collect_all(&datasets, &chunks, context.tables());

    for (dataset, rows) in &report.collected {
        println!("{}: {} rows", dataset, rows);
    }
    for (dataset, error) in &report.failed {
        eprintln!("{}: {}: {}", dataset, error.kind(), error);
    }
    Ok(report.is_success())
}

fn run(cli: &Cli, config: &Config) -> mundi::Result<bool> {
    if let Commands::CheckConfig = cli.command {
        cmd_check_config(config);
        return Ok(true);
    }

    let context = Context::from_config(config)?;
    debug!(regions = context.regions().len(), "Context ready");

    match &cli.command {
        Commands::Resolve { references } => {
            for reference in references {
                println!("{}", context.resolve(reference)?);
            }
        },
        Commands::Region { reference } => {
            let region = context.region(reference)?;
            let json = serde_json::to_string_pretty(region).map_err(StoreError::from)?;
            println!("{}", json);
        },
        Commands::Children {
            reference,
            relation,
        } => {
            for child in context.children(reference, relation)? {
                println!("{}", child);
            }
        },
        Commands::Collect { datasets } => return cmd_collect(&context, config, datasets),
        Commands::CheckConfig => {},
    }
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            return ExitCode::FAILURE;
        },
    };
    init_logging(&config);

    match run(&cli, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            ExitCode::FAILURE
        },
    }
}
