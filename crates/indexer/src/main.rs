//! Stakedrop Indexer - staking event ingestion and reward epoch generation
//!
//! This binary provides:
//! - Event listening for the staking contract
//! - Referral graph maintenance
//! - Operator commands for epoch generation and publication bookkeeping
//!
//! Note: The HTTP API is provided by the separate `stakedrop-api` service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use stakedrop_core::EpochKind;
use stakedrop_indexer::config::{Config, LoggingConfig};
use stakedrop_indexer::listener::{RetryPolicy, RpcProvider, SyncEngine};
use stakedrop_indexer::storage::Storage;
use stakedrop_indexer::{generate_epoch, ReferralMaintainer};
use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://stakedrop.db";

#[derive(Parser)]
#[command(name = "stakedrop-indexer")]
#[command(version, about = "Stakedrop indexer and reward epoch tooling", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer service
    Run,

    /// Show indexer status and sync progress
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = DEFAULT_DATABASE_URL)]
        database_url: String,
    },

    /// Generate and store a reward epoch from the current snapshot
    GenerateEpoch {
        /// Reward stream: standard or vip
        #[arg(long)]
        kind: EpochKind,

        /// Pool size in token smallest units
        #[arg(long)]
        total_amount: String,
    },

    /// Record the epoch id the contract assigned at publication
    SetEpochId {
        /// Reward stream the epoch belongs to
        #[arg(long)]
        kind: EpochKind,

        /// Id of the epoch within its kind
        #[arg(long)]
        database_epoch_id: u64,

        /// Epoch id used on-chain
        #[arg(long)]
        blockchain_epoch_id: u64,
    },

    /// Recompute referral counts for every user
    RecalculateReferrals,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, &load_logging_config(&cli.config))?;

    info!("Stakedrop Indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_indexer(&cli.config).await?,
        Commands::Status => show_status(&cli.config).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
        Commands::GenerateEpoch { kind, total_amount } => {
            generate_epoch_command(&cli.config, kind, &total_amount).await?
        }
        Commands::SetEpochId {
            kind,
            database_epoch_id,
            blockchain_epoch_id,
        } => set_epoch_id(&cli.config, kind, database_epoch_id, blockchain_epoch_id).await?,
        Commands::RecalculateReferrals => recalculate_referrals(&cli.config).await?,
    }

    Ok(())
}

/// Read only the `[logging]` section so logging is up before full validation.
fn load_logging_config(config_path: &str) -> LoggingConfig {
    #[derive(Deserialize)]
    struct LoggingSection {
        #[serde(default)]
        logging: LoggingConfig,
    }

    let mut logging = std::fs::read_to_string(config_path)
        .ok()
        .and_then(|contents| toml::from_str::<LoggingSection>(&contents).ok())
        .map(|section| section.logging)
        .unwrap_or_default();

    if let Ok(level) = std::env::var("STAKEDROP_LOG_LEVEL") {
        logging.level = level;
    }
    if let Ok(format) = std::env::var("STAKEDROP_LOG_FORMAT") {
        logging.format = format;
    }

    logging
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("stakedrop_indexer=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "stakedrop_indexer={level},sqlx=warn",
                level = logging.level.to_lowercase()
            ))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}

/// Connect to the configured database and bring the schema up to date.
async fn connect(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Open the database named by the config, or the default one when the
/// config file does not exist.
///
/// Commands that never touch the chain can run without a config file.
async fn open_storage(config_path: &str) -> Result<Storage> {
    match Config::from_file(config_path) {
        Ok(config) => {
            info!("Using database from config: {}", config.database.url);
            connect(&config).await
        }
        Err(e) => {
            // Config::from_file wraps errors with context; walk the chain
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if !is_not_found {
                return Err(e).context("Failed to load config file");
            }

            let database_url = std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
            info!("Config file not found, using database: {}", database_url);

            let storage = Storage::new(&database_url, None, None)
                .await
                .context("Failed to connect to database")?;
            storage
                .run_migrations()
                .await
                .context("Failed to run migrations")?;
            Ok(storage)
        }
    }
}

/// Main indexer service - runs the event sync loop
async fn run_indexer(config_path: &str) -> Result<()> {
    info!("Starting indexer service with config: {}", config_path);

    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Chain ID: {}", config.network.chain_id);
    info!("  RPC URL: {}", config.network.rpc_url);
    info!("  Staking contract: {}", config.contracts.staking);
    info!("  Database: {}", config.database.url);
    match config.sync.start_block {
        Some(start_block) => info!("  Start block: {}", start_block),
        None => info!(
            "  Start block: head - {} on a fresh database",
            config.sync.cold_start_lookback
        ),
    }

    let storage = connect(&config).await?;
    info!("Database initialized");

    let provider = RpcProvider::new(
        &config.network.rpc_url,
        config.contracts.staking,
        RetryPolicy::from_sync_config(&config.sync),
    )
    .context("Failed to create RPC provider")?;

    info!("RPC provider initialized");

    let sync_engine = SyncEngine::new(provider, storage.clone(), config);
    let sync_handle = tokio::spawn(async move { sync_engine.run().await });

    info!("Indexer is running. Press Ctrl+C to stop.");
    info!("For API queries, run the stakedrop-api service separately.");

    tokio::select! {
        result = sync_handle => {
            // Sync task completed (either error or unexpected exit)
            storage.close().await;
            match result {
                Ok(Ok(())) => {
                    warn!("Sync engine exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Sync engine failed"),
                Err(e) => Err(anyhow::anyhow!("Sync task panicked: {}", e)),
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            storage.close().await;
            Ok(())
        }
    }
}

/// Show indexer status and sync progress
async fn show_status(config_path: &str) -> Result<()> {
    info!("Checking indexer status");

    let storage = open_storage(config_path).await?;

    let sync_state = storage.get_sync_state().await?;
    let stats = storage.stats().await?;

    println!("\n=== Stakedrop Indexer Status ===\n");
    println!("Sync Progress:");
    println!("  Chain ID: {}", sync_state.chain_id);
    if sync_state.initialized {
        println!("  Next Block: {}", sync_state.next_block);
    } else {
        println!("  Next Block: (not started)");
    }
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(sync_state.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nDatabase Statistics:");
    println!("  Users: {}", stats.user_count);
    println!("  Active Stakes: {}", stats.active_stake_count);
    println!("  Epochs: {}", stats.epoch_count);
    println!("  Recorded Claims: {}", stats.claim_count);

    for kind in [EpochKind::Standard, EpochKind::Vip] {
        match storage.get_latest_epoch(kind).await? {
            Some(epoch) => {
                println!("\nLatest {} Epoch:", kind);
                println!("  Epoch ID: {}", epoch.id);
                match epoch.blockchain_epoch_id {
                    Some(id) => println!("  On-chain ID: {}", id),
                    None => println!("  On-chain ID: (not published)"),
                }
                println!("  Merkle Root: {}", epoch.merkle_root);
                println!("  Recipients: {}", epoch.recipients.len());
                println!("  Pool: {}", epoch.total_amount);
                println!("  Distributed: {}", epoch.distributed_amount);
            }
            None => println!("\nNo {} epochs generated yet.", kind),
        }
    }

    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Users: {}", stats.user_count);
    info!("  Epochs: {}", stats.epoch_count);
    info!("  Next block: {}", stats.next_block);

    storage.close().await;

    Ok(())
}

/// Generate an epoch and print its summary as JSON
async fn generate_epoch_command(config_path: &str, kind: EpochKind, total_amount: &str) -> Result<()> {
    let storage = open_storage(config_path).await?;

    let result = generate_epoch(&storage, kind, total_amount).await;
    storage.close().await;
    let generated = result.context("Failed to generate epoch")?;

    let summary = serde_json::json!({
        "epochId": generated.id,
        "kind": kind,
        "merkleRoot": generated.epoch.merkle_root,
        "totalAmount": generated.epoch.total_amount.to_string(),
        "distributedAmount": generated.epoch.distributed_amount.to_string(),
        "recipientCount": generated.epoch.recipients.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Record the on-chain id of a published epoch
async fn set_epoch_id(
    config_path: &str,
    kind: EpochKind,
    database_epoch_id: u64,
    blockchain_epoch_id: u64,
) -> Result<()> {
    let storage = open_storage(config_path).await?;

    let updated = storage
        .set_blockchain_epoch_id(kind, database_epoch_id, blockchain_epoch_id)
        .await;
    storage.close().await;

    if !updated? {
        anyhow::bail!("{} epoch {} not found", kind, database_epoch_id);
    }

    info!(
        kind = %kind,
        database_epoch_id,
        blockchain_epoch_id, "Recorded on-chain epoch id"
    );

    Ok(())
}

/// Recompute referral counts from the full graph
async fn recalculate_referrals(config_path: &str) -> Result<()> {
    let storage = open_storage(config_path).await?;

    let result = ReferralMaintainer::new(storage.clone()).recalculate_all().await;
    storage.close().await;

    println!("Updated referral counts for {} users", result?);

    Ok(())
}
