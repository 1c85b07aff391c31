//! Query runner for entity snapshots
//!
//! Loads an entity snapshot (JSON), runs every statement of a query file against it and
//! prints the results as JSON.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin th-query -- snapshot.json query.thq
//!
//! # Through the memory drivers instead of the snapshot directly
//! cargo run --bin th-query -- snapshot.json query.thq --drivers
//!
//! # With engine/driver settings
//! cargo run --bin th-query -- snapshot.json query.thq --config trakhound.json
//! TRAKHOUND_CONFIG=trakhound.json cargo run --bin th-query -- snapshot.json query.thq
//! ```
//!
//! Logging follows `RUST_LOG` and defaults to `info`.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use trakhound_core::drivers::{ContentDrivers, ObjectDriver};
use trakhound_core::models::CollectionSnapshot;
use trakhound_core::{subscription_expressions, DriverClient, EntityCollection, QueryEngine, QueryScope, TrakHoundConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "th-query")]
#[command(about = "Run a query file against an entity snapshot and print the results as JSON")]
struct Cli {
    /// Entity snapshot (JSON)
    snapshot: PathBuf,
    /// Query text file
    query: PathBuf,
    /// Execute through the memory drivers instead of the snapshot directly
    #[arg(long, default_value_t = false)]
    drivers: bool,
    /// Engine/driver settings (JSON); falls back to `TRAKHOUND_CONFIG`
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_snapshot(path: &Path) -> anyhow::Result<EntityCollection> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: CollectionSnapshot = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
    Ok(snapshot.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var_os("TRAKHOUND_CONFIG").map(PathBuf::from));
    let config = match config_path {
        Some(path) => TrakHoundConfig::from_json_file(&path)?,
        None => TrakHoundConfig::default(),
    };

    let collection = load_snapshot(&args.snapshot)?;
    let query = std::fs::read_to_string(&args.query)
        .with_context(|| format!("Failed to read query file {}", args.query.display()))?;
    tracing::info!(
        "Loaded {} object(s) and {} content record(s)",
        collection.object_count(),
        collection.content_count()
    );

    let scope = QueryScope::create(&query);
    for expression in subscription_expressions(&scope) {
        tracing::debug!("Reads {}", expression);
    }

    let engine = QueryEngine::new(config.engine.clone());
    let results = if args.drivers {
        let client = DriverClient::new(
            ObjectDriver::new(config.driver.clone()),
            ContentDrivers::new(config.driver.clone()),
            collection,
        );
        let results = engine.query_remote(&query, &client, CancellationToken::new()).await;

        let stats = client.objects().index_stats().await?;
        tracing::info!("Object index after run: {:?}", stats);
        client.objects().dispose().await;
        client.contents().dispose().await;
        results
    } else {
        engine.query_local(&query, &collection)
    };

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from(["th-query", "snap.json", "area.thq", "--drivers"]).unwrap();
        assert_eq!(cli.snapshot, PathBuf::from("snap.json"));
        assert_eq!(cli.query, PathBuf::from("area.thq"));
        assert!(cli.drivers);
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from(["th-query", "snap.json", "area.thq", "--config", "th.json"]).unwrap();
        assert!(!cli.drivers);
        assert_eq!(cli.config, Some(PathBuf::from("th.json")));
    }

    #[test]
    fn test_missing_query_path_is_rejected() {
        assert!(Cli::try_parse_from(["th-query", "snap.json"]).is_err());
    }
}
