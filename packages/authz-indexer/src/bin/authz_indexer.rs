//! Authorization indexer CLI
//!
//! # Usage
//!
//! ```bash
//! # Rebuild every authorization index
//! authz-indexer --db authz.db --config authz.yaml reindex
//!
//! # Rebuild only the issues index
//! authz-indexer --db authz.db reindex --index issues
//!
//! # One recovery pass / recovery daemon
//! authz-indexer --db authz.db recover
//! authz-indexer --db authz.db daemon
//! ```

use authz_indexer::{
    IndexType, IndexerConfig, IndexingResult, PermissionIndexer, RecoveryIndexer,
    ResilientIndexer, ScopeRegistry, TantivyAuthorizationIndex,
};
use authz_storage::{RecoveryQueue, SqliteAuthorizationStore};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "authz-indexer")]
#[command(about = "Authorization indexing - full rebuilds and search recovery", long_about = None)]
struct Cli {
    /// SQLite database
    #[arg(long)]
    db: PathBuf,

    /// YAML configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild authorization indexes
    Reindex {
        /// Index name (issues, projectmeasures, components); all when omitted
        #[arg(long = "index")]
        indexes: Vec<String>,
    },

    /// Run one recovery pass
    Recover,

    /// Run the recovery loop until Ctrl-C
    Daemon,

    /// Number of pending recovery items
    QueueSize,
}

fn print_result(command: &str, result: &IndexingResult) {
    println!(
        "{}",
        json!({
            "command": command,
            "total": result.total(),
            "successes": result.successes(),
            "failures": result.failures(),
        })
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IndexerConfig::from_yaml_file(path)?,
        None => IndexerConfig::default(),
    };

    let store = Arc::new(SqliteAuthorizationStore::new(&cli.db)?);
    let backend = Arc::new(TantivyAuthorizationIndex::open(config.index_dir.as_deref())?);
    let registry = Arc::new(ScopeRegistry::default_scopes()?);
    let indexer = Arc::new(PermissionIndexer::new(
        store.clone(),
        store.clone(),
        backend,
        registry.clone(),
        &config,
    ));

    match cli.command {
        Commands::Reindex { indexes } => {
            let selected: HashSet<IndexType> = if indexes.is_empty() {
                registry.index_types().into_iter().collect()
            } else {
                indexes.iter().map(IndexType::authorization).collect()
            };
            if let Some(unknown) = selected.iter().find(|t| registry.find(t).is_none()) {
                anyhow::bail!("No authorization index named '{}'", unknown.index());
            }
            let result = indexer.index_all(&selected).await?;
            print_result("reindex", &result);
        }
        Commands::Recover => {
            let recovery = RecoveryIndexer::new(
                store.clone(),
                vec![indexer.clone() as Arc<dyn ResilientIndexer>],
                config.recovery.clone(),
            );
            let result = recovery.recover().await?;
            print_result("recover", &result);
        }
        Commands::Daemon => {
            let recovery = RecoveryIndexer::new(
                store.clone(),
                vec![indexer.clone() as Arc<dyn ResilientIndexer>],
                config.recovery.clone(),
            );
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                }
                signal.cancel();
            });
            recovery.run(shutdown).await;
        }
        Commands::QueueSize => {
            let size = store.count().await?;
            println!("{}", json!({ "queue_size": size }));
        }
    }

    Ok(())
}
