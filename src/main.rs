use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tierledger::application::dialog::DialogEngine;
use tierledger::application::service::AccountService;
use tierledger::config::ServiceConfig;
use tierledger::domain::ports::AccountStoreBox;
use tierledger::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryConversationStore, RecordingNotifier,
};
use tierledger::interfaces::csv::account_writer::AccountWriter;
use tierledger::interfaces::csv::event_reader::EventReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input events CSV file (`kind, account, data`)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON service configuration. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Echo every outbound message to stderr.
    #[arg(long)]
    transcript: bool,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<AccountStoreBox> {
    use tierledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        None => Ok(Box::new(InMemoryAccountStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<AccountStoreBox> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryAccountStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path).into_diagnostic()?,
        None => ServiceConfig::default(),
    };
    let store = open_store(cli.db_path)?;
    let notifier = RecordingNotifier::new();
    let service = AccountService::new(store, Box::new(notifier.clone()), config);
    let engine = DialogEngine::new(
        Arc::new(service),
        Box::new(InMemoryConversationStore::new()),
    );

    // Replay events
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for (row, event) in reader.events().enumerate() {
        match event {
            Ok(event) => {
                if let Err(e) = event.apply(&engine).await {
                    eprintln!("Error processing row {}: {}", row + 1, e);
                }
            }
            Err(e) => {
                eprintln!("Error reading row {}: {}", row + 1, e);
            }
        }
        let sent = notifier.drain().await;
        if cli.transcript {
            for (to, text) in sent {
                eprintln!("-> {to}: {}", text.replace('\n', " | "));
            }
        }
    }

    // Output final state
    let accounts = engine.service().accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}
