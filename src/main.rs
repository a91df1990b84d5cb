use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderledger::application;
use orderledger::config::LedgerConfig;
use orderledger::domain::ports::{LedgerStoreBox, NotifierRef, OrderStoreBox};
use orderledger::domain::transaction::TransactionFilter;
use orderledger::infrastructure::in_memory::InMemoryStore;
use orderledger::infrastructure::notify::ChannelNotifier;
use orderledger::interfaces::commands::CommandReader;
use orderledger::interfaces::csv::log_writer::LogWriter;
use orderledger::interfaces::csv::wallet_writer::WalletWriter;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command file, one JSON object per line
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ORDERLEDGER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Smallest withdrawal a vendor may request
    #[arg(long, env = "ORDERLEDGER_MIN_WITHDRAWAL", default_value = "100")]
    min_withdrawal: Decimal,

    /// Platform commission taken from each vendor's gross, between 0 and 1
    #[arg(long, env = "ORDERLEDGER_COMMISSION_RATE", default_value = "0")]
    commission_rate: Decimal,

    /// Also export every vendor's transaction log to this CSV file
    #[arg(long)]
    transactions_out: Option<PathBuf>,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreBox, LedgerStoreBox)> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = orderledger::infrastructure::rocksdb::RocksDBStore::open(path)?;
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => Err(miette::miette!(
            help = "rebuild with `--features storage-rocksdb`",
            "persistent storage is not compiled in"
        )),
        None => {
            let store = InMemoryStore::new();
            Ok((Box::new(store.clone()), Box::new(store)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orderledger=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = LedgerConfig {
        min_withdrawal: cli.min_withdrawal,
        commission_rate: cli.commission_rate,
        ..Default::default()
    };

    let (orders, ledger_store) = open_stores(cli.db_path)?;
    let (notifier, dispatcher) = ChannelNotifier::spawn(config.notification_buffer);
    let notifier: NotifierRef = Arc::new(notifier);
    let service = application::build(&config, orders, ledger_store, notifier)?;

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    let (mut applied, mut failed) = (0usize, 0usize);
    for (line, command) in reader.commands() {
        let outcome = match command {
            Ok(command) => command.execute(&service).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(summary) => {
                applied += 1;
                info!(line, %summary, "command applied");
            }
            Err(e) => {
                failed += 1;
                eprintln!("Error processing command on line {line}: {e}");
            }
        }
    }

    let wallets = service.ledger().all_wallets().await?;
    for wallet in &wallets {
        let check = service.ledger().reconcile(&wallet.vendor).await?;
        if !check.is_balanced() {
            warn!(vendor = %wallet.vendor, ?check, "wallet does not match its log");
        }
    }

    if let Some(path) = cli.transactions_out {
        let mut log = Vec::new();
        for wallet in &wallets {
            log.extend(
                service
                    .ledger()
                    .list_transactions(&wallet.vendor, &TransactionFilter::default())
                    .await?
                    .into_iter()
                    .rev(),
            );
        }
        let file = File::create(path).into_diagnostic()?;
        LogWriter::new(file).write_log(&log)?;
    }

    let stdout = io::stdout();
    WalletWriter::new(stdout.lock()).write_wallets(&wallets)?;

    drop(service);
    let delivered = dispatcher.await.into_diagnostic()?;
    info!(applied, failed, delivered, "replay finished");

    Ok(())
}
