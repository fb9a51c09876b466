use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use payment_initiation::application::service::{InitiatePaymentOrderCommand, PaymentOrderService};
use payment_initiation::domain::payment_order::{PaymentOrderId, StatusTransition};
use payment_initiation::domain::ports::{IdempotencyStoreBox, OrderStoreBox};
use payment_initiation::infrastructure::in_memory::{InMemoryIdempotencyStore, InMemoryOrderStore};
use payment_initiation::interfaces::csv::command_reader::CommandReader;
use payment_initiation::interfaces::csv::order_writer::OrderWriter;
use payment_initiation::telemetry;
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "PAYMENTS_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initiate a single payment order and print it as CSV
    Initiate {
        #[arg(long)]
        reference: String,
        /// Debtor IBAN
        #[arg(long)]
        debtor: String,
        /// Creditor IBAN
        #[arg(long)]
        creditor: String,
        #[arg(long)]
        amount: Decimal,
        /// ISO 4217 currency code
        #[arg(long)]
        currency: String,
        #[arg(long)]
        remittance: Option<String>,
        /// Requested execution date (YYYY-MM-DD)
        #[arg(long)]
        execution_date: NaiveDate,
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Initiate every payment order listed in a CSV file
    Batch {
        /// Input CSV file
        input: PathBuf,
    },
    /// Print a payment order
    Get { order_id: String },
    /// Print the status of a payment order
    Status { order_id: String },
    /// Move a payment order to a new status (processing, settled, rejected, cancel)
    Transition {
        order_id: String,
        transition: StatusTransition,
    },
}

fn build_service(db_path: Option<PathBuf>) -> Result<PaymentOrderService> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        use payment_initiation::infrastructure::rocksdb::RocksDBStore;

        // Use persistent storage (RocksDB)
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        let order_store: OrderStoreBox = Box::new(store.clone());
        let idempotency_store: IdempotencyStoreBox = Box::new(store);
        return Ok(PaymentOrderService::new(order_store, idempotency_store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
        );
    }

    // Use in-memory storage
    let order_store: OrderStoreBox = Box::new(InMemoryOrderStore::new());
    let idempotency_store: IdempotencyStoreBox = Box::new(InMemoryIdempotencyStore::new());
    Ok(PaymentOrderService::new(order_store, idempotency_store))
}

fn parse_order_id(raw: &str) -> Result<PaymentOrderId> {
    PaymentOrderId::of(raw).into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();
    let service = build_service(cli.db_path)?;

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());

    match cli.command {
        Command::Initiate {
            reference,
            debtor,
            creditor,
            amount,
            currency,
            remittance,
            execution_date,
            idempotency_key,
        } => {
            let command = InitiatePaymentOrderCommand {
                reference: Some(reference),
                debtor_account: Some(debtor),
                creditor_account: Some(creditor),
                amount: Some(amount),
                currency: Some(currency),
                remittance_information: remittance,
                requested_execution_date: Some(execution_date),
                idempotency_key,
            };
            let order = service.initiate(command).await.into_diagnostic()?;
            writer.write_orders([&order]).into_diagnostic()?;
        }
        Command::Batch { input } => {
            let file = File::open(input).into_diagnostic()?;
            let reader = CommandReader::new(file);
            for (row, command) in reader.commands().enumerate() {
                // Row numbers are 1-based and skip the header.
                let row = row + 1;
                match command {
                    Ok(command) => match service.initiate(command).await {
                        Ok(order) => writer.write_order(&order).into_diagnostic()?,
                        Err(e) => error!(row, error = %e, "Error processing payment order"),
                    },
                    Err(e) => error!(row, error = %e, "Error reading payment order command"),
                }
            }
            writer.flush().into_diagnostic()?;
        }
        Command::Get { order_id } => {
            let order = service
                .retrieve(&parse_order_id(&order_id)?)
                .await
                .into_diagnostic()?;
            writer.write_orders([&order]).into_diagnostic()?;
        }
        Command::Status { order_id } => {
            let status = service
                .retrieve_status(&parse_order_id(&order_id)?)
                .await
                .into_diagnostic()?;
            writer.write_status(&status).into_diagnostic()?;
        }
        Command::Transition {
            order_id,
            transition,
        } => {
            let order = service
                .transition(&parse_order_id(&order_id)?, transition)
                .await
                .into_diagnostic()?;
            writer.write_orders([&order]).into_diagnostic()?;
        }
    }

    Ok(())
}
