use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledger::{
    import_accounts, open_account, parse_amount, transfer, write_accounts, LedgerStore,
    NewAccount, SqliteStore,
};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

/// Account balances and transfers, backed by SQLite.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the ledger SQLite database.
    #[arg(long, env = "LEDGER_DB", default_value = "ledger.sqlite3")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update accounts from a CSV file with ID, Name and Balance columns.
    Import { file: PathBuf },
    /// Move money from one account to another.
    Transfer {
        sender: String,
        recipient: String,
        amount: String,
    },
    /// Open a single account.
    Open {
        reference: String,
        name: String,
        #[arg(default_value = "0.00")]
        balance: Decimal,
    },
    /// List every account, newest first.
    Accounts,
    /// Show one account and its transactions.
    Account { reference: String },
    /// Write every account to stdout as CSV.
    Export,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), anyhow::Error> {
    setup_logging();
    let args = Args::parse();
    let mut store = SqliteStore::open(&args.db_path)?;
    tracing::debug!("Opened ledger at {}", args.db_path.display());

    match args.command {
        Command::Import { file } => {
            let bytes = std::fs::read(&file)?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let report = import_accounts(&mut store, &file_name, &bytes)
                .map_err(|e| anyhow::anyhow!("Error importing accounts: {e}"))?;
            println!("{report}");
            if let Some(warning) = report.warning() {
                println!("Warning: {warning}");
            }
        }
        Command::Transfer {
            sender,
            recipient,
            amount,
        } => {
            let amount = match parse_amount(&amount) {
                Ok(amount) => amount,
                Err(e) => {
                    tracing::warn!("Rejected transfer amount '{amount}': {e}");
                    anyhow::bail!("{e}");
                }
            };
            let tx = transfer(&mut store, &sender, &recipient, amount)
                .map_err(|e| anyhow::anyhow!("Error making transaction: {e}"))?;
            println!("Transaction Completed Successfully: {tx}");
        }
        Command::Open {
            reference,
            name,
            balance,
        } => {
            if balance < Decimal::ZERO {
                anyhow::bail!("Balance cannot be negative.");
            }
            let Some(balance) = ledger::data::to_money(balance) else {
                anyhow::bail!("Balance {balance} is too large to be kept in cents.");
            };
            let account = open_account(
                &mut store,
                NewAccount {
                    reference,
                    name,
                    balance,
                },
            )?;
            println!("{account}");
        }
        Command::Accounts => {
            for account in store.list_accounts()? {
                println!("{account}");
            }
        }
        Command::Account { reference } => {
            let Some(account) = store.get_account(&reference)? else {
                anyhow::bail!("No account with reference '{reference}'");
            };
            println!("{account}");
            for tx in store.transactions_for(&reference)? {
                println!("  {} {tx}", tx.created);
            }
        }
        Command::Export => {
            write_accounts(std::io::stdout(), &store.list_accounts()?)?;
        }
    }
    Ok(())
}
