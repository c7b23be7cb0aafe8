//! Account balances, point-to-point transfers between them and bulk account
//! import from CSV.

pub mod compute;
pub mod data;
pub mod import;
pub mod read;
pub mod sqlite;
pub mod store;
pub mod write;

pub use compute::{open_account, transfer};
pub use data::{parse_amount, Account, ImportError, NewAccount, Transaction, TransferError};
pub use import::{import_accounts, ImportReport};
pub use sqlite::SqliteStore;
pub use store::{LedgerStore, MemoryStore, StoreError, WriteOp, WriteSummary};
pub use write::write_accounts;
