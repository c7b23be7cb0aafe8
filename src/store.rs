use crate::data::{Account, AccountId, NewAccount, NewTransaction, Transaction, TxId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

/// One write of a batch handed to `LedgerStore::atomic_write`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    CreateAccount(NewAccount),
    UpdateAccount {
        reference: String,
        name: String,
        balance: Decimal,
    },
    SetBalance {
        reference: String,
        balance: Decimal,
    },
    InsertTransaction(NewTransaction),
}

/// What a successful batch did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub created: usize,
    pub updated: usize,
    pub transactions: Vec<Transaction>,
}

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("An account with reference '{0}' already exists")]
    DuplicateReference(String),
    #[error("No account with reference '{0}'")]
    AccountNotFound(String),
    #[error("Batch committed without reporting the transaction it recorded")]
    MissingReceipt,
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Durable home of accounts and transactions. Reads are plain lookups; every
/// mutation goes through `atomic_write`, which applies the whole batch or
/// nothing at all.
///
/// Nothing here locks between a read and a later `atomic_write`: callers that
/// compute new values from what they read rely on the store's own transaction
/// isolation for whatever protection they get.
pub trait LedgerStore {
    fn get_account(&self, reference: &str) -> Result<Option<Account>, StoreError>;

    /// All accounts, newest first.
    fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Transactions sent or received by the account, oldest first.
    fn transactions_for(&self, reference: &str) -> Result<Vec<Transaction>, StoreError>;

    fn atomic_write(&mut self, ops: Vec<WriteOp>) -> Result<WriteSummary, StoreError>;
}

/// A `LedgerStore` that lives in memory, mostly for tests and dry runs.
/// Batches are applied on a copy which replaces the live state only once
/// every op went through.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accounts: BTreeMap<String, Account>,
    transactions: Vec<Transaction>,
    next_account_id: AccountId,
    next_tx_id: TxId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&mut self, op: WriteOp, summary: &mut WriteSummary) -> Result<(), StoreError> {
        match op {
            WriteOp::CreateAccount(new) => {
                if self.accounts.contains_key(&new.reference) {
                    return Err(StoreError::DuplicateReference(new.reference));
                }
                self.next_account_id += 1;
                let account = Account {
                    id: self.next_account_id,
                    reference: new.reference.clone(),
                    name: new.name,
                    balance: new.balance,
                };
                self.accounts.insert(new.reference, account);
                summary.created += 1;
            }
            WriteOp::UpdateAccount {
                reference,
                name,
                balance,
            } => {
                let account = self
                    .accounts
                    .get_mut(&reference)
                    .ok_or(StoreError::AccountNotFound(reference))?;
                account.name = name;
                account.balance = balance;
                summary.updated += 1;
            }
            WriteOp::SetBalance { reference, balance } => {
                let account = self
                    .accounts
                    .get_mut(&reference)
                    .ok_or(StoreError::AccountNotFound(reference))?;
                account.balance = balance;
                summary.updated += 1;
            }
            WriteOp::InsertTransaction(new) => {
                for reference in [&new.sender, &new.recipient] {
                    if !self.accounts.contains_key(reference) {
                        return Err(StoreError::AccountNotFound(reference.clone()));
                    }
                }
                self.next_tx_id += 1;
                let tx = Transaction {
                    id: self.next_tx_id,
                    sender: new.sender,
                    recipient: new.recipient,
                    amount: new.amount,
                    created: new.created,
                };
                self.transactions.push(tx.clone());
                summary.transactions.push(tx);
            }
        }
        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, reference: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(reference).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(accounts)
    }

    fn transactions_for(&self, reference: &str) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|tx| tx.sender == reference || tx.recipient == reference)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    fn atomic_write(&mut self, ops: Vec<WriteOp>) -> Result<WriteSummary, StoreError> {
        let mut staged = self.clone();
        let mut summary = WriteSummary::default();
        for op in ops {
            staged.apply(op, &mut summary)?;
        }
        *self = staged;
        Ok(summary)
    }
}
