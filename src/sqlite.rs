//! SQLite backed `LedgerStore`.
//!
//! Money is kept as decimal TEXT and converted with `rust_decimal` on the way
//! in and out. SQLite has no decimal type: a column declared NUMERIC or REAL
//! ends up holding a binary float, and `0.1 + 0.2` style drift in a balance
//! is exactly what a ledger can't have. Integer cents would work too, but
//! then every read and write needs a scale conversion, and a value that came
//! in with the wrong scale would be silently off by a factor of ten. TEXT
//! round-trips the `Decimal` as written, scale included, so `100.00` comes
//! back as `100.00`. The price is that SQL can't sum or compare balances,
//! which nothing here asks it to do.

use std::{path::Path, str::FromStr};

use rusqlite::{
    types::Type, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use rust_decimal::Decimal;

use crate::{
    data::{Account, AccountId, NewAccount, NewTransaction, Transaction},
    store::{LedgerStore, StoreError, WriteOp, WriteSummary},
};

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        create_tables(&connection)?;
        Ok(Self { connection })
    }
}

pub fn create_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            reference TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            balance TEXT NOT NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY,
            sender_id INTEGER NOT NULL REFERENCES account(id) ON DELETE CASCADE,
            recipient_id INTEGER NOT NULL REFERENCES account(id) ON DELETE CASCADE,
            amount TEXT NOT NULL,
            created TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

fn get_decimal(row: &Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        reference: row.get(1)?,
        name: row.get(2)?,
        balance: get_decimal(row, 3)?,
    })
}

fn map_row_to_transaction(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        amount: get_decimal(row, 3)?,
        created: row.get(4)?,
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn account_id(connection: &Connection, reference: &str) -> Result<AccountId, StoreError> {
    connection
        .query_row(
            "SELECT id FROM account WHERE reference = ?1",
            [reference],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::AccountNotFound(reference.to_owned()))
}

fn insert_account(connection: &Connection, new: NewAccount) -> Result<(), StoreError> {
    let result = connection.execute(
        "INSERT INTO account (reference, name, balance) VALUES (?1, ?2, ?3)",
        (&new.reference, &new.name, new.balance.to_string()),
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => {
            Err(StoreError::DuplicateReference(new.reference))
        }
        Err(e) => Err(e.into()),
    }
}

fn insert_transaction(
    connection: &Connection,
    new: NewTransaction,
) -> Result<Transaction, StoreError> {
    let sender_id = account_id(connection, &new.sender)?;
    let recipient_id = account_id(connection, &new.recipient)?;
    connection.execute(
        "INSERT INTO \"transaction\" (sender_id, recipient_id, amount, created)
         VALUES (?1, ?2, ?3, ?4)",
        (sender_id, recipient_id, new.amount.to_string(), new.created),
    )?;
    Ok(Transaction {
        id: connection.last_insert_rowid(),
        sender: new.sender,
        recipient: new.recipient,
        amount: new.amount,
        created: new.created,
    })
}

fn apply(
    connection: &Connection,
    op: WriteOp,
    summary: &mut WriteSummary,
) -> Result<(), StoreError> {
    match op {
        WriteOp::CreateAccount(new) => {
            insert_account(connection, new)?;
            summary.created += 1;
        }
        WriteOp::UpdateAccount {
            reference,
            name,
            balance,
        } => {
            let changed = connection.execute(
                "UPDATE account SET name = ?1, balance = ?2 WHERE reference = ?3",
                (&name, balance.to_string(), &reference),
            )?;
            if changed == 0 {
                return Err(StoreError::AccountNotFound(reference));
            }
            summary.updated += 1;
        }
        WriteOp::SetBalance { reference, balance } => {
            let changed = connection.execute(
                "UPDATE account SET balance = ?1 WHERE reference = ?2",
                (balance.to_string(), &reference),
            )?;
            if changed == 0 {
                return Err(StoreError::AccountNotFound(reference));
            }
            summary.updated += 1;
        }
        WriteOp::InsertTransaction(new) => {
            let tx = insert_transaction(connection, new)?;
            summary.transactions.push(tx);
        }
    }
    Ok(())
}

impl LedgerStore for SqliteStore {
    fn get_account(&self, reference: &str) -> Result<Option<Account>, StoreError> {
        self.connection
            .query_row(
                "SELECT id, reference, name, balance FROM account WHERE reference = ?1",
                [reference],
                map_row_to_account,
            )
            .optional()
            .map_err(StoreError::from)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut stmt = self
            .connection
            .prepare("SELECT id, reference, name, balance FROM account ORDER BY id DESC")?;
        let accounts = stmt
            .query_map([], map_row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn transactions_for(&self, reference: &str) -> Result<Vec<Transaction>, StoreError> {
        let mut stmt = self.connection.prepare(
            "SELECT t.id, s.reference, r.reference, t.amount, t.created
             FROM \"transaction\" t
             INNER JOIN account s ON s.id = t.sender_id
             INNER JOIN account r ON r.id = t.recipient_id
             WHERE s.reference = ?1 OR r.reference = ?1
             ORDER BY t.created ASC, t.id ASC",
        )?;
        let transactions = stmt
            .query_map([reference], map_row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Runs the batch inside one IMMEDIATE transaction, so the write lock is
    /// taken before the first op. Returning early drops the transaction
    /// uncommitted, which rolls every op back.
    fn atomic_write(&mut self, ops: Vec<WriteOp>) -> Result<WriteSummary, StoreError> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut summary = WriteSummary::default();
        let op_count = ops.len();
        for op in ops {
            apply(&tx, op, &mut summary)?;
        }
        tx.commit()?;
        tracing::debug!(
            "Committed batch of {op_count} ops ({} created, {} updated, {} transactions)",
            summary.created,
            summary.updated,
            summary.transactions.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    use super::{create_tables, SqliteStore};
    use crate::{
        data::{NewAccount, NewTransaction},
        store::{LedgerStore, StoreError, WriteOp},
    };

    fn create(reference: &str, name: &str, balance: rust_decimal::Decimal) -> WriteOp {
        WriteOp::CreateAccount(NewAccount {
            reference: reference.into(),
            name: name.into(),
            balance,
        })
    }

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), create_tables(&connection));
        assert_eq!(Ok(()), create_tables(&connection));
    }

    #[test]
    fn balances_keep_their_cents() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .atomic_write(vec![create("1", "John", dec!(0.10)), create("2", "Jane", dec!(0.20))])
            .unwrap();

        let total: rust_decimal::Decimal = store
            .list_accounts()
            .unwrap()
            .iter()
            .map(|account| account.balance)
            .sum();

        assert_eq!(total, dec!(0.30));
        assert_eq!(
            store.get_account("1").unwrap().unwrap().balance.to_string(),
            "0.10"
        );
    }

    #[test]
    fn accounts_are_listed_newest_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .atomic_write(vec![
                create("1", "Account 1", dec!(100)),
                create("2", "Account 2", dec!(200)),
            ])
            .unwrap();

        let got: Vec<String> = store
            .list_accounts()
            .unwrap()
            .into_iter()
            .map(|account| account.to_string())
            .collect();

        assert_eq!(got, ["2 - Account 2 - 200", "1 - Account 1 - 100"]);
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.atomic_write(vec![create("1", "John", dec!(100))]).unwrap();

        let result = store.atomic_write(vec![
            create("2", "Jane", dec!(200)),
            WriteOp::UpdateAccount {
                reference: "1".into(),
                name: "Johnny".into(),
                balance: dec!(1),
            },
            create("1", "John again", dec!(300)),
        ]);

        assert_eq!(result, Err(StoreError::DuplicateReference("1".into())));
        assert_eq!(store.list_accounts().unwrap().len(), 1);
        let john = store.get_account("1").unwrap().unwrap();
        assert_eq!((john.name.as_str(), john.balance), ("John", dec!(100)));
    }

    #[test]
    fn unknown_reference_fails_the_batch() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let result = store.atomic_write(vec![
            create("1", "John", dec!(100)),
            WriteOp::SetBalance {
                reference: "2".into(),
                balance: dec!(5),
            },
        ]);

        assert_eq!(result, Err(StoreError::AccountNotFound("2".into())));
        assert_eq!(store.get_account("1").unwrap(), None);
    }

    #[test]
    fn transactions_are_listed_oldest_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .atomic_write(vec![
                create("1", "Account 1", dec!(100)),
                create("2", "Account 2", dec!(200)),
            ])
            .unwrap();
        let now = OffsetDateTime::now_utc();
        let summary = store
            .atomic_write(vec![
                WriteOp::InsertTransaction(NewTransaction {
                    sender: "1".into(),
                    recipient: "2".into(),
                    amount: dec!(50.00),
                    created: now,
                }),
                WriteOp::InsertTransaction(NewTransaction {
                    sender: "2".into(),
                    recipient: "1".into(),
                    amount: dec!(75.00),
                    created: now + time::Duration::seconds(1),
                }),
            ])
            .unwrap();
        assert_eq!(summary.transactions.len(), 2);

        let got: Vec<String> = store
            .transactions_for("1")
            .unwrap()
            .into_iter()
            .map(|tx| tx.to_string())
            .collect();

        assert_eq!(got, ["1 ---> 2 : 50.00", "2 ---> 1 : 75.00"]);
        assert!(store.transactions_for("3").unwrap().is_empty());
    }
}
