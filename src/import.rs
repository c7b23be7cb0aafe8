//! Bulk account import: read a CSV snapshot, match it against the accounts
//! already stored, then create or update them in one batch.

use std::{collections::HashMap, fmt};

use crate::{
    data::{Account, ImportError, NewAccount},
    read::{check_format, read_accounts, AccountRow},
    store::{LedgerStore, WriteOp},
};

/// Outcome of an import that went through.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    /// Data row numbers (1-based, header excluded) that were left out.
    pub skipped: Vec<usize>,
}

impl ImportReport {
    /// The message to show next to the summary when some rows were left out.
    pub fn warning(&self) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }
        let rows: Vec<String> = self.skipped.iter().map(usize::to_string).collect();
        Some(format!(
            "Some rows were skipped due to missing fields: {}.",
            rows.join(", ")
        ))
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Accounts imported successfully ({} created, {} updated)",
            self.created, self.updated
        )
    }
}

/// Import the account CSV `bytes` uploaded as `file_name`.
///
/// Existing accounts are read once, before anything is decided, and the
/// resulting creations and updates are written as a single batch. Nothing
/// holds the store in between, so a transfer landing on an account after
/// the snapshot is taken gets overwritten by that account's row.
pub fn import_accounts<S: LedgerStore>(
    store: &mut S,
    file_name: &str,
    bytes: &[u8],
) -> Result<ImportReport, ImportError> {
    let text = check_format(file_name, bytes)?;
    let parsed = read_accounts(text)?;

    let existing: HashMap<String, Account> = store
        .list_accounts()
        .map_err(|e| ImportError::Persistence(e.to_string()))?
        .into_iter()
        .map(|account| (account.reference.clone(), account))
        .collect();
    tracing::debug!(
        "Reconciling {} rows against {} stored accounts",
        parsed.rows.len(),
        existing.len()
    );

    let ops = reconcile(&existing, parsed.rows);
    let summary = store
        .atomic_write(ops)
        .map_err(|e| ImportError::Persistence(e.to_string()))?;

    let report = ImportReport {
        created: summary.created,
        updated: summary.updated,
        skipped: parsed.skipped,
    };
    tracing::info!("{report} from {file_name}");
    if let Some(warning) = report.warning() {
        tracing::warn!("{warning}");
    }
    Ok(report)
}

/// Queue an update for every row whose ID is already a stored reference and a
/// creation for every other row. Creations go first in the batch.
fn reconcile(existing: &HashMap<String, Account>, rows: Vec<AccountRow>) -> Vec<WriteOp> {
    let (updates, creations): (Vec<AccountRow>, Vec<AccountRow>) = rows
        .into_iter()
        .partition(|row| existing.contains_key(&row.reference));

    creations
        .into_iter()
        .map(|row| {
            WriteOp::CreateAccount(NewAccount {
                reference: row.reference,
                name: row.name,
                balance: row.balance,
            })
        })
        .chain(updates.into_iter().map(|row| WriteOp::UpdateAccount {
            reference: row.reference,
            name: row.name,
            balance: row.balance,
        }))
        .collect()
}
