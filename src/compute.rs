use crate::{
    data::{Account, NewAccount, NewTransaction, Party, Transaction, TransferError},
    store::{LedgerStore, StoreError, WriteOp},
};
use rust_decimal::Decimal;
use time::OffsetDateTime;

fn find_account<S: LedgerStore>(
    store: &S,
    party: Party,
    reference: &str,
) -> Result<Account, TransferError> {
    store
        .get_account(reference)?
        .ok_or_else(|| TransferError::AccountNotFound {
            party,
            reference: reference.to_owned(),
        })
}

/// Move `amount` from one account to another and record it.
///
/// All the checks run against a fresh read of both accounts; only then are the
/// two new balances and the audit row handed to the store as one batch. If
/// any check fails nothing is written.
///
/// The balances written are computed from that read, and the store is not
/// asked to lock anything in between: two transfers racing on the same
/// account are only kept apart by the store's transaction isolation.
pub fn transfer<S: LedgerStore>(
    store: &mut S,
    sender_ref: &str,
    recipient_ref: &str,
    amount: Decimal,
) -> Result<Transaction, TransferError> {
    if amount <= Decimal::ZERO {
        return Err(TransferError::NonPositiveAmount(amount));
    }
    if sender_ref == recipient_ref {
        return Err(TransferError::SameAccount);
    }
    let sender = find_account(store, Party::Sender, sender_ref)?;
    let recipient = find_account(store, Party::Recipient, recipient_ref)?;
    if sender.balance < amount {
        return Err(TransferError::InsufficientFunds {
            asked: amount,
            available: sender.balance,
        });
    }

    // `Decimal`'s operators panic on overflow. A recipient sitting close to
    // `Decimal::MAX` is unlikely but storable, so this has to be a refusal
    // like the others, before anything is written.
    let sender_balance = sender.balance.checked_sub(amount).ok_or_else(|| {
        TransferError::BalanceOverflow {
            reference: sender.reference.clone(),
            amount,
        }
    })?;
    let recipient_balance = recipient.balance.checked_add(amount).ok_or_else(|| {
        TransferError::BalanceOverflow {
            reference: recipient.reference.clone(),
            amount,
        }
    })?;

    let summary = store.atomic_write(vec![
        WriteOp::SetBalance {
            reference: sender.reference.clone(),
            balance: sender_balance,
        },
        WriteOp::SetBalance {
            reference: recipient.reference.clone(),
            balance: recipient_balance,
        },
        WriteOp::InsertTransaction(NewTransaction {
            sender: sender.reference,
            recipient: recipient.reference,
            amount,
            created: OffsetDateTime::now_utc(),
        }),
    ])?;

    let tx = summary
        .transactions
        .into_iter()
        .next()
        .ok_or(StoreError::MissingReceipt)?;
    tracing::info!("Transaction #{} recorded: {tx}", tx.id);
    Ok(tx)
}

/// Provision a single account outside of an import.
pub fn open_account<S: LedgerStore>(store: &mut S, new: NewAccount) -> Result<Account, StoreError> {
    let reference = new.reference.clone();
    store.atomic_write(vec![WriteOp::CreateAccount(new)])?;
    store
        .get_account(&reference)?
        .ok_or(StoreError::AccountNotFound(reference))
}
