use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;
use time::OffsetDateTime;

use crate::store::StoreError;

pub type AccountId = i64;
pub type TxId = i64;

/// Number of decimal places kept for balances and amounts.
pub const MONEY_SCALE: u32 = 2;

/// Smallest amount a caller may ask to transfer.
pub const MINIMUM_TRANSFER: Decimal = Decimal::from_parts(500, 0, 0, false, MONEY_SCALE);

/// Largest number of digits allowed before the decimal point of a transfer amount.
pub const MAX_INTEGER_DIGITS: usize = 18;

/// A stored account. `id` is the storage key, `reference` is the identifier
/// the outside world knows the account by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "AccountRecord")]
pub struct Account {
    pub id: AccountId,
    pub reference: String,
    pub name: String,
    pub balance: Decimal,
}

/// CSV shape of an `Account`; the storage key never leaves the store, and the
/// column names match the ones accepted by the importer so an export can be
/// fed straight back in.
#[derive(Serialize)]
pub struct AccountRecord {
    #[serde(rename = "ID")]
    pub reference: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Balance")]
    pub balance: Decimal,
}

impl From<Account> for AccountRecord {
    fn from(account: Account) -> Self {
        Self {
            reference: account.reference,
            name: account.name,
            balance: account.balance,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.reference, self.name, self.balance)
    }
}

/// An account that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub reference: String,
    pub name: String,
    pub balance: Decimal,
}

/// An entry of the append-only audit trail. Sender and recipient are account
/// references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    pub sender: String,
    pub recipient: String,
    pub amount: Decimal,
    pub created: OffsetDateTime,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ---> {} : {}", self.sender, self.recipient, self.amount)
    }
}

/// A transaction that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Decimal,
    pub created: OffsetDateTime,
}

/// Which side of a transfer an error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Sender,
    Recipient,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Sender => f.write_str("Sender"),
            Party::Recipient => f.write_str("Recipient"),
        }
    }
}

/// Why a transfer was refused. Every variant except `Store` is raised before
/// anything is written.
#[derive(Error, Debug, PartialEq)]
pub enum TransferError {
    #[error("Transfer amount must be positive (got {0})")]
    NonPositiveAmount(Decimal),
    #[error("Sender and recipient cannot be the same.")]
    SameAccount,
    #[error("{party} with reference '{reference}' does not exist.")]
    AccountNotFound { party: Party, reference: String },
    #[error("Insufficient funds (asked {asked} while {available} available)")]
    InsufficientFunds { asked: Decimal, available: Decimal },
    #[error("The balance of account '{reference}' cannot hold {amount} more")]
    BalanceOverflow { reference: String, amount: Decimal },
    #[error("Could not record the transfer: {0}")]
    Store(#[from] StoreError),
}

/// Why an import was aborted. Rows with missing fields are not errors, they
/// end up in `ImportReport::skipped`.
#[derive(Error, Debug, PartialEq)]
pub enum ImportError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("The submitted file is empty.")]
    EmptyFile,
    #[error("Missing required headers in CSV: {}", .0.join(", "))]
    MissingHeaders(Vec<&'static str>),
    #[error("The CSV file contains only headers and no data rows.")]
    NoDataRows,
    #[error("Balance cannot be negative. (row {row})")]
    NegativeBalance { row: usize },
    #[error("Invalid balance '{value}' (row {row})")]
    InvalidBalance { row: usize, value: String },
    #[error("Error saving accounts: {0}")]
    Persistence(String),
}

/// Rejections of a user-typed transfer amount. These checks belong to whoever
/// collects the amount, the transfer engine itself only insists on `> 0`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("Enter a number.")]
    Invalid,
    #[error("Ensure this value is greater than or equal to {}.", MINIMUM_TRANSFER)]
    BelowMinimum,
    #[error(
        "Ensure that there are no more than {} digits before the decimal point.",
        MAX_INTEGER_DIGITS
    )]
    TooManyIntegerDigits,
    #[error("Ensure that there are no more than {} decimal places.", MONEY_SCALE)]
    TooManyDecimalPlaces,
}

/// Parse a transfer amount typed by a user.
pub fn parse_amount(text: &str) -> Result<Decimal, AmountError> {
    let amount = Decimal::from_str(text.trim()).map_err(|_| AmountError::Invalid)?;
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(AmountError::TooManyDecimalPlaces);
    }
    let integer_part = amount.trunc().abs().normalize();
    if !integer_part.is_zero() && integer_part.to_string().len() > MAX_INTEGER_DIGITS {
        return Err(AmountError::TooManyIntegerDigits);
    }
    if amount < MINIMUM_TRANSFER {
        return Err(AmountError::BelowMinimum);
    }
    to_money(amount).ok_or(AmountError::TooManyIntegerDigits)
}

/// Bring a value to the scale money is kept at, rounding half away from zero
/// when there are more decimals than that (`100.005` becomes `100.01`).
///
/// `Decimal::rescale` never fails: when the mantissa has no room left for the
/// extra zeros it quietly stops at a smaller scale. A balance of
/// `79228162514264337593543950335` would come back unchanged at scale 0 and
/// then blow up the first time something is added to it, so anything that
/// can't be held with `MONEY_SCALE` decimals is refused here with `None`.
pub fn to_money(mut value: Decimal) -> Option<Decimal> {
    value.rescale(MONEY_SCALE);
    (value.scale() == MONEY_SCALE).then_some(value)
}
