use crate::data::{to_money, ImportError};
use rust_decimal::Decimal;
use std::{path::Path, str::FromStr};

/// Columns an account CSV must have, in the order they are reported when missing.
pub const REQUIRED_HEADERS: [&str; 3] = ["ID", "Name", "Balance"];

/// A data row that survived validation. `row` counts data rows from 1, the
/// header is not counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub row: usize,
    pub reference: String,
    pub name: String,
    pub balance: Decimal,
}

/// Everything usable found in an account CSV.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedAccounts {
    pub rows: Vec<AccountRow>,
    /// Numbers of the rows left out because a required field was missing.
    pub skipped: Vec<usize>,
}

/// A row with all required fields present; the balance is still raw text.
struct ScannedRow {
    row: usize,
    reference: String,
    name: String,
    balance: String,
}

/// Refuse anything that is not a UTF-8 `.csv` file, before any parsing.
pub fn check_format<'a>(file_name: &str, bytes: &'a [u8]) -> Result<&'a str, ImportError> {
    let is_csv = Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(ImportError::UnsupportedFormat(format!(
            "'{file_name}' is not a .csv file"
        )));
    }
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ImportError::UnsupportedFormat(format!("'{file_name}' is not UTF-8 text ({e})"))
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Parse and validate an account CSV.
///
/// A row missing any required field is skipped and its number remembered; a
/// negative or unreadable balance on a kept row aborts the whole read. These
/// are two separate passes on purpose, see `scan_rows` and `parse_balances`.
pub fn read_accounts(text: &str) -> Result<ParsedAccounts, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    // The text is already known to be UTF-8 and the reader is flexible about
    // row lengths, so what the csv crate could still complain about here is a
    // file that isn't really comma separated text; report it as such.
    let headers = rdr
        .headers()
        .map_err(|e| ImportError::UnsupportedFormat(e.to_string()))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(ImportError::EmptyFile);
    }
    let positions =
        REQUIRED_HEADERS.map(|required| headers.iter().position(|header| header == required));
    let missing: Vec<&'static str> = REQUIRED_HEADERS
        .into_iter()
        .zip(positions)
        .filter_map(|(required, position)| position.is_none().then_some(required))
        .collect();
    let [Some(id), Some(name), Some(balance)] = positions else {
        return Err(ImportError::MissingHeaders(missing));
    };
    let columns = [id, name, balance];

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| ImportError::UnsupportedFormat(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        records.push(record);
    }
    if records.is_empty() {
        return Err(ImportError::NoDataRows);
    }
    tracing::debug!("Read {} data rows", records.len());

    let (scanned, skipped) = scan_rows(&records, columns);
    let rows = parse_balances(scanned)?;
    Ok(ParsedAccounts { rows, skipped })
}

/// Split records into complete rows and the numbers of incomplete ones.
fn scan_rows(records: &[csv::StringRecord], columns: [usize; 3]) -> (Vec<ScannedRow>, Vec<usize>) {
    let mut scanned = Vec::new();
    let mut skipped = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let row = index + 1;
        let [reference, name, balance] =
            columns.map(|column| record.get(column).filter(|value| !value.is_empty()));
        match (reference, name, balance) {
            (Some(reference), Some(name), Some(balance)) => scanned.push(ScannedRow {
                row,
                reference: reference.to_owned(),
                name: name.to_owned(),
                balance: balance.to_owned(),
            }),
            _ => {
                tracing::warn!("Skipping row {row}: missing required field");
                skipped.push(row);
            }
        }
    }
    (scanned, skipped)
}

/// Turn balance text into money.
///
/// Unlike a missing field, a bad balance is not something we skip over: the
/// first one fails the import. A row without a name is most likely a blank or
/// half-typed line and dropping it loses nothing, while a negative balance is
/// a real account in a state the ledger never allows, and silently leaving it
/// out would make the import look fine when it isn't. That's why the two live
/// in different passes with different error handling; please keep them apart.
///
/// Balances with more than two decimals are rounded (see `to_money`), and one
/// too big to be kept with two decimals is reported as invalid.
fn parse_balances(scanned: Vec<ScannedRow>) -> Result<Vec<AccountRow>, ImportError> {
    scanned
        .into_iter()
        .map(|row| {
            let balance =
                Decimal::from_str(&row.balance).map_err(|_| ImportError::InvalidBalance {
                    row: row.row,
                    value: row.balance.clone(),
                })?;
            if balance < Decimal::ZERO {
                return Err(ImportError::NegativeBalance { row: row.row });
            }
            let balance = to_money(balance).ok_or_else(|| ImportError::InvalidBalance {
                row: row.row,
                value: row.balance.clone(),
            })?;
            Ok(AccountRow {
                row: row.row,
                reference: row.reference,
                name: row.name,
                balance,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{
        data::ImportError,
        read::{check_format, read_accounts, AccountRow},
    };
    use rust_decimal_macros::dec;

    fn row(row: usize, reference: &str, name: &str, balance: rust_decimal::Decimal) -> AccountRow {
        AccountRow {
            row,
            reference: reference.into(),
            name: name.into(),
            balance,
        }
    }

    #[test]
    fn read_valid() {
        let parsed = read_accounts("ID,Name,Balance\n1,John,100.0\n2,Jane,200.0").unwrap();
        assert_eq!(
            parsed.rows,
            [row(1, "1", "John", dec!(100.00)), row(2, "2", "Jane", dec!(200.00))]
        );
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.rows[0].balance.to_string(), "100.00");
    }

    #[test]
    fn read_any_column_order_and_extra_columns() {
        let accounts_csv = "\
Balance, Notes,  ID, Name
 10.5,   vip,    A1, Alice
 0,      ,       B2, Bob Smith
";
        let parsed = read_accounts(accounts_csv).unwrap();
        assert_eq!(
            parsed.rows,
            [row(1, "A1", "Alice", dec!(10.50)), row(2, "B2", "Bob Smith", dec!(0))]
        );
    }

    #[test]
    fn read_empty_file() {
        assert_eq!(read_accounts(""), Err(ImportError::EmptyFile));
        assert_eq!(read_accounts("\n\n"), Err(ImportError::EmptyFile));
    }

    #[test]
    fn read_missing_headers() {
        assert_eq!(
            read_accounts("Name,Balance\nJohn,100.0\nJane,200.0"),
            Err(ImportError::MissingHeaders(vec!["ID"]))
        );
        assert_eq!(
            read_accounts("ID,Balance\n1,100.0"),
            Err(ImportError::MissingHeaders(vec!["Name"]))
        );
        assert_eq!(
            read_accounts("Balance,Id,name\n1,2,3"),
            Err(ImportError::MissingHeaders(vec!["ID", "Name"]))
        );
    }

    #[test]
    fn read_header_only() {
        assert_eq!(read_accounts("ID,Name,Balance\n"), Err(ImportError::NoDataRows));
        assert_eq!(read_accounts("ID,Name,Balance\n\n"), Err(ImportError::NoDataRows));
        assert_eq!(read_accounts("ID,Name,Balance\n , ,\n"), Err(ImportError::NoDataRows));
    }

    #[test]
    fn read_skips_rows_with_missing_fields() {
        let accounts_csv = "\
ID,Name,Balance
,John,100.0
2,Jane,200.0
3,   ,300.0
4,Joe
5,Jim,
";
        let parsed = read_accounts(accounts_csv).unwrap();
        assert_eq!(parsed.rows, [row(2, "2", "Jane", dec!(200.00))]);
        assert_eq!(parsed.skipped, [1, 3, 4, 5]);
    }

    #[test]
    fn read_blank_lines_are_not_numbered() {
        let parsed = read_accounts("ID,Name,Balance\n\n1,,5\n\n2,Jane,200.0\n").unwrap();
        assert_eq!(parsed.rows, [row(2, "2", "Jane", dec!(200.00))]);
        assert_eq!(parsed.skipped, [1]);
    }

    #[test]
    fn read_negative_balance_aborts() {
        assert_eq!(
            read_accounts("ID,Name,Balance\n1,John,-100.0\n"),
            Err(ImportError::NegativeBalance { row: 1 })
        );
        // a skipped row does not stop the negative balance behind it
        assert_eq!(
            read_accounts("ID,Name,Balance\n,John,5\n2,Jane,-0.01\n"),
            Err(ImportError::NegativeBalance { row: 2 })
        );
    }

    #[test]
    fn read_invalid_balance_aborts() {
        assert_eq!(
            read_accounts("ID,Name,Balance\n1,John,100.0\n2,Jane,lots\n"),
            Err(ImportError::InvalidBalance {
                row: 2,
                value: "lots".into()
            })
        );
    }

    #[test]
    fn read_rounds_to_cents() {
        let accounts_csv = "ID,Name,Balance\n1,John,100.005\n2,Jane,0.994\n3,Jim,7\n";
        let parsed = read_accounts(accounts_csv).unwrap();
        let balances: Vec<String> = parsed.rows.iter().map(|r| r.balance.to_string()).collect();
        assert_eq!(balances, ["100.01", "0.99", "7.00"]);
    }

    #[test]
    fn read_largest_balances() {
        let parsed =
            read_accounts("ID,Name,Balance\n1,Rich,12345678901234567890123456.994\n").unwrap();
        assert_eq!(parsed.rows[0].balance.to_string(), "12345678901234567890123456.99");
        assert_eq!(
            read_accounts("ID,Name,Balance\n1,John,5\n2,Rich,1234567890123456789012345678\n"),
            Err(ImportError::InvalidBalance {
                row: 2,
                value: "1234567890123456789012345678".into()
            })
        );
        assert_eq!(
            read_accounts("ID,Name,Balance\n1,Rich,79228162514264337593543950335\n"),
            Err(ImportError::InvalidBalance {
                row: 1,
                value: "79228162514264337593543950335".into()
            })
        );
    }

    #[test]
    fn read_kept_rows_are_in_cents() {
        let accounts_csv = "\
ID,Name,Balance
1,John,100
2,Jane,200.5
3,Jim,0.125
4,Joe,
5,Jill,one thousand
";
        // row 5 is fine as far as presence goes but not a plain decimal
        assert_eq!(
            read_accounts(accounts_csv),
            Err(ImportError::InvalidBalance {
                row: 5,
                value: "one thousand".into()
            })
        );
        let parsed = read_accounts(&accounts_csv.replace("one thousand", "1000")).unwrap();
        assert_eq!(parsed.skipped, [4]);
        for row in &parsed.rows {
            assert_eq!(row.balance.scale(), 2, "row {} kept as {}", row.row, row.balance);
        }
    }

    #[test]
    fn format_gate() {
        assert_eq!(check_format("accounts.CSV", b"ID,Name,Balance"), Ok("ID,Name,Balance"));
        assert_eq!(check_format("accounts.csv", b"\xef\xbb\xbfID"), Ok("ID"));
        assert!(matches!(
            check_format("accounts.xlsx", b"ID,Name,Balance"),
            Err(ImportError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            check_format("accounts", b"ID,Name,Balance"),
            Err(ImportError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            check_format("accounts.csv", b"\xff\xfe\x00I\x00D"),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }
}
