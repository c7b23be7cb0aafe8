use crate::data::Account;

/// Basic CSV exporter for `Account`s, in the layout the importer reads.
pub fn write_accounts<W: std::io::Write>(
    writer: W,
    accounts: &[Account],
) -> Result<(), anyhow::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for account in accounts {
        wtr.serialize(account)?;
    }
    wtr.flush()?;
    Ok(())
}
