use crate::model::amount::{BitcoinAmount, FiatAmount};
use crate::model::transaction::{Direction, Transaction};
use std::{fmt, io::Write};
use thiserror::Error;

/// Column names, in the order the accounting engine reads them.
pub const WORKSHEET_COLUMNS: [&str; 11] = [
    "timestamp",
    "asset",
    "from_exchange",
    "from_holder",
    "to_exchange",
    "to_holder",
    "spot_price",
    "crypto_in",
    "crypto_fee",
    "fiat_in",
    "fiat_fee",
];

#[derive(Debug, Error)]
pub enum WorksheetError {
    #[error("CSV writing error")]
    Csv(#[from] csv::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Write transactions as CSV, one row per transaction in the given order.
///
/// The header row is always written, even when there are no transactions.
pub fn write_worksheet<W>(writer: W, transactions: &[Transaction]) -> Result<(), WorksheetError>
where
    W: Write,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    writer.write_record(WORKSHEET_COLUMNS)?;
    for tx in transactions {
        writer.serialize(tx)?;
    }
    writer.flush()?;

    Ok(())
}

/// Totals over one run's transactions.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub receives: usize,
    pub sends: usize,
    pub crypto_in: BitcoinAmount,
    pub fiat_in: FiatAmount,
}

impl Summary {
    pub fn new(transactions: &[Transaction]) -> Self {
        transactions.iter().fold(Self::default(), |mut summary, tx| {
            match tx.direction() {
                Direction::Receive => summary.receives += 1,
                Direction::Send => summary.sends += 1,
            }
            summary.crypto_in += tx.crypto_in();
            summary.fiat_in += tx.fiat_in();

            summary
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, r#""Receives","Sends","Crypto In","Fiat In""#)?;
        write!(
            f,
            r#""{receives}","{sends}","{crypto_in}","{fiat_in}""#,
            receives = self.receives,
            sends = self.sends,
            crypto_in = self.crypto_in,
            fiat_in = self.fiat_in,
        )
    }
}
