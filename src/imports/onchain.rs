use crate::imports::{ConvertError, OnchainRecord, RecordError};
use crate::model::{spot_price, BitcoinAmount, PriceLookup, Source, Transaction};
use tracing::trace;

/// Convert an on-chain transfer.
///
/// Positive amounts arrive from an external address. Negative amounts leave the node; the
/// magnitude is what gets valued.
pub fn convert<P>(record: &OnchainRecord, prices: &P) -> Result<Transaction, ConvertError>
where
    P: PriceLookup + ?Sized,
{
    if record.amount_msat == 0 {
        return Err(RecordError::ZeroAmount.into());
    }

    let amount = BitcoinAmount::from_msat(record.amount_msat.unsigned_abs())?;
    let price = spot_price(prices, record.timestamp)?;

    trace!("On-chain {amount} BTC at {} priced {price}", record.timestamp);

    let tx = if record.amount_msat > 0 {
        Transaction::receive(Source::Onchain, record.timestamp, amount, price)
    } else {
        Transaction::send(Source::Onchain, record.timestamp, amount, price)?
    };

    Ok(tx)
}
