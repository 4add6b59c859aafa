use crate::imports::{ConvertError, LightningRecord, PayDirection, RecordError};
use crate::model::{spot_price, BitcoinAmount, PriceLookup, Source, Transaction};
use tracing::trace;

/// Convert a Lightning payment.
///
/// Routing fees are not recorded; only the payment amount is valued. The payment `status` does
/// not affect conversion.
pub fn convert<P>(record: &LightningRecord, prices: &P) -> Result<Transaction, ConvertError>
where
    P: PriceLookup + ?Sized,
{
    if record.amount_msat == 0 {
        return Err(RecordError::ZeroAmount.into());
    }

    let amount = BitcoinAmount::from_msat(record.amount_msat)?;
    let price = spot_price(prices, record.created_at)?;

    trace!(
        "Lightning {:?} {amount} BTC at {} priced {price}, status {:?}",
        record.direction,
        record.created_at,
        record.status,
    );

    let tx = match record.direction {
        PayDirection::Incoming => {
            Transaction::receive(Source::Lightning, record.created_at, amount, price)
        }
        PayDirection::Outgoing => {
            Transaction::send(Source::Lightning, record.created_at, amount, price)?
        }
    };

    Ok(tx)
}
