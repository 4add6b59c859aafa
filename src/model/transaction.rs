use crate::model::amount::{BitcoinAmount, ConvertAmountError, FiatAmount};
use crate::model::constants::{ASSET, EXTERNAL, LIGHTNING_NETWORK, NODE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// An account label and the party that holds it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Party {
    pub exchange: &'static str,
    pub holder: &'static str,
}

impl Party {
    pub const fn new(exchange: &'static str, holder: &'static str) -> Self {
        Self { exchange, holder }
    }
}

/// Which way value moved relative to the user's node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Receive,
    Send,
}

/// The record source a transaction was converted from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Source {
    Onchain,
    Lightning,
}

impl Source {
    /// The party on the far side of the node.
    pub fn counterparty(self) -> Party {
        match self {
            Self::Onchain => EXTERNAL,
            Self::Lightning => LIGHTNING_NETWORK,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onchain => write!(f, "on-chain"),
            Self::Lightning => write!(f, "Lightning"),
        }
    }
}

/// The canonical transaction consumed by the accounting engine.
///
/// Field names and serialization order match the accounting engine's input schema. All
/// magnitudes are non-negative. Direction is only carried by the `from_*` and `to_*` labels:
/// a receive has a positive `crypto_in` and zero `fiat_in`, a send has zero `crypto_in` and a
/// positive `fiat_in`. Fees are always zero.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Transaction {
    timestamp: DateTime<Utc>,
    asset: &'static str,
    from_exchange: &'static str,
    from_holder: &'static str,
    to_exchange: &'static str,
    to_holder: &'static str,
    spot_price: FiatAmount,
    crypto_in: BitcoinAmount,
    crypto_fee: BitcoinAmount,
    fiat_in: FiatAmount,
    fiat_fee: FiatAmount,

    #[serde(skip)]
    source: Source,
}

impl Transaction {
    /// Value arriving at the node from `source`'s counterparty.
    pub(crate) fn receive(
        source: Source,
        timestamp: DateTime<Utc>,
        amount: BitcoinAmount,
        spot_price: FiatAmount,
    ) -> Self {
        debug_assert!(amount.is_positive());
        debug_assert!(spot_price.is_positive());

        let from = source.counterparty();

        Self {
            timestamp,
            asset: ASSET,
            from_exchange: from.exchange,
            from_holder: from.holder,
            to_exchange: NODE.exchange,
            to_holder: NODE.holder,
            spot_price,
            crypto_in: amount,
            crypto_fee: BitcoinAmount::ZERO,
            fiat_in: FiatAmount::ZERO,
            fiat_fee: FiatAmount::ZERO,
            source,
        }
    }

    /// Value leaving the node toward `source`'s counterparty.
    pub(crate) fn send(
        source: Source,
        timestamp: DateTime<Utc>,
        amount: BitcoinAmount,
        spot_price: FiatAmount,
    ) -> Result<Self, ConvertAmountError> {
        debug_assert!(amount.is_positive());
        debug_assert!(spot_price.is_positive());

        let to = source.counterparty();

        Ok(Self {
            timestamp,
            asset: ASSET,
            from_exchange: NODE.exchange,
            from_holder: NODE.holder,
            to_exchange: to.exchange,
            to_holder: to.holder,
            spot_price,
            crypto_in: BitcoinAmount::ZERO,
            crypto_fee: BitcoinAmount::ZERO,
            fiat_in: amount.to_fiat(spot_price)?,
            fiat_fee: FiatAmount::ZERO,
            source,
        })
    }

    pub fn direction(&self) -> Direction {
        if self.crypto_in.is_zero() {
            Direction::Send
        } else {
            Direction::Receive
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn asset(&self) -> &'static str {
        self.asset
    }

    pub fn from(&self) -> Party {
        Party::new(self.from_exchange, self.from_holder)
    }

    pub fn to(&self) -> Party {
        Party::new(self.to_exchange, self.to_holder)
    }

    pub fn spot_price(&self) -> FiatAmount {
        self.spot_price
    }

    pub fn crypto_in(&self) -> BitcoinAmount {
        self.crypto_in
    }

    pub fn crypto_fee(&self) -> BitcoinAmount {
        self.crypto_fee
    }

    pub fn fiat_in(&self) -> FiatAmount {
        self.fiat_in
    }

    pub fn fiat_fee(&self) -> FiatAmount {
        self.fiat_fee
    }
}
