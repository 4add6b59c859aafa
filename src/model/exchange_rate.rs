use crate::model::amount::FiatAmount;
use crate::model::constants::DEFAULT_SPOT_PRICE;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::{collections::BTreeMap, ffi::OsStr, fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

/// Exchange rate lookup failures.
#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum ExchangeRateError {
    #[error("BTCUSD exchange rate does not exist for {0}")]
    NotFound(DateTime<Utc>),

    #[error("BTCUSD exchange rate for {0} is not positive: {1}")]
    NotPositive(DateTime<Utc>, FiatAmount),
}

#[derive(Debug, Error)]
pub enum ExchangeRatesDbError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("RON parsing error")]
    Parse(#[from] ron::de::SpannedError),

    #[error("DB has an invalid aggregation granularity")]
    InvalidGranularity,
}

/// Historical price source.
///
/// Implementations must be deterministic for a given timestamp over the course of one run.
pub trait PriceLookup {
    /// Get the fiat value of one BTC at `datetime`.
    fn price_at(&self, datetime: DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError>;
}

/// Closures are price sources, which keeps test doubles short.
impl<F> PriceLookup for F
where
    F: Fn(DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError>,
{
    fn price_at(&self, datetime: DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError> {
        self(datetime)
    }
}

/// Look up a price and reject anything that cannot be used as a spot price.
pub(crate) fn spot_price<P>(
    prices: &P,
    datetime: DateTime<Utc>,
) -> Result<FiatAmount, ExchangeRateError>
where
    P: PriceLookup + ?Sized,
{
    let price = prices.price_at(datetime)?;
    if price.is_positive() {
        Ok(price)
    } else {
        Err(ExchangeRateError::NotPositive(datetime, price))
    }
}

/// The same price at every point in time.
///
/// This is a stand-in for runs without an exchange rate database.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FixedPrice(FiatAmount);

impl FixedPrice {
    pub fn new(price: FiatAmount) -> Self {
        Self(price)
    }

    pub fn price(&self) -> FiatAmount {
        self.0
    }
}

impl Default for FixedPrice {
    fn default() -> Self {
        Self(FiatAmount::from(Decimal::from(DEFAULT_SPOT_PRICE)))
    }
}

impl PriceLookup for FixedPrice {
    fn price_at(&self, _datetime: DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError> {
        Ok(self.0)
    }
}

pub type ExchangeRateMap = BTreeMap<u64, Decimal>;

/// BTCUSD rates read from a directory of `*-btcusd.ron` files.
#[derive(Debug)]
pub struct ExchangeRates {
    /// Timestamp granularity.
    ///
    /// Must be equal to the interval between each timestamp in the keys, minus 1 second.
    granularity: u64,

    btc: ExchangeRateMap,
}

impl ExchangeRates {
    /// Create an ExchangeRates DB from the given directory path.
    pub fn new<P>(path: P) -> Result<Self, ExchangeRatesDbError>
    where
        P: AsRef<Path>,
    {
        let mut btc = ExchangeRateMap::new();

        for entry in fs::read_dir(path.as_ref())? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && path.extension() == Some(OsStr::new("ron")) {
                let name = match path.file_stem().and_then(OsStr::to_str) {
                    Some(name) => name,
                    None => continue,
                };

                if name.ends_with("-btcusd") {
                    debug!("Reading exchange rates from {path:?}");
                    btc.extend(read_ron(&path)?);
                }
            }
        }

        if btc.is_empty() {
            warn!("Missing BTCUSD exchange rates");
        }

        Self::from_map(btc)
    }

    /// Create an ExchangeRates DB from rates already in memory.
    pub fn from_map(btc: ExchangeRateMap) -> Result<Self, ExchangeRatesDbError> {
        let granularity = check_granularity(&btc)?;

        if granularity == 0 {
            Err(ExchangeRatesDbError::InvalidGranularity)
        } else {
            // Patch the detected granularity to make lower-bound searches exclusive
            Ok(Self {
                granularity: granularity - 1,
                btc,
            })
        }
    }

    pub fn get(&self, datetime: DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError> {
        let end = u64::try_from(datetime.timestamp())
            .map_err(|_| ExchangeRateError::NotFound(datetime))?;
        let start = end.saturating_sub(self.granularity);

        self.btc
            .range(start..=end)
            .next_back()
            .map(|(_k, v)| FiatAmount::from(*v))
            .ok_or(ExchangeRateError::NotFound(datetime))
    }
}

impl PriceLookup for ExchangeRates {
    fn price_at(&self, datetime: DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError> {
        self.get(datetime)
    }
}

/// The price sources selectable at runtime.
#[derive(Debug)]
pub enum Prices {
    Database(ExchangeRates),
    Fixed(FixedPrice),
}

impl From<ExchangeRates> for Prices {
    fn from(value: ExchangeRates) -> Self {
        Self::Database(value)
    }
}

impl From<FixedPrice> for Prices {
    fn from(value: FixedPrice) -> Self {
        Self::Fixed(value)
    }
}

impl PriceLookup for Prices {
    fn price_at(&self, datetime: DateTime<Utc>) -> Result<FiatAmount, ExchangeRateError> {
        match self {
            Self::Database(db) => db.price_at(datetime),
            Self::Fixed(fixed) => fixed.price_at(datetime),
        }
    }
}

fn read_ron(path: &Path) -> Result<ExchangeRateMap, ExchangeRatesDbError> {
    let data = fs::read_to_string(path)?;
    let rates = ron::from_str::<ExchangeRateMap>(&data)?;

    Ok(rates)
}

/// Detect the uniform spacing between keys. Returns 0 for maps with fewer than two keys.
fn check_granularity(map: &ExchangeRateMap) -> Result<u64, ExchangeRatesDbError> {
    map.keys()
        .try_fold((0, 0), |(acc, granularity), timestamp| {
            if acc == 0 || timestamp - acc == granularity {
                Some((*timestamp, granularity))
            } else if granularity == 0 {
                Some((*timestamp, timestamp - acc))
            } else {
                None
            }
        })
        .map(|(_, granularity)| granularity)
        .ok_or(ExchangeRatesDbError::InvalidGranularity)
}
