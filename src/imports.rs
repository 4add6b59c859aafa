//! Raw Core Lightning records and their conversion into canonical [`Transaction`]s.
//!
//! Records arrive as JSON objects. Each is decoded into a [`RawRecord`] variant and then handed
//! to the converter for that variant. A record that cannot be decoded or converted is reported
//! as an error for that record alone; it never affects its neighbors.

use crate::model::{ConvertAmountError, ExchangeRateError, PriceLookup, Source, Transaction};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub mod lightning;
pub mod onchain;

/// Field names that carry the signed amount of an on-chain record, in order of preference.
const ONCHAIN_AMOUNT_FIELDS: [&str; 2] = ["amount_msat", "amount"];

/// The only `direction` value that marks a payment as leaving the node.
const OUTGOING: &str = "outgoing";

/// A single record that cannot become a transaction.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Record has wrong type for field `{0}`")]
    WrongFieldType(&'static str),

    #[error("Record field `{0}` parse error")]
    Parse(&'static str, #[source] std::num::ParseIntError),

    #[error("Record timestamp `{0}` is out of range")]
    Timestamp(i64),

    #[error("Record moves no value")]
    ZeroAmount,
}

/// Reasons a decoded record is not converted.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Price(#[from] ExchangeRateError),

    #[error(transparent)]
    Amount(#[from] ConvertAmountError),
}

/// A record from either of the node's histories.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawRecord {
    /// An entry from `listtransactions`.
    Onchain(OnchainRecord),

    /// An entry from `listpays`.
    Lightning(LightningRecord),
}

/// An on-chain transfer. Negative amounts left the node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnchainRecord {
    pub amount_msat: i64,
    pub timestamp: DateTime<Utc>,
}

/// A Lightning payment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LightningRecord {
    pub amount_msat: u64,
    pub created_at: DateTime<Utc>,
    pub direction: PayDirection,
    pub status: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PayDirection {
    Incoming,
    Outgoing,
}

impl RawRecord {
    /// Decode an entry of the on-chain history.
    pub fn onchain(value: &Value) -> Result<Self, RecordError> {
        OnchainRecord::from_value(value).map(Self::Onchain)
    }

    /// Decode an entry of the Lightning payment history.
    pub fn lightning(value: &Value) -> Result<Self, RecordError> {
        LightningRecord::from_value(value).map(Self::Lightning)
    }

    pub fn source(&self) -> Source {
        match self {
            Self::Onchain(_) => Source::Onchain,
            Self::Lightning(_) => Source::Lightning,
        }
    }

    /// The time the converted transaction will carry.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Onchain(record) => record.timestamp,
            Self::Lightning(record) => record.created_at,
        }
    }

    /// Convert this record with the converter for its variant.
    pub fn convert<P>(&self, prices: &P) -> Result<Transaction, ConvertError>
    where
        P: PriceLookup + ?Sized,
    {
        match self {
            Self::Onchain(record) => onchain::convert(record, prices),
            Self::Lightning(record) => lightning::convert(record, prices),
        }
    }
}

impl OnchainRecord {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let field = ONCHAIN_AMOUNT_FIELDS
            .into_iter()
            .find(|field| value.get(field).is_some())
            .ok_or(RecordError::MissingField(ONCHAIN_AMOUNT_FIELDS[0]))?;

        Ok(Self {
            amount_msat: parse_field_msat_i64(value, field)?,
            timestamp: parse_field_timestamp(value, "timestamp")?,
        })
    }
}

impl LightningRecord {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let direction = get_field(value, "direction", |direction| {
            direction
                .as_str()
                .ok_or(RecordError::WrongFieldType("direction"))
        })?;
        let status = match value.get("status") {
            None | Some(Value::Null) => None,
            Some(status) => Some(
                status
                    .as_str()
                    .ok_or(RecordError::WrongFieldType("status"))?
                    .to_string(),
            ),
        };

        Ok(Self {
            amount_msat: parse_field_msat_u64(value, "amount_msat")?,
            created_at: parse_field_timestamp(value, "created_at")?,
            direction: if direction == OUTGOING {
                PayDirection::Outgoing
            } else {
                PayDirection::Incoming
            },
            status,
        })
    }
}

fn get_field<'a, F, T>(value: &'a Value, field: &'static str, map: F) -> Result<T, RecordError>
where
    F: FnOnce(&'a Value) -> Result<T, RecordError>,
{
    value
        .get(field)
        .ok_or(RecordError::MissingField(field))
        .and_then(map)
}

/// Epoch seconds to a UTC time.
fn parse_field_timestamp(value: &Value, field: &'static str) -> Result<DateTime<Utc>, RecordError> {
    let seconds = get_field(value, field, |value| {
        value.as_i64().ok_or(RecordError::WrongFieldType(field))
    })?;

    DateTime::from_timestamp(seconds, 0).ok_or(RecordError::Timestamp(seconds))
}

/// Msat amounts are JSON integers, or strings with an `msat` suffix in older Core Lightning
/// releases.
fn parse_field_msat_i64(value: &Value, field: &'static str) -> Result<i64, RecordError> {
    get_field(value, field, |value| match value {
        Value::Number(number) => number.as_i64().ok_or(RecordError::WrongFieldType(field)),
        Value::String(msat) => parse_msat_str(msat, field),
        _ => Err(RecordError::WrongFieldType(field)),
    })
}

fn parse_field_msat_u64(value: &Value, field: &'static str) -> Result<u64, RecordError> {
    get_field(value, field, |value| match value {
        Value::Number(number) => number.as_u64().ok_or(RecordError::WrongFieldType(field)),
        Value::String(msat) => parse_msat_str(msat, field),
        _ => Err(RecordError::WrongFieldType(field)),
    })
}

fn parse_msat_str<T>(msat: &str, field: &'static str) -> Result<T, RecordError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    msat.strip_suffix("msat")
        .ok_or(RecordError::WrongFieldType(field))?
        .parse()
        .map_err(|err| RecordError::Parse(field, err))
}
