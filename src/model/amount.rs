use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Milli-satoshis per bitcoin. Both Core Lightning record sources report amounts in msat.
pub const MSAT_PER_BTC: u64 = 100_000_000_000;

/// Fractional digits of a bitcoin amount carried at msat precision.
pub(crate) const BITCOIN_MSAT_DIGITS: u32 = 11;

/// Fractional digits used when displaying fiat values.
pub(crate) const FIAT_DIGITS: u32 = 4;

#[derive(Debug, Error)]
pub enum ConvertAmountError {
    /// Unable to parse decimal string.
    #[error("Unable to parse decimal string")]
    Decimal(#[from] rust_decimal::Error),

    /// The msat amount cannot be represented.
    #[error("Amount of {0} msat is out of range")]
    OutOfRange(u64),

    /// Multiplying an amount by a price overflowed.
    #[error("Fiat value of {0} BTC at {1} overflows")]
    Overflow(BitcoinAmount, FiatAmount),
}

/// A non-negative quantity of bitcoin, in whole BTC.
#[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BitcoinAmount(Decimal);

/// A fiat value. Prices are expressed as fiat per whole BTC.
#[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FiatAmount(Decimal);

macro_rules! impl_math_ops {
    ($name:ident) => {
        impl ::std::ops::Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl ::std::ops::AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }
    };
}

impl_math_ops!(BitcoinAmount);
impl_math_ops!(FiatAmount);

impl BitcoinAmount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Convert a milli-satoshi amount to whole BTC.
    ///
    /// The conversion is an exact decimal rescale: `100_000_000_000` msat is exactly `1` BTC.
    pub fn from_msat(msat: u64) -> Result<Self, ConvertAmountError> {
        Decimal::try_from_i128_with_scale(i128::from(msat), BITCOIN_MSAT_DIGITS)
            .map(|amount| Self(amount.normalize()))
            .map_err(|_| ConvertAmountError::OutOfRange(msat))
    }

    /// Fiat value of this amount at the given price.
    pub fn to_fiat(self, price: FiatAmount) -> Result<FiatAmount, ConvertAmountError> {
        self.0
            .checked_mul(price.0)
            .map(|value| FiatAmount(value.normalize()))
            .ok_or(ConvertAmountError::Overflow(self, price))
    }

    pub fn to_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl FiatAmount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn to_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl From<Decimal> for BitcoinAmount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Decimal> for FiatAmount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for BitcoinAmount {
    type Err = ConvertAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl FromStr for FiatAmount {
    type Err = ConvertAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl fmt::Display for BitcoinAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl fmt::Display for FiatAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Banker's rounding, the `Decimal` default.
        let precision = FIAT_DIGITS as usize;
        let amount = self.0.round_dp(FIAT_DIGITS);

        write!(f, "{amount:.precision$}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbtest::arbtest;
    use tracing_test::traced_test;

    #[test]
    fn test_one_bitcoin() {
        let amount = BitcoinAmount::from_msat(MSAT_PER_BTC).unwrap();
        assert_eq!(amount.to_decimal(), Decimal::ONE);
        assert_eq!(amount.to_string(), "1");
    }

    #[test]
    fn test_zero_msat() {
        let amount = BitcoinAmount::from_msat(0).unwrap();
        assert!(amount.is_zero());
        assert!(!amount.is_positive());
        assert_eq!(amount, BitcoinAmount::ZERO);
    }

    #[test]
    fn test_fractional_msat() {
        let amount = BitcoinAmount::from_msat(250_000_000_000).unwrap();
        assert_eq!(amount, "2.5".parse().unwrap());

        // A single msat is the smallest representable amount.
        let amount = BitcoinAmount::from_msat(1).unwrap();
        assert_eq!(amount.to_string(), "0.00000000001");

        // Largest msat amount.
        let amount = BitcoinAmount::from_msat(u64::MAX).unwrap();
        assert_eq!(amount.to_string(), "184467440.73709551615");
    }

    #[test]
    fn test_to_fiat() {
        let amount: BitcoinAmount = "2.5".parse().unwrap();
        let price: FiatAmount = "30000".parse().unwrap();
        assert_eq!(amount.to_fiat(price).unwrap(), "75000".parse().unwrap());

        let amount = BitcoinAmount::from_msat(1_000).unwrap();
        let price: FiatAmount = "43210.55".parse().unwrap();
        assert_eq!(amount.to_fiat(price).unwrap(), "0.000432105500".parse().unwrap());
    }

    #[test]
    fn test_to_fiat_overflow() {
        let amount = BitcoinAmount::from(Decimal::MAX);
        let price: FiatAmount = "2".parse().unwrap();
        assert!(matches!(
            amount.to_fiat(price),
            Err(ConvertAmountError::Overflow(_, _)),
        ));
    }

    #[test]
    fn test_fiat_display() {
        let amount: FiatAmount = "30000".parse().unwrap();
        assert_eq!(amount.to_string(), "30000.0000");

        let amount: FiatAmount = "0.00004321".parse().unwrap();
        assert_eq!(amount.to_string(), "0.0000");

        // Banker's rounding
        let amount: FiatAmount = "1.00005".parse().unwrap();
        assert_eq!(amount.to_string(), "1.0000");
        let amount: FiatAmount = "1.00015".parse().unwrap();
        assert_eq!(amount.to_string(), "1.0002");
    }

    #[test]
    #[traced_test]
    fn prop_test_msat_scale_is_exact() {
        arbtest(|u| {
            let msat = u.arbitrary::<u64>()?;
            let amount = BitcoinAmount::from_msat(msat).unwrap();
            let scaled = amount.to_decimal() * Decimal::from(MSAT_PER_BTC);
            assert_eq!(scaled, Decimal::from(msat));
            Ok(())
        });
    }
}
