//! Prices, fee rates and the platform fee split.
//!
//! All amounts are single-currency and expressed with two fractional digits.
//! The split is computed in minor units (hundredths) so that
//! `fee + net == gross` holds exactly.

use std::fmt;

use rust_decimal::{Decimal, prelude::ToPrimitive as _};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MINOR_PER_MAJOR: i64 = 100;
const MINOR_SCALE: u32 = 2;

// ─── Price ───────────────────────────────────────────────────────────────────

/// A non-negative amount with at most two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price {
  value: Decimal,
  minor: i64,
}

impl Price {
  pub const ZERO: Self = Self { value: Decimal::ZERO, minor: 0 };

  pub fn new(value: Decimal) -> Result<Self> {
    if value.is_sign_negative() && !value.is_zero() {
      return Err(Error::NegativeAmount(value));
    }
    if value.normalize().scale() > MINOR_SCALE {
      return Err(Error::TooPrecise(value));
    }
    let minor = value
      .checked_mul(Decimal::from(MINOR_PER_MAJOR))
      .and_then(|m| m.to_i64())
      .ok_or(Error::AmountOutOfRange)?;
    Ok(Self { value, minor })
  }

  /// Build a price from an amount already expressed in minor units.
  pub fn from_minor_units(minor: i64) -> Result<Self> {
    if minor < 0 {
      return Err(Error::NegativeAmount(Decimal::new(minor, MINOR_SCALE)));
    }
    Ok(Self { value: Decimal::new(minor, MINOR_SCALE), minor })
  }

  pub fn value(&self) -> Decimal { self.value }

  pub fn minor_units(&self) -> i64 { self.minor }
}

impl TryFrom<Decimal> for Price {
  type Error = Error;

  fn try_from(value: Decimal) -> Result<Self> { Self::new(value) }
}

impl TryFrom<f64> for Price {
  type Error = Error;

  fn try_from(value: f64) -> Result<Self> {
    if !value.is_finite() {
      return Err(Error::NonFinite);
    }
    // The shortest round-tripping representation, so 0.1 stays 0.1.
    let parsed: Decimal = value
      .to_string()
      .parse()
      .map_err(|_| Error::AmountOutOfRange)?;
    Self::new(parsed)
  }
}

impl From<Price> for Decimal {
  fn from(price: Price) -> Self { price.value }
}

impl fmt::Display for Price {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", Decimal::new(self.minor, MINOR_SCALE))
  }
}

// ─── Fee rate ────────────────────────────────────────────────────────────────

/// The platform's commission as a fraction of the gross price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct FeeRate(Decimal);

impl FeeRate {
  pub fn new(rate: Decimal) -> Result<Self> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
      return Err(Error::InvalidFeeRate(rate));
    }
    Ok(Self(rate))
  }

  pub fn value(&self) -> Decimal { self.0 }
}

impl TryFrom<Decimal> for FeeRate {
  type Error = Error;

  fn try_from(rate: Decimal) -> Result<Self> { Self::new(rate) }
}

impl From<FeeRate> for Decimal {
  fn from(rate: FeeRate) -> Self { rate.0 }
}

// ─── Split ───────────────────────────────────────────────────────────────────

/// The outcome of splitting a gross price between platform and creator.
///
/// Invariant: `platform_fee_minor_units + net_to_creator_minor_units ==
/// gross_minor_units`, all three non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSplit {
  pub gross_minor_units:          i64,
  pub platform_fee_minor_units:   i64,
  pub net_to_creator_minor_units: i64,
}

impl FeeSplit {
  pub fn gross(&self) -> Decimal { Decimal::new(self.gross_minor_units, MINOR_SCALE) }

  pub fn platform_fee(&self) -> Decimal {
    Decimal::new(self.platform_fee_minor_units, MINOR_SCALE)
  }

  pub fn net_to_creator(&self) -> Decimal {
    Decimal::new(self.net_to_creator_minor_units, MINOR_SCALE)
  }
}

/// Computes the platform commission for a sale.
///
/// The fee is rounded down to the minor unit, so the platform never takes
/// more than `rate` of the gross.
#[derive(Debug, Clone, Copy)]
pub struct FeeCalculator {
  rate: FeeRate,
}

impl FeeCalculator {
  pub fn new(rate: FeeRate) -> Self { Self { rate } }

  pub fn rate(&self) -> FeeRate { self.rate }

  pub fn split(&self, price: Price) -> FeeSplit {
    let gross = price.minor_units();
    let fee = (Decimal::from(gross) * self.rate.value())
      .floor()
      .to_i64()
      .map_or(0, |fee| fee.clamp(0, gross));
    FeeSplit {
      gross_minor_units:          gross,
      platform_fee_minor_units:   fee,
      net_to_creator_minor_units: gross - fee,
    }
  }

  /// Validate and split an arbitrary decimal amount.
  pub fn split_amount(&self, gross: Decimal) -> Result<FeeSplit> {
    Ok(self.split(Price::new(gross)?))
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  fn five_percent() -> FeeCalculator { FeeCalculator::new(FeeRate::new(dec!(0.05)).unwrap()) }

  #[test]
  fn ninety_seven_at_five_percent() {
    let split = five_percent().split(Price::new(dec!(97.00)).unwrap());
    assert_eq!(split.platform_fee(), dec!(4.85));
    assert_eq!(split.net_to_creator(), dec!(92.15));
    assert_eq!(split.platform_fee() + split.net_to_creator(), dec!(97.00));
  }

  #[test]
  fn fee_is_rounded_down() {
    // 0.99 * 5% = 0.0495 → 0.04
    let split = five_percent().split(Price::new(dec!(0.99)).unwrap());
    assert_eq!(split.platform_fee_minor_units, 4);
    assert_eq!(split.net_to_creator_minor_units, 95);
  }

  #[test]
  fn fee_and_net_always_sum_to_gross() {
    let rates = [dec!(0), dec!(0.05), dec!(0.029), dec!(0.3333), dec!(1)];
    for rate in rates {
      let calc = FeeCalculator::new(FeeRate::new(rate).unwrap());
      for minor in (0..5_000).chain([999_999, 123_456_789]) {
        let split = calc.split(Price::from_minor_units(minor).unwrap());
        assert!(split.platform_fee_minor_units >= 0, "rate {rate}, minor {minor}");
        assert!(split.net_to_creator_minor_units >= 0, "rate {rate}, minor {minor}");
        assert_eq!(
          split.platform_fee_minor_units + split.net_to_creator_minor_units,
          minor,
          "rate {rate}, minor {minor}"
        );
      }
    }
  }

  #[test]
  fn zero_price_has_zero_fee() {
    let split = five_percent().split(Price::ZERO);
    assert_eq!(split, FeeSplit {
      gross_minor_units:          0,
      platform_fee_minor_units:   0,
      net_to_creator_minor_units: 0,
    });
  }

  #[test]
  fn negative_amount_is_rejected() {
    assert!(matches!(
      five_percent().split_amount(dec!(-1.00)),
      Err(Error::NegativeAmount(_))
    ));
  }

  #[test]
  fn non_finite_amounts_are_rejected() {
    assert!(matches!(Price::try_from(f64::NAN), Err(Error::NonFinite)));
    assert!(matches!(Price::try_from(f64::INFINITY), Err(Error::NonFinite)));
    assert!(matches!(Price::try_from(f64::NEG_INFINITY), Err(Error::NonFinite)));
  }

  #[test]
  fn float_prices_keep_their_short_form() {
    let price = Price::try_from(97.1_f64).unwrap();
    assert_eq!(price.minor_units(), 9710);
  }

  #[test]
  fn sub_cent_precision_is_rejected() {
    assert!(matches!(Price::new(dec!(1.005)), Err(Error::TooPrecise(_))));
    // Trailing zeros are not extra precision.
    assert!(Price::new(dec!(1.5000)).is_ok());
  }

  #[test]
  fn fee_rate_bounds() {
    assert!(FeeRate::new(dec!(-0.01)).is_err());
    assert!(FeeRate::new(dec!(1.01)).is_err());
    assert!(FeeRate::new(dec!(1)).is_ok());
  }

  #[test]
  fn price_deserialises_through_validation() {
    let ok: Price = serde_json::from_str("\"19.90\"").unwrap();
    assert_eq!(ok.minor_units(), 1990);
    assert!(serde_json::from_str::<Price>("\"-3\"").is_err());
  }
}
