//! # Core Entities
//!
//! Amounts, networks and address classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Zatoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Decimal places used on the RPC wire.
pub const AMOUNT_DECIMALS: usize = 8;

/// A non-negative coin amount stored as integer zatoshis.
///
/// The daemon speaks decimal coins (`1.23456789`); all arithmetic inside the
/// wallet core is done on the integer form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

/// Errors produced when converting external representations to [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is negative: {0}")]
    Negative(String),
    #[error("amount has more than 8 decimal places: {0}")]
    TooPrecise(String),
    #[error("amount is not a number: {0}")]
    Malformed(String),
    #[error("amount overflows: {0}")]
    Overflow(String),
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    #[must_use]
    pub const fn from_zat(zat: u64) -> Self {
        Self(zat)
    }

    #[must_use]
    pub const fn zat(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal coin string such as `"0.0005"` or `"12"`.
    pub fn from_coins_str(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(AmountError::Negative(s.to_string()));
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS {
            return Err(AmountError::TooPrecise(s.to_string()));
        }
        let digits_ok = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !digits_ok(whole) || !digits_ok(frac) {
            return Err(AmountError::Malformed(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| AmountError::Overflow(s.to_string()))?
        };
        let mut frac_zat: u64 = 0;
        if !frac.is_empty() {
            let padded = format!("{frac:0<width$}", width = AMOUNT_DECIMALS);
            frac_zat = padded
                .parse()
                .map_err(|_| AmountError::Malformed(s.to_string()))?;
        }

        whole
            .checked_mul(COIN)
            .and_then(|w| w.checked_add(frac_zat))
            .map(Self)
            .ok_or_else(|| AmountError::Overflow(s.to_string()))
    }

    /// Convert a JSON number returned by the daemon.
    ///
    /// Rounds to the nearest zatoshi.
    pub fn from_coins_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::Malformed(value.to_string()));
        }
        if value < 0.0 {
            return Err(AmountError::Negative(value.to_string()));
        }
        let zat = (value * COIN as f64).round();
        if zat > u64::MAX as f64 {
            return Err(AmountError::Overflow(value.to_string()));
        }
        Ok(Self(zat as u64))
    }

    /// Render as the daemon expects: always eight decimal places.
    #[must_use]
    pub fn to_rpc_string(self) -> String {
        format!("{}.{:08}", self.0 / COIN, self.0 % COIN)
    }

    #[must_use]
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    #[must_use]
    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Self(self.0.saturating_sub(rhs.0))
    }

    #[must_use]
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[must_use]
    pub fn checked_mul(self, n: u64) -> Option<Amount> {
        self.0.checked_mul(n).map(Self)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        self.saturating_sub(rhs)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rpc_string())
    }
}

/// Chain the daemon runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// RPC port assumed when the daemon conf does not name one.
    #[must_use]
    pub const fn default_rpc_port(self) -> u16 {
        match self {
            Network::Mainnet => 8232,
            Network::Testnet => 18232,
        }
    }

    #[must_use]
    pub const fn is_testnet(self) -> bool {
        matches!(self, Network::Testnet)
    }
}

/// Shielded value pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShieldedPool {
    Sprout,
    Sapling,
}

/// Address kind derived from its encoding prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Transparent,
    Shielded(ShieldedPool),
}

impl AddressKind {
    /// Classify an encoded address.
    ///
    /// Sapling: `zs…` (mainnet) or `ztestsapling…` (testnet).
    /// Sprout: `zc…` (mainnet) or `zt…` (testnet).
    /// Everything else is treated as transparent.
    #[must_use]
    pub fn classify(address: &str) -> Self {
        if address.starts_with("zs") || address.starts_with("ztestsapling") {
            AddressKind::Shielded(ShieldedPool::Sapling)
        } else if address.starts_with("zc") || address.starts_with("zt") {
            AddressKind::Shielded(ShieldedPool::Sprout)
        } else {
            AddressKind::Transparent
        }
    }

    #[must_use]
    pub fn pool(self) -> Option<ShieldedPool> {
        match self {
            AddressKind::Shielded(pool) => Some(pool),
            AddressKind::Transparent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimum_migration_amount() {
        let a = Amount::from_coins_str("0.0005").unwrap();
        assert_eq!(a.zat(), 50_000);
        assert_eq!(a.to_rpc_string(), "0.00050000");
    }

    #[test]
    fn test_parse_whole_and_leading_dot() {
        assert_eq!(Amount::from_coins_str("3").unwrap().zat(), 3 * COIN);
        assert_eq!(Amount::from_coins_str(".5").unwrap().zat(), COIN / 2);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            Amount::from_coins_str("-1"),
            Err(AmountError::Negative(_))
        ));
        assert!(matches!(
            Amount::from_coins_str("0.000000001"),
            Err(AmountError::TooPrecise(_))
        ));
        assert!(matches!(
            Amount::from_coins_str("1.2x"),
            Err(AmountError::Malformed(_))
        ));
        assert!(matches!(
            Amount::from_coins_str("."),
            Err(AmountError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_f64_rounds_to_zatoshi() {
        let a = Amount::from_coins_f64(0.1 + 0.2).unwrap();
        assert_eq!(a.zat(), 30_000_000);
        assert!(Amount::from_coins_f64(-0.1).is_err());
        assert!(Amount::from_coins_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_subtraction_saturates() {
        let small = Amount::from_zat(5);
        let big = Amount::from_zat(10);
        assert_eq!(small - big, Amount::ZERO);
        assert_eq!(small.checked_sub(big), None);
    }

    #[test]
    fn test_sum() {
        let total: Amount = [1u64, 2, 3].iter().map(|z| Amount::from_zat(*z)).sum();
        assert_eq!(total.zat(), 6);
    }

    #[test]
    fn test_address_classification() {
        assert_eq!(
            AddressKind::classify("zcU1Cd6zYyZCd2VJF8yKgmzjxdiiU1rgTTjEwoN1CGUWCziPkUTXUjXmX7TMqdMNsTfuiGN1jQoVN4kGxUR4sAPN4XZ7pxb"),
            AddressKind::Shielded(ShieldedPool::Sprout)
        );
        assert_eq!(
            AddressKind::classify("zs1z7rejlpsa98s2rrrfkwmaxu53e4ue0ulcrw0h4x5g8jl04tak0d3mm47vdtahatqrlkngh9slya"),
            AddressKind::Shielded(ShieldedPool::Sapling)
        );
        assert_eq!(
            AddressKind::classify("ztestsapling1abc"),
            AddressKind::Shielded(ShieldedPool::Sapling)
        );
        assert_eq!(AddressKind::classify("t1abc"), AddressKind::Transparent);
        assert_eq!(AddressKind::classify("t1abc").pool(), None);
    }

    #[test]
    fn test_network_ports() {
        assert_eq!(Network::Mainnet.default_rpc_port(), 8232);
        assert_eq!(Network::Testnet.default_rpc_port(), 18232);
    }

    #[test]
    fn test_amount_serde_is_integer() {
        let json = serde_json::to_string(&Amount::from_zat(42)).unwrap();
        assert_eq!(json, "42");
    }
}
