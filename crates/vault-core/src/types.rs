// vault-core/src/types.rs

use crate::{CoreError, CoreResult};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Sequential epoch identifier, starting at 1
pub type EpochId = u64;

/// Fixed-point scale for protocol rates (APRs, fees): 10 decimals
pub const RATE_SCALE: u128 = 10_000_000_000;

/// Account address (20 bytes, hex-encoded for display)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Create address from bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(CoreError::InvalidAddress("Invalid address length".into()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Deterministic address for a synthetic vault-owned account, such as a
    /// per-epoch redemption queue. The tag byte keeps these from colliding
    /// with user addresses derived from the parent.
    pub fn derived(parent: &Address, tag: u8, index: u64) -> Self {
        let mut bytes = *parent.as_bytes();
        bytes[11] ^= tag;
        for (i, b) in index.to_be_bytes().iter().enumerate() {
            bytes[12 + i] ^= b;
        }
        Self(bytes)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Token amount (using BigUint for arbitrary precision)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::from(0u64))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    /// Whole tokens at 18 decimals (1 token = 10^18 base units)
    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * BigUint::from(10u64).pow(18))
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn into_inner(self) -> BigUint {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::from(0u64)
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    /// `self * numerator / denominator` with full intermediate precision,
    /// rounding down. `None` when the denominator is zero.
    pub fn mul_div(&self, numerator: &Amount, denominator: &Amount) -> Option<Amount> {
        crate::math::mul_div(&self.0, &numerator.0, &denominator.0).map(Amount)
    }

    /// Scale by a power of ten (used for virtual-share decimal offsets)
    pub fn scale_up(&self, decimals: u8) -> Amount {
        Amount(&self.0 * BigUint::from(10u64).pow(decimals as u32))
    }

    pub fn min_of(&self, other: &Amount) -> Amount {
        if self.0 <= other.0 {
            self.clone()
        } else {
            other.clone()
        }
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol rate (APR, fee fraction) at the 1e10 settings scale.
///
/// `Rate::from_percent(10)` is a 10% fee; applying it to an `Amount`
/// rounds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(u128);

impl Rate {
    pub fn from_scaled(value: u128) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    /// One hundred percent
    pub fn one() -> Self {
        Self(RATE_SCALE)
    }

    pub fn from_percent(percent: u64) -> Self {
        Self(percent as u128 * RATE_SCALE / 100)
    }

    /// Construct from a decimal percentage, e.g. `dec!(0.3)` for 0.3%
    pub fn from_percent_decimal(percent: Decimal) -> CoreResult<Self> {
        if percent.is_sign_negative() {
            return Err(CoreError::InvalidRate("Rate cannot be negative".into()));
        }
        let scaled = percent * Decimal::from_u128(RATE_SCALE / 100).unwrap_or_default();
        scaled
            .trunc()
            .to_u128()
            .map(Self)
            .ok_or_else(|| CoreError::InvalidRate(format!("Rate out of range: {percent}")))
    }

    pub fn scaled(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `amount * rate`, rounding down
    pub fn apply(&self, amount: &Amount) -> Amount {
        let scaled = amount.inner() * BigUint::from(self.0);
        Amount::new(scaled / BigUint::from(RATE_SCALE))
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:010}", self.0 / RATE_SCALE, self.0 % RATE_SCALE)
    }
}
