//! Core module types: addresses, denominations, allocations, incentives.
//!
//! Addresses are 20-byte account identifiers rendered as `0x`-prefixed hex.
//! Ordering on every key type is plain byte order, which is also the order
//! the stores iterate in.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{ADDRESS_LEN, MAX_DENOM_LEN, MIN_DENOM_LEN};
use crate::decimal::Rate;
use crate::error::{InvalidIncentive, ParseError};

/// A 20-byte account or contract address.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    /// The all-`0xff` address. Upper bound for range scans.
    pub const MAX: Self = Self([0xffu8; ADDRESS_LEN]);

    /// Create an address from raw bytes.
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Deterministic account address owned by a module: the first 20 bytes
    /// of `sha256(name)`.
    pub fn module(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Parse from a byte slice of exactly [`ADDRESS_LEN`] bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let arr: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| ParseError::InvalidAddressLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
        Self::try_from_slice(&bytes)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A validated token denomination.
///
/// Must start with an ASCII letter, followed by letters, digits or one of
/// `/ : . _ -`, with a total length between 3 and 128 characters.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct Denom(String);

impl Denom {
    /// Validate and wrap a denomination string.
    pub fn new(denom: impl Into<String>) -> Result<Self, ParseError> {
        let denom = denom.into();
        if !Self::is_valid(&denom) {
            return Err(ParseError::InvalidDenom(denom));
        }
        Ok(Self(denom))
    }

    /// Check the denomination grammar without allocating.
    pub fn is_valid(denom: &str) -> bool {
        let len = denom.len();
        if !(MIN_DENOM_LEN..=MAX_DENOM_LEN).contains(&len) {
            return false;
        }
        let mut chars = denom.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Denom {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Denom {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Denom> for String {
    fn from(denom: Denom) -> Self {
        denom.0
    }
}

impl AsRef<str> for Denom {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fraction of the pooled balance of `denom` an incentive pays out per epoch.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct Allocation {
    pub denom: Denom,
    pub rate: Rate,
}

impl Allocation {
    pub fn new(denom: Denom, rate: Rate) -> Self {
        Self { denom, rate }
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.denom, self.rate)
    }
}

/// Parses `denom:rate`, e.g. `uatom:0.05`.
impl FromStr for Allocation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (denom, rate) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseError::InvalidRate(s.to_string()))?;
        Ok(Self {
            denom: denom.parse()?,
            rate: rate.parse()?,
        })
    }
}

/// A registered incentive program for a single contract.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Incentive {
    /// Contract whose users are rewarded.
    pub contract: Address,
    /// Allocations, sorted by denom.
    pub allocations: Vec<Allocation>,
    /// Remaining distribution epochs.
    pub epochs: u32,
    /// Usage reported against this contract in the current cycle.
    pub total_usage: u64,
}

impl Incentive {
    /// Create a fresh incentive with zero usage. Allocations are sorted by
    /// denom so the stored order is canonical.
    pub fn new(contract: Address, mut allocations: Vec<Allocation>, epochs: u32) -> Self {
        allocations.sort_by(|a, b| a.denom.cmp(&b.denom));
        Self {
            contract,
            allocations,
            epochs,
            total_usage: 0,
        }
    }

    /// Whether the incentive still has epochs left to distribute.
    pub fn is_active(&self) -> bool {
        self.epochs > 0
    }

    /// The allocation for `denom`, if any.
    pub fn allocation(&self, denom: &Denom) -> Option<&Allocation> {
        self.allocations.iter().find(|a| &a.denom == denom)
    }

    /// Structural checks: at least one allocation, unique denoms, every rate
    /// in `(0, 1]`, and a positive epoch count.
    pub fn validate(&self) -> Result<(), InvalidIncentive> {
        validate_allocations(&self.allocations)?;
        for allocation in &self.allocations {
            if allocation.rate > Rate::ONE {
                return Err(InvalidIncentive::RateAboveOne {
                    denom: allocation.denom.clone(),
                    rate: allocation.rate,
                });
            }
        }
        if self.epochs == 0 {
            return Err(InvalidIncentive::ZeroEpochs);
        }
        Ok(())
    }
}

/// Shape checks shared by registration and genesis: non-empty, unique
/// denoms, nonzero rates. Upper bounds are left to the callers.
pub fn validate_allocations(allocations: &[Allocation]) -> Result<(), InvalidIncentive> {
    if allocations.is_empty() {
        return Err(InvalidIncentive::NoAllocations);
    }
    let mut seen = BTreeSet::new();
    for allocation in allocations {
        if !seen.insert(&allocation.denom) {
            return Err(InvalidIncentive::DuplicateDenom(allocation.denom.clone()));
        }
        if allocation.rate.is_zero() {
            return Err(InvalidIncentive::ZeroRate(allocation.denom.clone()));
        }
    }
    Ok(())
}

/// Cumulative usage of one participant against one contract.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UsageMeter {
    pub contract: Address,
    pub participant: Address,
    pub usage: u64,
}
