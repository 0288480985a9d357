//! Fixed-point rates and the proportional share computation.
//!
//! A [`Rate`] is a non-negative decimal with 18 fractional digits stored as
//! a raw `u64` (`1.0 == RATE_PRECISION`). All products use `u128`
//! intermediates, so every result is exact before the final truncation
//! toward zero and identical on every machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{RATE_DECIMALS, RATE_PRECISION};
use crate::error::ParseError;

/// A fixed-point fraction with 18 decimal places.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct Rate(u64);

impl Rate {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(RATE_PRECISION);

    /// Wrap a raw fixed-point value (`10^18` == 1.0).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Rate of `numerator / 100`, e.g. `Rate::percent(5)` is 0.05.
    pub const fn percent(numerator: u64) -> Self {
        Self(numerator * (RATE_PRECISION / 100))
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// `floor(amount × self)`. Returns `None` if the result exceeds `u64`.
    pub fn mul_floor(&self, amount: u64) -> Option<u64> {
        let product = amount as u128 * self.0 as u128;
        u64::try_from(product / RATE_PRECISION as u128).ok()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / RATE_PRECISION;
        let frac = self.0 % RATE_PRECISION;
        write!(f, "{int}.{frac:0width$}", width = RATE_DECIMALS as usize)
    }
}

/// Accepts `"1"`, `"0.2"`, `".5"` and up to 18 fractional digits.
impl FromStr for Rate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidRate(s.to_string());
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(invalid());
        }
        if frac_part.len() > RATE_DECIMALS as usize {
            return Err(ParseError::RatePrecision {
                value: s.to_string(),
                max: RATE_DECIMALS,
            });
        }

        let out_of_range = || ParseError::RateOutOfRange(s.to_string());
        let int: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| out_of_range())?
        };
        let frac: u64 = if frac_part.is_empty() {
            0
        } else {
            let padding = RATE_DECIMALS - frac_part.len() as u32;
            frac_part
                .parse::<u64>()
                .map_err(|_| invalid())?
                * 10u64.pow(padding)
        };

        int.checked_mul(RATE_PRECISION)
            .and_then(|v| v.checked_add(frac))
            .map(Self)
            .ok_or_else(out_of_range)
    }
}

impl TryFrom<String> for Rate {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rate> for String {
    fn from(rate: Rate) -> Self {
        rate.to_string()
    }
}

/// A participant's payout: `floor(balance × rate × usage / total)`.
///
/// Computed exactly: with `pool = balance × rate_raw` (fits in `u128`),
/// `pool × usage / total` is split as `(pool / total) × usage` plus
/// `(pool % total) × usage / total`, neither of which can overflow while
/// `usage <= total`. The final division by `RATE_PRECISION` truncates.
///
/// Returns `None` when `total` is zero, `usage > total`, or the result does
/// not fit in `u64`.
pub fn proportional_share(balance: u64, rate: Rate, usage: u64, total: u64) -> Option<u64> {
    if total == 0 || usage > total {
        return None;
    }
    let pool = balance as u128 * rate.raw() as u128;
    let total = total as u128;
    let usage = usage as u128;

    let whole = (pool / total).checked_mul(usage)?;
    let part = (pool % total) * usage / total;
    let scaled = whole.checked_add(part)?;

    u64::try_from(scaled / RATE_PRECISION as u128).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rate(s: &str) -> Rate {
        s.parse().unwrap()
    }

    // --- parsing / display ---

    #[test]
    fn parse_simple_fractions() {
        assert_eq!(rate("0.2").raw(), RATE_PRECISION / 5);
        assert_eq!(rate(".5").raw(), RATE_PRECISION / 2);
        assert_eq!(rate("1"), Rate::ONE);
        assert_eq!(rate("1.0"), Rate::ONE);
        assert_eq!(rate("0"), Rate::ZERO);
        assert_eq!(rate("0.000000000000000001").raw(), 1);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", ".", "-0.1", "0.1.2", "abc", "1e3", " 0.1"] {
            assert!(bad.parse::<Rate>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn parse_rejects_excess_precision() {
        assert!(matches!(
            "0.0000000000000000001".parse::<Rate>(),
            Err(ParseError::RatePrecision { .. })
        ));
    }

    #[test]
    fn parse_rejects_out_of_range() {
        assert!(matches!(
            "100".parse::<Rate>(),
            Err(ParseError::RateOutOfRange(_))
        ));
    }

    #[test]
    fn display_pads_eighteen_digits() {
        assert_eq!(rate("0.2").to_string(), "0.200000000000000000");
        assert_eq!(Rate::ONE.to_string(), "1.000000000000000000");
    }

    #[test]
    fn percent_constructor() {
        assert_eq!(Rate::percent(5), rate("0.05"));
        assert_eq!(Rate::percent(100), Rate::ONE);
    }

    #[test]
    fn json_is_decimal_string() {
        let json = serde_json::to_string(&rate("0.6")).unwrap();
        assert_eq!(json, "\"0.600000000000000000\"");
        assert_eq!(serde_json::from_str::<Rate>(&json).unwrap(), rate("0.6"));
    }

    #[test]
    fn mul_floor_truncates() {
        assert_eq!(rate("0.2").mul_floor(100), Some(20));
        assert_eq!(rate("0.333").mul_floor(10), Some(3));
        assert_eq!(Rate::ONE.mul_floor(u64::MAX), Some(u64::MAX));
    }

    // --- proportional_share ---

    #[test]
    fn share_matches_worked_example() {
        // 100 units, 20% allocation, half of the usage.
        assert_eq!(proportional_share(100, rate("0.2"), 500, 1000), Some(10));
    }

    #[test]
    fn share_truncates_toward_zero() {
        // 10 × 0.2 × 1/3 = 0.666…
        assert_eq!(proportional_share(10, rate("0.2"), 1, 3), Some(0));
        // 100 × 0.2 × 1/3 = 6.666…
        assert_eq!(proportional_share(100, rate("0.2"), 1, 3), Some(6));
    }

    #[test]
    fn share_keeps_fractional_pool() {
        // pool = 7 × 0.5 = 3.5; full usage → floor(3.5) = 3
        assert_eq!(proportional_share(7, rate("0.5"), 4, 4), Some(3));
        // half of 3.5 → 1.75 → 1
        assert_eq!(proportional_share(7, rate("0.5"), 2, 4), Some(1));
        // pool = 1.5; 2/3 of it is exactly 1, truncating the pool first would give 0
        assert_eq!(proportional_share(3, rate("0.5"), 2, 3), Some(1));
    }

    #[test]
    fn share_rejects_zero_total_and_excess_usage() {
        assert_eq!(proportional_share(100, rate("0.2"), 0, 0), None);
        assert_eq!(proportional_share(100, rate("0.2"), 11, 10), None);
    }

    #[test]
    fn share_extreme_values() {
        assert_eq!(
            proportional_share(u64::MAX, Rate::ONE, u64::MAX, u64::MAX),
            Some(u64::MAX)
        );
        assert_eq!(proportional_share(u64::MAX, Rate::ONE, 1, u64::MAX), Some(1));
    }

    proptest! {
        #[test]
        fn share_never_exceeds_pool(
            balance in any::<u64>(),
            raw in 0u64..=RATE_PRECISION,
            usage in any::<u64>(),
            extra in any::<u64>(),
        ) {
            let total = usage.saturating_add(extra).max(1);
            let usage = usage.min(total);
            let r = Rate::from_raw(raw);
            let share = proportional_share(balance, r, usage, total).unwrap();
            prop_assert!(share <= r.mul_floor(balance).unwrap());
        }

        #[test]
        fn shares_sum_within_pool(
            balance in any::<u64>(),
            raw in 1u64..=RATE_PRECISION,
            usages in proptest::collection::vec(0u64..=u32::MAX as u64, 1..20),
        ) {
            let total: u64 = usages.iter().sum();
            prop_assume!(total > 0);
            let r = Rate::from_raw(raw);
            let sum: u128 = usages
                .iter()
                .map(|u| proportional_share(balance, r, *u, total).unwrap() as u128)
                .sum();
            prop_assert!(sum <= r.mul_floor(balance).unwrap() as u128);
        }

        #[test]
        fn share_matches_wide_arithmetic(
            balance in any::<u32>(),
            raw in 0u64..=RATE_PRECISION,
            usage in any::<u32>(),
            extra in any::<u32>(),
        ) {
            let total = (usage as u64 + extra as u64).max(1);
            let usage = (usage as u64).min(total);
            // Small enough operands that the naive product fits in u128.
            let expected = (balance as u128 * raw as u128 * usage as u128)
                / (total as u128 * RATE_PRECISION as u128);
            prop_assert_eq!(
                proportional_share(balance as u64, Rate::from_raw(raw), usage, total),
                Some(expected as u64)
            );
        }

        #[test]
        fn display_parse_roundtrip(raw in any::<u64>()) {
            let r = Rate::from_raw(raw);
            prop_assert_eq!(r.to_string().parse::<Rate>().unwrap(), r);
        }
    }
}
