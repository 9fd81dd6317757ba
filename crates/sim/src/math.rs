//! Fixed-point arithmetic mirroring Morpho's `MathLib`, `SharesMathLib` and `UtilsLib`.
//!
//! All helpers operate on `U256` and never panic: multiplication saturates and a
//! zero denominator saturates the quotient to `U256::MAX`. Values reached by real
//! markets stay far below those bounds.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// 1e18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 1e27, the scale of adapter share prices (`maxSharePriceE27`)
pub const RAY: U256 = U256::from_limbs([0x9fd0803ce8000000, 0x33b2e3c, 0, 0]);

/// Seconds in a 365 day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Virtual shares added to market share totals (1e6)
pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);

/// Virtual assets added to market asset totals
pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Rounding direction for fixed-point conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingDirection {
    Up,
    Down,
}

/// `x * y / d` rounded in the given direction.
pub fn mul_div(x: U256, y: U256, d: U256, rounding: RoundingDirection) -> U256 {
    match rounding {
        RoundingDirection::Down => mul_div_down(x, y, d),
        RoundingDirection::Up => mul_div_up(x, y, d),
    }
}

pub fn mul_div_down(x: U256, y: U256, d: U256) -> U256 {
    x.saturating_mul(y).checked_div(d).unwrap_or(U256::MAX)
}

pub fn mul_div_up(x: U256, y: U256, d: U256) -> U256 {
    if d.is_zero() {
        return U256::MAX;
    }
    x.saturating_mul(y)
        .saturating_add(d - U256::from(1))
        .checked_div(d)
        .unwrap_or(U256::MAX)
}

pub fn w_mul_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, y, WAD)
}

pub fn w_mul_up(x: U256, y: U256) -> U256 {
    mul_div_up(x, y, WAD)
}

pub fn w_div_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, WAD, y)
}

pub fn w_div_up(x: U256, y: U256) -> U256 {
    mul_div_up(x, WAD, y)
}

/// `x * RAY / y` rounded down, used for adapter share price bounds.
pub fn r_div_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, RAY, y)
}

/// `x * RAY / y` rounded up.
pub fn r_div_up(x: U256, y: U256) -> U256 {
    mul_div_up(x, RAY, y)
}

/// Third-order Taylor expansion of `e^(x * n) - 1`, used to compound interest.
pub fn w_taylor_compounded(x: U256, n: U256) -> U256 {
    let first_term = x.saturating_mul(n);
    let second_term = mul_div_down(first_term, first_term, U256::from(2) * WAD);
    let third_term = mul_div_down(second_term, first_term, U256::from(3) * WAD);

    first_term
        .saturating_add(second_term)
        .saturating_add(third_term)
}

/// Converts assets to shares with the virtual liquidity offset.
pub fn assets_to_shares(
    assets: U256,
    total_assets: U256,
    total_shares: U256,
    rounding: RoundingDirection,
) -> U256 {
    mul_div(
        assets,
        total_shares.saturating_add(VIRTUAL_SHARES),
        total_assets.saturating_add(VIRTUAL_ASSETS),
        rounding,
    )
}

/// Converts shares to assets with the virtual liquidity offset.
pub fn shares_to_assets(
    shares: U256,
    total_assets: U256,
    total_shares: U256,
    rounding: RoundingDirection,
) -> U256 {
    mul_div(
        shares,
        total_assets.saturating_add(VIRTUAL_ASSETS),
        total_shares.saturating_add(VIRTUAL_SHARES),
        rounding,
    )
}

pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

pub fn max(a: U256, b: U256) -> U256 {
    if a > b {
        a
    } else {
        b
    }
}

/// `max(a - b, 0)`
pub fn zero_floor_sub(a: U256, b: U256) -> U256 {
    a.saturating_sub(b)
}

/// Converts a WAD-scaled value to `f64` (display only).
pub fn rate_to_f64(value: U256) -> f64 {
    let value: f64 = value.saturating_to::<u128>() as f64;
    value / 1e18
}

/// Converts a WAD-scaled per-second rate to a continuously compounded APY.
pub fn rate_to_apy(rate: U256) -> f64 {
    let per_second = rate_to_f64(rate);
    (per_second * SECONDS_PER_YEAR as f64).exp_m1()
}

/// Fraction expressed in WAD, e.g. `wad_fraction(3, 10_000)` is 0.03%.
pub fn wad_fraction(numerator: u64, denominator: u64) -> U256 {
    mul_div_down(U256::from(numerator), WAD, U256::from(denominator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_constants() {
        assert_eq!(WAD, U256::from(10u64).pow(U256::from(18)));
        assert_eq!(RAY, U256::from(10u64).pow(U256::from(27)));
    }

    #[test]
    fn test_mul_div_rounding() {
        let seven = U256::from(7);
        let two = U256::from(2);
        let one = U256::from(1);
        assert_eq!(mul_div_down(seven, one, two), U256::from(3));
        assert_eq!(mul_div_up(seven, one, two), U256::from(4));
        assert_eq!(mul_div_up(U256::from(8), one, two), U256::from(4));
    }

    #[test]
    fn test_division_by_zero_saturates() {
        assert_eq!(mul_div_down(U256::from(1), U256::from(1), U256::ZERO), U256::MAX);
        assert_eq!(mul_div_up(U256::from(1), U256::from(1), U256::ZERO), U256::MAX);
    }

    #[test]
    fn test_w_taylor_compounded_zero_elapsed() {
        assert_eq!(w_taylor_compounded(U256::from(1_268_391_679u64), U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_w_taylor_compounded_close_to_exp() {
        // ~4% per year for one year
        let rate = U256::from(1_268_391_679u64);
        let compounded = w_taylor_compounded(rate, U256::from(SECONDS_PER_YEAR));
        let as_f64 = rate_to_f64(compounded);
        assert!((as_f64 - 0.0408).abs() < 0.001);
    }

    #[test]
    fn test_assets_to_shares_empty_market() {
        let shares = assets_to_shares(
            U256::from(1_000_000u64),
            U256::ZERO,
            U256::ZERO,
            RoundingDirection::Down,
        );
        assert_eq!(shares, U256::from(1_000_000_000_000u64));
    }

    #[test]
    fn test_zero_floor_sub() {
        assert_eq!(zero_floor_sub(U256::from(1), U256::from(2)), U256::ZERO);
        assert_eq!(zero_floor_sub(U256::from(5), U256::from(2)), U256::from(3));
    }

    #[test]
    fn test_wad_fraction() {
        assert_eq!(wad_fraction(3, 10_000), U256::from(300_000_000_000_000u64));
    }

    proptest! {
        #[test]
        fn prop_assets_round_trip_never_increases(
            assets in 0u128..1_000_000_000_000_000_000_000u128,
            total_assets in 0u128..1_000_000_000_000_000_000_000_000u128,
            share_factor in 1u128..1_000_000_000_000u128,
        ) {
            let total_assets = U256::from(total_assets);
            let total_shares = total_assets * U256::from(share_factor);
            let assets = U256::from(assets);

            let shares = assets_to_shares(assets, total_assets, total_shares, RoundingDirection::Down);
            let back = shares_to_assets(shares, total_assets, total_shares, RoundingDirection::Down);
            prop_assert!(back <= assets);
        }

        #[test]
        fn prop_shares_round_trip_never_increases(
            shares in 0u128..1_000_000_000_000_000_000_000_000u128,
            total_assets in 0u128..1_000_000_000_000_000_000_000_000u128,
            share_factor in 1u128..1_000_000_000_000u128,
        ) {
            let total_assets = U256::from(total_assets);
            let total_shares = total_assets * U256::from(share_factor);
            let shares = U256::from(shares);

            let assets = shares_to_assets(shares, total_assets, total_shares, RoundingDirection::Down);
            let back = assets_to_shares(assets, total_assets, total_shares, RoundingDirection::Down);
            prop_assert!(back <= shares);
        }

        #[test]
        fn prop_round_up_dominates_round_down(
            x in 0u128..u128::MAX,
            y in 0u128..u128::MAX,
            d in 1u128..u128::MAX,
        ) {
            let (x, y, d) = (U256::from(x), U256::from(y), U256::from(d));
            let down = mul_div_down(x, y, d);
            let up = mul_div_up(x, y, d);
            prop_assert!(up >= down);
            prop_assert!(up - down <= U256::from(1));
        }
    }
}
