//! Adaptive Curve Interest Rate Model.
//!
//! The borrow rate follows a curve around 90% utilization: above target it rises
//! up to 4x `rate_at_target`, below target it falls down to 1/4x. The
//! `rate_at_target` itself drifts exponentially with the utilization error at
//! 50% per year, clamped to `[MIN_RATE_AT_TARGET, MAX_RATE_AT_TARGET]`.
//!
//! ```rust
//! use morpho_rs_sim::irm::{get_borrow_rate, INITIAL_RATE_AT_TARGET, TARGET_UTILIZATION};
//!
//! let result = get_borrow_rate(TARGET_UTILIZATION, INITIAL_RATE_AT_TARGET, 0);
//! assert_eq!(result.end_borrow_rate, INITIAL_RATE_AT_TARGET);
//! ```

use alloy_primitives::U256;

use crate::math::{max, min, w_mul_down, WAD};

/// Curve steepness parameter (4.0 in WAD)
pub const CURVE_STEEPNESS: U256 = U256::from_limbs([4_000_000_000_000_000_000, 0, 0, 0]);

/// Target utilization rate (90% in WAD = 0.9)
pub const TARGET_UTILIZATION: U256 = U256::from_limbs([900_000_000_000_000_000, 0, 0, 0]);

/// 4% per year, per second
pub const INITIAL_RATE_AT_TARGET: U256 = U256::from_limbs([1_268_391_679, 0, 0, 0]);

/// 50% per year, per second
pub const ADJUSTMENT_SPEED: U256 = U256::from_limbs([15_854_895_991, 0, 0, 0]);

/// 0.1% per year, per second
pub const MIN_RATE_AT_TARGET: U256 = U256::from_limbs([31_709_791, 0, 0, 0]);

/// 200% per year, per second
pub const MAX_RATE_AT_TARGET: U256 = U256::from_limbs([63_419_583_967, 0, 0, 0]);

/// ln(2) scaled by WAD
pub const LN_2_INT: i128 = 693_147_180_559_945_309;

/// ln(1e-18) scaled by WAD
pub const LN_WEI_INT: i128 = -41_446_531_673_892_822_312;

/// Above this input `w_exp` is clipped
pub const WEXP_UPPER_BOUND: i128 = 93_859_467_695_000_404_319;

/// `w_exp(WEXP_UPPER_BOUND)`
pub const WEXP_UPPER_VALUE: U256 = U256::from_limbs([
    0x3216C1AD5D72C200,
    0x09BA5D32E9C0DE49,
    0x80,
    0,
]);

const WAD_I: i128 = 1_000_000_000_000_000_000;

/// Rates produced by one IRM evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowRateResult {
    /// Average borrow rate over the elapsed period, used to accrue interest
    pub avg_borrow_rate: U256,
    /// Instantaneous borrow rate at the end of the period
    pub end_borrow_rate: U256,
    /// Rate at target stored after the period
    pub end_rate_at_target: U256,
}

/// `e^x` in WAD, decomposed as `2^q * e^r` with `|r| <= ln(2)/2`.
pub fn w_exp(x: i128) -> U256 {
    if x < LN_WEI_INT {
        return U256::ZERO;
    }
    if x >= WEXP_UPPER_BOUND {
        return WEXP_UPPER_VALUE;
    }

    let rounding_adjustment = if x < 0 { -(LN_2_INT / 2) } else { LN_2_INT / 2 };
    let q = (x + rounding_adjustment) / LN_2_INT;
    let r = x - q * LN_2_INT;

    // second order Taylor polynomial
    let exp_r = WAD_I + r + (r * r) / WAD_I / 2;
    let exp_r = U256::from(exp_r.unsigned_abs());

    if q >= 0 {
        exp_r << (q as usize)
    } else {
        exp_r >> ((-q) as usize)
    }
}

/// Multiplies two signed WAD numbers, truncating toward zero.
fn w_mul_to_zero(x: i128, y: i128) -> i128 {
    x.saturating_mul(y) / WAD_I
}

/// Divides two signed WAD numbers, truncating toward zero.
fn w_div_to_zero(x: i128, y: i128) -> i128 {
    if y == 0 {
        return 0;
    }
    x.saturating_mul(WAD_I) / y
}

fn to_i128(value: U256) -> i128 {
    value.saturating_to::<i128>()
}

fn new_rate_at_target(start_rate_at_target: U256, linear_adaptation: i128) -> U256 {
    let rate = w_mul_down(start_rate_at_target, w_exp(linear_adaptation));
    min(max(rate, MIN_RATE_AT_TARGET), MAX_RATE_AT_TARGET)
}

fn curve(rate_at_target: U256, err: i128) -> U256 {
    let coefficient = if err < 0 {
        WAD_I - w_div_to_zero(WAD_I, to_i128(CURVE_STEEPNESS))
    } else {
        to_i128(CURVE_STEEPNESS) - WAD_I
    };
    let factor = w_mul_to_zero(coefficient, err) + WAD_I;

    w_mul_down(U256::from(factor.max(0).unsigned_abs()), rate_at_target)
}

/// Evaluates the IRM for a market at `utilization` after `elapsed` seconds.
///
/// A zero `rate_at_target` means the market was never touched by the IRM and
/// starts at [`INITIAL_RATE_AT_TARGET`].
pub fn get_borrow_rate(utilization: U256, rate_at_target: U256, elapsed: u64) -> BorrowRateResult {
    let utilization = to_i128(min(utilization, WAD));
    let target = to_i128(TARGET_UTILIZATION);

    let err_norm_factor = if utilization > target {
        WAD_I - target
    } else {
        target
    };
    let err = w_div_to_zero(utilization - target, err_norm_factor);

    let (avg_rate_at_target, end_rate_at_target) = if rate_at_target.is_zero() {
        (INITIAL_RATE_AT_TARGET, INITIAL_RATE_AT_TARGET)
    } else {
        let speed = w_mul_to_zero(to_i128(ADJUSTMENT_SPEED), err);
        let linear_adaptation = speed.saturating_mul(i128::from(elapsed));

        if linear_adaptation == 0 {
            (rate_at_target, rate_at_target)
        } else {
            let end = new_rate_at_target(rate_at_target, linear_adaptation);
            let mid = new_rate_at_target(rate_at_target, linear_adaptation / 2);
            let avg = (rate_at_target + end + U256::from(2) * mid) / U256::from(4);
            (avg, end)
        }
    };

    BorrowRateResult {
        avg_borrow_rate: curve(avg_rate_at_target, err),
        end_borrow_rate: curve(end_rate_at_target, err),
        end_rate_at_target,
    }
}
