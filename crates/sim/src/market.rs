//! Market state and operations for Morpho Blue markets.
//!
//! A [`Market`] pairs immutable [`MarketParams`] with the mutable share and asset
//! totals. Every mutation accrues interest first and returns a new value; the
//! receiver is left untouched, which lets the planner compare alternate branches.
//!
//! # Example
//!
//! ```rust
//! use morpho_rs_sim::{Market, MarketParams, Quantity};
//! use alloy_primitives::{Address, U256};
//!
//! let params = MarketParams::new(
//!     Address::repeat_byte(1),
//!     Address::repeat_byte(2),
//!     Address::repeat_byte(3),
//!     Address::repeat_byte(4),
//!     U256::from(860_000_000_000_000_000u64),
//! );
//! let market = Market::new(params, 1000)
//!     .with_supply(U256::from(10_750_000_000u64), U256::from(10_750_000_000_000_000u64));
//!
//! let (market, assets, shares) = market
//!     .supply(Quantity::Assets(U256::from(1_000_000_000u64)), 1000)
//!     .unwrap();
//! assert_eq!(assets, U256::from(1_000_000_000u64));
//! assert_eq!(shares, U256::from(1_000_000_000_000_000u64));
//! assert_eq!(market.total_supply_assets, U256::from(11_750_000_000u64));
//! ```

use alloy_primitives::{keccak256, Address, U256};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{MarketId, SimError};
use crate::irm::get_borrow_rate;
use crate::math::{
    self, assets_to_shares, mul_div_down, mul_div_up, rate_to_apy, shares_to_assets,
    w_div_down, w_div_up, w_mul_down, w_mul_up, w_taylor_compounded, zero_floor_sub,
    RoundingDirection, WAD,
};

/// Liquidation cursor used to calculate the liquidation incentive (30%)
pub const LIQUIDATION_CURSOR: U256 = U256::from_limbs([300_000_000_000_000_000, 0, 0, 0]);

/// Maximum liquidation incentive factor (115%)
pub const MAX_LIQUIDATION_INCENTIVE_FACTOR: U256 =
    U256::from_limbs([1_150_000_000_000_000_000, 0, 0, 0]);

/// Oracle price scale (1e36)
pub const ORACLE_PRICE_SCALE: U256 =
    U256::from_limbs([0xB34B9F1000000000, 0x00C097CE7BC90715, 0, 0]);

/// Immutable parameters identifying a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    pub loan_token: Address,
    pub collateral_token: Address,
    pub oracle: Address,
    pub irm: Address,
    pub lltv: U256,
}

impl MarketParams {
    pub fn new(
        loan_token: Address,
        collateral_token: Address,
        oracle: Address,
        irm: Address,
        lltv: U256,
    ) -> Self {
        Self {
            loan_token,
            collateral_token,
            oracle,
            irm,
            lltv,
        }
    }

    /// `keccak256(abi.encode(marketParams))`
    pub fn id(&self) -> MarketId {
        let mut encoded = [0u8; 160];
        for (slot, address) in [self.loan_token, self.collateral_token, self.oracle, self.irm]
            .iter()
            .enumerate()
        {
            encoded[slot * 32 + 12..(slot + 1) * 32].copy_from_slice(address.as_slice());
        }
        encoded[128..].copy_from_slice(&self.lltv.to_be_bytes::<32>());
        keccak256(encoded)
    }
}

/// An amount given either in assets or in shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Assets(U256),
    Shares(U256),
}

/// Represents a lending market on Morpho Blue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// keccak256 of the market params
    pub id: MarketId,
    pub params: MarketParams,
    pub total_supply_assets: U256,
    pub total_borrow_assets: U256,
    pub total_supply_shares: U256,
    pub total_borrow_shares: U256,
    /// The block timestamp (in seconds) when interest was last accrued
    pub last_update: u64,
    /// The protocol fee percentage (WAD-scaled, e.g., 0.1 WAD = 10%)
    pub fee: U256,
    /// Rate at target of the Adaptive Curve IRM; `None` for markets without an IRM.
    #[serde(default)]
    pub rate_at_target: Option<U256>,
    /// Collateral price in loan units, scaled by [`ORACLE_PRICE_SCALE`]
    #[serde(default)]
    pub price: Option<U256>,
}

impl Market {
    /// Creates an empty market last accrued at `last_update`.
    pub fn new(params: MarketParams, last_update: u64) -> Self {
        Self {
            id: params.id(),
            params,
            total_supply_assets: U256::ZERO,
            total_borrow_assets: U256::ZERO,
            total_supply_shares: U256::ZERO,
            total_borrow_shares: U256::ZERO,
            last_update,
            fee: U256::ZERO,
            rate_at_target: None,
            price: None,
        }
    }

    pub fn with_supply(mut self, assets: U256, shares: U256) -> Self {
        self.total_supply_assets = assets;
        self.total_supply_shares = shares;
        self
    }

    pub fn with_borrow(mut self, assets: U256, shares: U256) -> Self {
        self.total_borrow_assets = assets;
        self.total_borrow_shares = shares;
        self
    }

    pub fn with_fee(mut self, fee: U256) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_rate_at_target(mut self, rate_at_target: U256) -> Self {
        self.rate_at_target = Some(rate_at_target);
        self
    }

    pub fn with_price(mut self, price: U256) -> Self {
        self.price = Some(price);
        self
    }

    pub fn lltv(&self) -> U256 {
        self.params.lltv
    }

    /// Returns the market's current liquidity (supply - borrow)
    pub fn liquidity(&self) -> U256 {
        zero_floor_sub(self.total_supply_assets, self.total_borrow_assets)
    }

    /// Returns the market's utilization rate (WAD-scaled)
    pub fn utilization(&self) -> U256 {
        get_utilization(self.total_supply_assets, self.total_borrow_assets)
    }

    fn accrual_rates(&self, timestamp: u64) -> Result<AccrualRates, SimError> {
        if timestamp < self.last_update {
            return Err(SimError::InvalidInterestAccrual {
                timestamp,
                last_update: self.last_update,
            });
        }

        let elapsed = timestamp - self.last_update;

        Ok(match self.rate_at_target {
            None => AccrualRates {
                elapsed,
                avg_borrow_rate: U256::ZERO,
                end_borrow_rate: U256::ZERO,
                end_rate_at_target: None,
            },
            Some(rate_at_target) => {
                let result = get_borrow_rate(self.utilization(), rate_at_target, elapsed);
                AccrualRates {
                    elapsed,
                    avg_borrow_rate: result.avg_borrow_rate,
                    end_borrow_rate: result.end_borrow_rate,
                    end_rate_at_target: Some(result.end_rate_at_target),
                }
            }
        })
    }

    /// Instantaneous borrow rate at `timestamp` (WAD per second)
    pub fn borrow_rate(&self, timestamp: u64) -> Result<U256, SimError> {
        Ok(self.accrual_rates(timestamp)?.end_borrow_rate)
    }

    /// Supply rate = borrow_rate * utilization * (1 - fee)
    pub fn supply_rate(&self, timestamp: u64) -> Result<U256, SimError> {
        let borrow_rate = self.borrow_rate(timestamp)?;
        Ok(w_mul_up(
            w_mul_down(borrow_rate, self.utilization()),
            zero_floor_sub(WAD, self.fee),
        ))
    }

    pub fn borrow_apy(&self, timestamp: u64) -> Result<f64, SimError> {
        Ok(rate_to_apy(self.borrow_rate(timestamp)?))
    }

    pub fn supply_apy(&self, timestamp: u64) -> Result<f64, SimError> {
        Ok(rate_to_apy(self.supply_rate(timestamp)?))
    }

    /// Accrues interest on the market up to the given timestamp.
    ///
    /// Interest is `total_borrow * (e^(avg_rate * elapsed) - 1)` (third order Taylor),
    /// added to both asset totals. The protocol fee share of it is minted as supply
    /// shares, priced on the supply net of the fee. Shares outstanding are never
    /// repriced. Accruing at `last_update` returns the market unchanged.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidInterestAccrual`] if `timestamp < last_update`
    pub fn accrue_interest(&self, timestamp: u64) -> Result<Market, SimError> {
        let rates = self.accrual_rates(timestamp)?;
        if rates.elapsed == 0 {
            return Ok(self.clone());
        }

        let AccruedInterest { interest, fee_shares } = get_accrued_interest(
            rates.avg_borrow_rate,
            self.total_supply_assets,
            self.total_borrow_assets,
            self.total_supply_shares,
            self.fee,
            rates.elapsed,
        );

        trace!(market = %self.id, elapsed = rates.elapsed, %interest, %fee_shares, "accrued market interest");

        Ok(Market {
            total_supply_assets: self.total_supply_assets + interest,
            total_borrow_assets: self.total_borrow_assets + interest,
            total_supply_shares: self.total_supply_shares + fee_shares,
            last_update: timestamp,
            rate_at_target: rates.end_rate_at_target.or(self.rate_at_target),
            ..self.clone()
        })
    }

    /// Supplies loan assets; assets round shares down, shares round assets up.
    ///
    /// Returns `(market, assets, shares)`.
    pub fn supply(&self, quantity: Quantity, timestamp: u64) -> Result<(Market, U256, U256), SimError> {
        let mut market = self.accrue_interest(timestamp)?;

        let (assets, shares) = match quantity {
            Quantity::Assets(assets) => {
                (assets, market.to_supply_shares(assets, RoundingDirection::Down))
            }
            Quantity::Shares(shares) => {
                (market.to_supply_assets(shares, RoundingDirection::Up), shares)
            }
        };

        market.total_supply_assets += assets;
        market.total_supply_shares += shares;

        Ok((market, assets, shares))
    }

    /// Withdraws loan assets; assets round shares up, shares round assets down.
    pub fn withdraw(&self, quantity: Quantity, timestamp: u64) -> Result<(Market, U256, U256), SimError> {
        let mut market = self.accrue_interest(timestamp)?;

        let (assets, shares) = match quantity {
            Quantity::Assets(assets) => {
                (assets, market.to_supply_shares(assets, RoundingDirection::Up))
            }
            Quantity::Shares(shares) => {
                (market.to_supply_assets(shares, RoundingDirection::Down), shares)
            }
        };

        market.ensure_liquidity(assets)?;
        market.total_supply_assets -= assets;
        market.total_supply_shares = zero_floor_sub(market.total_supply_shares, shares);

        Ok((market, assets, shares))
    }

    /// Borrows loan assets; assets round shares up, shares round assets down.
    ///
    /// This only updates market totals. Health checks live in
    /// [`crate::position::Position::borrow`].
    pub fn borrow(&self, quantity: Quantity, timestamp: u64) -> Result<(Market, U256, U256), SimError> {
        let mut market = self.accrue_interest(timestamp)?;

        let (assets, shares) = match quantity {
            Quantity::Assets(assets) => {
                (assets, market.to_borrow_shares(assets, RoundingDirection::Up))
            }
            Quantity::Shares(shares) => {
                (market.to_borrow_assets(shares, RoundingDirection::Down), shares)
            }
        };

        market.ensure_liquidity(assets)?;
        market.total_borrow_assets += assets;
        market.total_borrow_shares += shares;

        Ok((market, assets, shares))
    }

    /// Repays debt; assets round shares down, shares round assets up.
    pub fn repay(&self, quantity: Quantity, timestamp: u64) -> Result<(Market, U256, U256), SimError> {
        let mut market = self.accrue_interest(timestamp)?;

        let (assets, shares) = match quantity {
            Quantity::Assets(assets) => {
                (assets, market.to_borrow_shares(assets, RoundingDirection::Down))
            }
            Quantity::Shares(shares) => {
                (market.to_borrow_assets(shares, RoundingDirection::Up), shares)
            }
        };

        market.total_borrow_assets = zero_floor_sub(market.total_borrow_assets, assets);
        market.total_borrow_shares = zero_floor_sub(market.total_borrow_shares, shares);

        Ok((market, assets, shares))
    }

    fn ensure_liquidity(&self, required: U256) -> Result<(), SimError> {
        let liquidity = self.liquidity();
        if required > liquidity {
            return Err(SimError::InsufficientLiquidity {
                market_id: self.id,
                liquidity,
                required,
            });
        }
        Ok(())
    }

    /// Convert supply shares to assets
    pub fn to_supply_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        shares_to_assets(shares, self.total_supply_assets, self.total_supply_shares, rounding)
    }

    /// Convert assets to supply shares
    pub fn to_supply_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        assets_to_shares(assets, self.total_supply_assets, self.total_supply_shares, rounding)
    }

    /// Convert borrow shares to assets
    pub fn to_borrow_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        shares_to_assets(shares, self.total_borrow_assets, self.total_borrow_shares, rounding)
    }

    /// Convert assets to borrow shares
    pub fn to_borrow_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        assets_to_shares(assets, self.total_borrow_assets, self.total_borrow_shares, rounding)
    }

    // ==================== Utilization Targeting ====================

    /// Smallest supply bringing utilization down to `target_utilization`
    pub fn get_supply_to_utilization(&self, target_utilization: U256) -> U256 {
        get_supply_to_utilization(
            self.total_supply_assets,
            self.total_borrow_assets,
            target_utilization,
        )
    }

    /// Largest withdrawal keeping utilization at or below `target_utilization`
    pub fn get_withdraw_to_utilization(&self, target_utilization: U256) -> U256 {
        get_withdraw_to_utilization(
            self.total_supply_assets,
            self.total_borrow_assets,
            target_utilization,
        )
    }

    // ==================== Collateral ====================

    /// Returns the value of collateral in loan assets
    pub fn get_collateral_value(&self, collateral: U256) -> Option<U256> {
        self.price
            .map(|price| mul_div_down(collateral, price, ORACLE_PRICE_SCALE))
    }

    /// Returns the maximum debt allowed given a certain amount of collateral
    pub fn get_max_borrow_assets(&self, collateral: U256) -> Option<U256> {
        self.get_collateral_value(collateral)
            .map(|value| w_mul_down(value, self.params.lltv))
    }

    /// Returns the liquidation incentive factor for this market
    pub fn get_liquidation_incentive_factor(&self) -> U256 {
        get_liquidation_incentive_factor(self.params.lltv)
    }

    /// Check if a position is healthy
    pub fn is_healthy(&self, collateral: U256, borrow_shares: U256) -> Option<bool> {
        if borrow_shares.is_zero() {
            return Some(true);
        }
        let max_borrow = self.get_max_borrow_assets(collateral)?;
        let current_borrow = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        Some(max_borrow >= current_borrow)
    }

    /// Returns the health factor of a position (WAD-scaled)
    pub fn get_health_factor(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        if borrow_assets.is_zero() {
            return Some(U256::MAX);
        }

        let max_borrow = self.get_max_borrow_assets(collateral)?;
        Some(w_div_down(max_borrow, borrow_assets))
    }

    /// Returns the LTV of a position (WAD-scaled)
    pub fn get_ltv(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        if borrow_shares.is_zero() {
            return Some(U256::ZERO);
        }

        let collateral_value = self.get_collateral_value(collateral)?;
        if collateral_value.is_zero() {
            return Some(U256::MAX);
        }

        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        Some(w_div_up(borrow_assets, collateral_value))
    }

    /// Returns the amount of collateral that can be withdrawn while staying healthy
    pub fn get_withdrawable_collateral(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        let price = self.price?;
        if price.is_zero() {
            return Some(U256::ZERO);
        }

        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        let required_collateral = w_div_up(
            mul_div_up(borrow_assets, ORACLE_PRICE_SCALE, price),
            self.params.lltv,
        );

        Some(zero_floor_sub(collateral, required_collateral))
    }

    /// Debt still borrowable against `collateral` given the current debt
    pub fn get_borrowable_assets(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        let max_borrow = self.get_max_borrow_assets(collateral)?;
        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        Some(math::min(
            zero_floor_sub(max_borrow, borrow_assets),
            self.liquidity(),
        ))
    }
}

struct AccrualRates {
    elapsed: u64,
    avg_borrow_rate: U256,
    end_borrow_rate: U256,
    end_rate_at_target: Option<U256>,
}

struct AccruedInterest {
    interest: U256,
    fee_shares: U256,
}

// ==================== Utility Functions ====================

/// Calculate the utilization rate (WAD-scaled)
pub fn get_utilization(total_supply_assets: U256, total_borrow_assets: U256) -> U256 {
    if total_supply_assets.is_zero() {
        if total_borrow_assets > U256::ZERO {
            return U256::MAX;
        }
        return U256::ZERO;
    }
    w_div_down(total_borrow_assets, total_supply_assets)
}

fn get_accrued_interest(
    borrow_rate: U256,
    total_supply_assets: U256,
    total_borrow_assets: U256,
    total_supply_shares: U256,
    fee: U256,
    elapsed: u64,
) -> AccruedInterest {
    let interest = w_mul_down(
        total_borrow_assets,
        w_taylor_compounded(borrow_rate, U256::from(elapsed)),
    );

    let fee_amount = w_mul_down(interest, fee);

    let fee_shares = assets_to_shares(
        fee_amount,
        total_supply_assets + interest - fee_amount,
        total_supply_shares,
        RoundingDirection::Down,
    );

    AccruedInterest {
        interest,
        fee_shares,
    }
}

/// Calculate the liquidation incentive factor
pub fn get_liquidation_incentive_factor(lltv: U256) -> U256 {
    math::min(
        MAX_LIQUIDATION_INCENTIVE_FACTOR,
        w_div_down(
            WAD,
            WAD - w_mul_down(LIQUIDATION_CURSOR, zero_floor_sub(WAD, lltv)),
        ),
    )
}

/// Returns the smallest volume to supply until the market reaches the target utilization
pub fn get_supply_to_utilization(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    target_utilization: U256,
) -> U256 {
    if target_utilization.is_zero() {
        if get_utilization(total_supply_assets, total_borrow_assets).is_zero() {
            return U256::ZERO;
        }
        return U256::MAX;
    }

    zero_floor_sub(
        w_div_up(total_borrow_assets, target_utilization),
        total_supply_assets,
    )
}

/// Returns the amount to withdraw until the market reaches the target utilization
pub fn get_withdraw_to_utilization(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    target_utilization: U256,
) -> U256 {
    if target_utilization.is_zero() {
        if total_borrow_assets.is_zero() {
            return total_supply_assets;
        }
        return U256::ZERO;
    }

    zero_floor_sub(
        total_supply_assets,
        w_div_up(total_borrow_assets, target_utilization),
    )
}
