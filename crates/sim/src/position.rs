//! Position tracking for Morpho Blue markets.
//!
//! A [`Position`] only stores shares and collateral. [`AccrualPosition`] binds it to
//! a market accrued to a timestamp to expose asset amounts, health factor, LTV and
//! capacity limits.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{MarketId, ShareSource, SimError};
use crate::market::{Market, Quantity};
use crate::math::{self, w_div_up, zero_floor_sub, RoundingDirection};

/// Represents a user's position in a Morpho Blue market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub user: Address,
    pub market_id: MarketId,
    #[serde(default)]
    pub supply_shares: U256,
    #[serde(default)]
    pub borrow_shares: U256,
    /// Collateral in collateral token units
    #[serde(default)]
    pub collateral: U256,
}

impl Position {
    pub fn new(
        user: Address,
        market_id: MarketId,
        supply_shares: U256,
        borrow_shares: U256,
        collateral: U256,
    ) -> Self {
        Self {
            user,
            market_id,
            supply_shares,
            borrow_shares,
            collateral,
        }
    }

    pub fn empty(user: Address, market_id: MarketId) -> Self {
        Self::new(user, market_id, U256::ZERO, U256::ZERO, U256::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.supply_shares.is_zero() && self.borrow_shares.is_zero() && self.collateral.is_zero()
    }

    /// Binds the position to `market` accrued to `timestamp`.
    pub fn accrue(&self, market: &Market, timestamp: u64) -> Result<AccrualPosition, SimError> {
        Ok(AccrualPosition {
            position: self.clone(),
            market: market.accrue_interest(timestamp)?,
        })
    }

    // ==================== Position Mutations ====================

    /// Supply loan assets to the position
    ///
    /// Returns `(position, market, assets, shares)`.
    pub fn supply(
        &self,
        market: &Market,
        quantity: Quantity,
        timestamp: u64,
    ) -> Result<(Position, Market, U256, U256), SimError> {
        let (new_market, assets, shares) = market.supply(quantity, timestamp)?;

        let mut new_position = self.clone();
        new_position.supply_shares += shares;

        Ok((new_position, new_market, assets, shares))
    }

    /// Withdraw loan assets from the position
    pub fn withdraw(
        &self,
        market: &Market,
        quantity: Quantity,
        timestamp: u64,
    ) -> Result<(Position, Market, U256, U256), SimError> {
        let (new_market, assets, shares) = market.withdraw(quantity, timestamp)?;

        let mut new_position = self.clone();
        new_position.supply_shares = self.burn(
            self.supply_shares,
            shares,
            ShareSource::MarketSupply(self.market_id),
        )?;

        Ok((new_position, new_market, assets, shares))
    }

    /// Supply collateral to the position
    pub fn supply_collateral(&self, assets: U256) -> Position {
        let mut new_position = self.clone();
        new_position.collateral += assets;
        new_position
    }

    /// Withdraw collateral, keeping the position healthy
    pub fn withdraw_collateral(
        &self,
        market: &Market,
        assets: U256,
        timestamp: u64,
    ) -> Result<(Position, Market), SimError> {
        let accrued_market = market.accrue_interest(timestamp)?;

        if assets > self.collateral {
            return Err(SimError::InsufficientCollateral {
                user: self.user,
                market_id: self.market_id,
            });
        }

        let mut new_position = self.clone();
        new_position.collateral -= assets;
        new_position.ensure_healthy(&accrued_market)?;

        Ok((new_position, accrued_market))
    }

    /// Borrow loan assets against the position's collateral
    pub fn borrow(
        &self,
        market: &Market,
        quantity: Quantity,
        timestamp: u64,
    ) -> Result<(Position, Market, U256, U256), SimError> {
        let (new_market, assets, shares) = market.borrow(quantity, timestamp)?;

        let mut new_position = self.clone();
        new_position.borrow_shares += shares;
        new_position.ensure_healthy(&new_market)?;

        Ok((new_position, new_market, assets, shares))
    }

    /// Repay borrowed assets
    pub fn repay(
        &self,
        market: &Market,
        quantity: Quantity,
        timestamp: u64,
    ) -> Result<(Position, Market, U256, U256), SimError> {
        let (new_market, assets, shares) = market.repay(quantity, timestamp)?;

        let mut new_position = self.clone();
        new_position.borrow_shares = self.burn(
            self.borrow_shares,
            shares,
            ShareSource::MarketBorrow(self.market_id),
        )?;

        Ok((new_position, new_market, assets, shares))
    }

    fn burn(&self, balance: U256, shares: U256, location: ShareSource) -> Result<U256, SimError> {
        balance
            .checked_sub(shares)
            .ok_or(SimError::InsufficientShares {
                owner: self.user,
                location,
            })
    }

    fn ensure_healthy(&self, market: &Market) -> Result<(), SimError> {
        if self.borrow_shares.is_zero() {
            return Ok(());
        }
        match market.is_healthy(self.collateral, self.borrow_shares) {
            None => Err(SimError::UnknownOraclePrice {
                market_id: self.market_id,
            }),
            Some(false) => Err(SimError::InsufficientCollateral {
                user: self.user,
                market_id: self.market_id,
            }),
            Some(true) => Ok(()),
        }
    }
}

/// A position bound to its market accrued to a given timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualPosition {
    pub position: Position,
    pub market: Market,
}

impl AccrualPosition {
    pub fn supply_assets(&self) -> U256 {
        self.market
            .to_supply_assets(self.position.supply_shares, RoundingDirection::Down)
    }

    pub fn borrow_assets(&self) -> U256 {
        self.market
            .to_borrow_assets(self.position.borrow_shares, RoundingDirection::Up)
    }

    pub fn collateral(&self) -> U256 {
        self.position.collateral
    }

    pub fn collateral_value(&self) -> Option<U256> {
        self.market.get_collateral_value(self.position.collateral)
    }

    pub fn max_borrow_assets(&self) -> Option<U256> {
        self.market.get_max_borrow_assets(self.position.collateral)
    }

    /// Additional borrowable amount, capped by market liquidity
    pub fn max_borrowable_assets(&self) -> Option<U256> {
        self.market
            .get_borrowable_assets(self.position.collateral, self.position.borrow_shares)
    }

    pub fn is_healthy(&self) -> Option<bool> {
        self.market
            .is_healthy(self.position.collateral, self.position.borrow_shares)
    }

    pub fn is_liquidatable(&self) -> Option<bool> {
        self.is_healthy().map(|healthy| !healthy)
    }

    pub fn health_factor(&self) -> Option<U256> {
        self.market
            .get_health_factor(self.position.collateral, self.position.borrow_shares)
    }

    pub fn ltv(&self) -> Option<U256> {
        self.market
            .get_ltv(self.position.collateral, self.position.borrow_shares)
    }

    pub fn withdrawable_collateral(&self) -> Option<U256> {
        self.market
            .get_withdrawable_collateral(self.position.collateral, self.position.borrow_shares)
            .map(|withdrawable| math::min(withdrawable, self.position.collateral))
    }

    /// Maximum withdrawable supply assets, capped by market liquidity
    pub fn withdrawable_supply(&self) -> U256 {
        math::min(self.supply_assets(), self.market.liquidity())
    }

    /// Borrow capacity usage (WAD-scaled)
    pub fn borrow_capacity_usage(&self) -> Option<U256> {
        let max_borrow = self.max_borrow_assets()?;
        if max_borrow.is_zero() {
            if self.position.borrow_shares.is_zero() {
                return Some(U256::ZERO);
            }
            return Some(U256::MAX);
        }
        Some(w_div_up(self.borrow_assets(), max_borrow))
    }

    /// Get all capacity limits for this position
    pub fn capacities(&self, loan_balance: U256, collateral_balance: U256) -> PositionCapacities {
        let supply_assets = self.supply_assets();
        let borrow_assets = self.borrow_assets();
        let liquidity = self.market.liquidity();

        let withdraw = if supply_assets <= liquidity {
            CapacityLimit::new(supply_assets, CapacityLimitReason::Position)
        } else {
            CapacityLimit::new(liquidity, CapacityLimitReason::Liquidity)
        };

        let borrow = match self.max_borrow_assets() {
            Some(max_borrow) => {
                let collateral_room = zero_floor_sub(max_borrow, borrow_assets);
                if collateral_room <= liquidity {
                    CapacityLimit::new(collateral_room, CapacityLimitReason::Collateral)
                } else {
                    CapacityLimit::new(liquidity, CapacityLimitReason::Liquidity)
                }
            }
            None => CapacityLimit::new(U256::ZERO, CapacityLimitReason::Collateral),
        };

        let repay = if loan_balance <= borrow_assets {
            CapacityLimit::new(loan_balance, CapacityLimitReason::Balance)
        } else {
            CapacityLimit::new(borrow_assets, CapacityLimitReason::Position)
        };

        let withdraw_collateral = match self.withdrawable_collateral() {
            Some(withdrawable) => {
                CapacityLimit::new(withdrawable, CapacityLimitReason::Collateral)
            }
            None => CapacityLimit::new(U256::ZERO, CapacityLimitReason::Collateral),
        };

        PositionCapacities {
            supply: CapacityLimit::new(loan_balance, CapacityLimitReason::Balance),
            withdraw,
            borrow,
            repay,
            supply_collateral: CapacityLimit::new(collateral_balance, CapacityLimitReason::Balance),
            withdraw_collateral,
        }
    }
}

/// Capacity limit information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityLimit {
    pub value: U256,
    pub reason: CapacityLimitReason,
}

impl CapacityLimit {
    fn new(value: U256, reason: CapacityLimitReason) -> Self {
        Self { value, reason }
    }
}

/// Reasons for capacity limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityLimitReason {
    Balance,
    Liquidity,
    Position,
    Collateral,
}

/// All capacity limits for a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionCapacities {
    pub supply: CapacityLimit,
    pub withdraw: CapacityLimit,
    pub borrow: CapacityLimit,
    pub repay: CapacityLimit,
    pub supply_collateral: CapacityLimit,
    pub withdraw_collateral: CapacityLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketParams, ORACLE_PRICE_SCALE};
    use crate::math::WAD;

    fn create_test_market() -> Market {
        let params = MarketParams::new(
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
            Address::repeat_byte(0x04),
            U256::from(800_000_000_000_000_000u64),
        );
        Market::new(params, 1000)
            .with_supply(U256::from(1_000_000) * WAD, U256::from(1_000_000) * WAD)
            .with_borrow(U256::from(800_000) * WAD, U256::from(800_000) * WAD)
            .with_fee(U256::from(100_000_000_000_000_000u64))
            .with_rate_at_target(U256::from(1_268_391_679u64))
            .with_price(ORACLE_PRICE_SCALE)
    }

    fn create_test_position(market: &Market) -> Position {
        Position::new(
            Address::ZERO,
            market.id,
            U256::from(1000) * WAD,
            U256::from(500) * WAD,
            U256::from(1000) * WAD,
        )
    }

    fn bound(position: &Position, market: &Market) -> AccrualPosition {
        position.accrue(market, market.last_update).unwrap()
    }

    #[test]
    fn test_position_assets() {
        let market = create_test_market();
        let position = bound(&create_test_position(&market), &market);

        assert!(position.supply_assets() > U256::from(990) * WAD);
        assert!(position.borrow_assets() > U256::from(490) * WAD);
    }

    #[test]
    fn test_accrual_position_grows_debt() {
        let market = create_test_market();
        let position = create_test_position(&market);
        let now = position.accrue(&market, 1000).unwrap();
        let later = position.accrue(&market, 1000 + 365 * 86_400).unwrap();

        assert!(later.borrow_assets() > now.borrow_assets());
        assert!(later.supply_assets() > now.supply_assets());
        // stored shares are untouched
        assert_eq!(later.position, position);
    }

    #[test]
    fn test_position_health() {
        let market = create_test_market();
        let position = bound(&create_test_position(&market), &market);

        assert_eq!(position.is_healthy(), Some(true));
        // 800 max borrow / 500 debt
        let hf = math::rate_to_f64(position.health_factor().unwrap());
        assert!(hf > 1.5);
    }

    #[test]
    fn test_position_ltv() {
        let market = create_test_market();
        let position = bound(&create_test_position(&market), &market);

        let ltv = math::rate_to_f64(position.ltv().unwrap());
        assert!((ltv - 0.5).abs() < 0.1);
    }

    #[test]
    fn test_position_no_borrow() {
        let market = create_test_market();
        let position = Position::new(
            Address::ZERO,
            market.id,
            U256::from(1000) * WAD,
            U256::ZERO,
            U256::from(1000) * WAD,
        );
        let position = bound(&position, &market);

        assert_eq!(position.health_factor(), Some(U256::MAX));
        assert_eq!(position.is_liquidatable(), Some(false));
        assert_eq!(position.withdrawable_collateral(), Some(U256::from(1000) * WAD));
    }

    #[test]
    fn test_position_no_collateral() {
        let market = create_test_market();
        let position = Position::new(
            Address::ZERO,
            market.id,
            U256::ZERO,
            U256::from(500) * WAD,
            U256::ZERO,
        );
        let position = bound(&position, &market);

        assert_eq!(position.health_factor(), Some(U256::ZERO));
        assert_eq!(position.is_liquidatable(), Some(true));
    }

    #[test]
    fn test_position_supply_and_withdraw() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let (new_pos, new_market, assets, shares) = position
            .supply(&market, Quantity::Assets(U256::from(100) * WAD), 1000)
            .unwrap();
        assert_eq!(assets, U256::from(100) * WAD);
        assert_eq!(new_pos.supply_shares, position.supply_shares + shares);

        let (final_pos, _, _, burned) = new_pos
            .withdraw(&new_market, Quantity::Assets(U256::from(50) * WAD), 1000)
            .unwrap();
        assert_eq!(final_pos.supply_shares, new_pos.supply_shares - burned);
    }

    #[test]
    fn test_withdraw_more_than_position() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let result = position.withdraw(&market, Quantity::Shares(U256::from(1001) * WAD), 1000);
        assert!(matches!(result, Err(SimError::InsufficientShares { .. })));
    }

    #[test]
    fn test_position_borrow() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let (new_position, _, _, shares) = position
            .borrow(&market, Quantity::Assets(U256::from(100) * WAD), 1000)
            .unwrap();
        assert_eq!(new_position.borrow_shares, position.borrow_shares + shares);
    }

    #[test]
    fn test_position_borrow_insufficient_collateral() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let result = position.borrow(&market, Quantity::Assets(U256::from(500) * WAD), 1000);
        assert!(matches!(result, Err(SimError::InsufficientCollateral { .. })));
    }

    #[test]
    fn test_borrow_without_price() {
        let mut market = create_test_market();
        market.price = None;
        let position = create_test_position(&market);

        let result = position.borrow(&market, Quantity::Assets(WAD), 1000);
        assert!(matches!(result, Err(SimError::UnknownOraclePrice { .. })));
    }

    #[test]
    fn test_position_withdraw_collateral() {
        let market = create_test_market();
        let position = Position::empty(Address::ZERO, market.id).supply_collateral(U256::from(100) * WAD);

        let (final_pos, _) = position
            .withdraw_collateral(&market, U256::from(50) * WAD, 1000)
            .unwrap();
        assert_eq!(final_pos.collateral, U256::from(50) * WAD);
    }

    #[test]
    fn test_withdraw_collateral_breaks_health() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let result = position.withdraw_collateral(&market, U256::from(500) * WAD, 1000);
        assert!(matches!(result, Err(SimError::InsufficientCollateral { .. })));
    }

    #[test]
    fn test_position_repay() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let (new_pos, new_market, _, shares_repaid) = position
            .repay(&market, Quantity::Assets(U256::from(100) * WAD), 1000)
            .unwrap();
        assert!(shares_repaid > U256::ZERO);
        assert!(new_pos.borrow_shares < position.borrow_shares);
        assert!(new_market.total_borrow_assets < market.total_borrow_assets);
    }

    #[test]
    fn test_repay_all_shares_clears_debt() {
        let market = create_test_market();
        let position = create_test_position(&market);

        let (new_pos, _, _, _) = position
            .repay(&market, Quantity::Shares(position.borrow_shares), 1000)
            .unwrap();
        assert_eq!(new_pos.borrow_shares, U256::ZERO);
    }

    #[test]
    fn test_capacities() {
        let market = create_test_market();
        let position = bound(&create_test_position(&market), &market);

        let capacities = position.capacities(U256::from(100) * WAD, U256::from(5000) * WAD);
        assert_eq!(capacities.supply.value, U256::from(100) * WAD);
        assert_eq!(capacities.supply.reason, CapacityLimitReason::Balance);
        assert_eq!(capacities.repay.reason, CapacityLimitReason::Balance);
        assert_eq!(capacities.borrow.reason, CapacityLimitReason::Collateral);
    }

    #[test]
    fn test_capacities_limited_by_liquidity() {
        let market = create_test_market()
            .with_borrow(U256::from(999_500) * WAD, U256::from(999_500) * WAD);
        let position = Position::new(
            Address::ZERO,
            market.id,
            U256::from(1000) * WAD,
            U256::ZERO,
            U256::from(5000) * WAD,
        );
        let capacities = bound(&position, &market).capacities(U256::ZERO, U256::ZERO);

        assert_eq!(capacities.withdraw.reason, CapacityLimitReason::Liquidity);
        assert_eq!(capacities.borrow.reason, CapacityLimitReason::Liquidity);
    }
}
