//! MetaMorpho vault entities.
//!
//! MetaMorpho vaults are ERC-4626 aggregators supplying one loan asset to several
//! Morpho Blue markets:
//! - **Supply queue**: deposits fill markets in order, each up to its cap
//! - **Withdraw queue**: withdrawals drain markets in order, bounded by liquidity
//! - **Public allocator**: anyone can move liquidity between markets within the
//!   `max_in` / `max_out` flow caps set by the allocator admin, against a native fee
//!
//! The vault's market positions live in the simulation state like any other
//! position (the vault address is the position user). This module holds the share
//! accounting and the per-market config; queue walks are done by the interpreter.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{MarketId, SimError};
use crate::math::{mul_div, mul_div_down, w_mul_down, zero_floor_sub, RoundingDirection};

/// Virtual assets constant for vault share calculations (1)
pub const VAULT_VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// A timelocked value awaiting acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingValue {
    pub value: U256,
    pub valid_at: u64,
}

/// Public allocator flow caps of one market in a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCaps {
    /// Maximum assets that can flow into this market
    pub max_in: U256,
    /// Maximum assets that can flow out of this market
    pub max_out: U256,
}

/// Configuration for a market within a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMarketConfig {
    pub vault: Address,
    pub market_id: MarketId,
    /// Maximum supply cap for this market
    pub cap: U256,
    #[serde(default)]
    pub pending_cap: Option<PendingValue>,
    pub enabled: bool,
    #[serde(default)]
    pub removable_at: u64,
    /// Present when the public allocator may move liquidity in or out of this market
    #[serde(default)]
    pub flow_caps: Option<FlowCaps>,
}

impl VaultMarketConfig {
    pub fn new(vault: Address, market_id: MarketId, cap: U256) -> Self {
        Self {
            vault,
            market_id,
            cap,
            pending_cap: None,
            enabled: true,
            removable_at: 0,
            flow_caps: None,
        }
    }

    pub fn with_flow_caps(mut self, max_in: U256, max_out: U256) -> Self {
        self.flow_caps = Some(FlowCaps { max_in, max_out });
        self
    }

    /// Assets the vault can still supply given its current supply
    pub fn cap_room(&self, supply_assets: U256) -> U256 {
        zero_floor_sub(self.cap, supply_assets)
    }

    /// Public allocator outflow: `max_out -= amount`, `max_in += amount`.
    pub fn record_outflow(&mut self, amount: U256) -> Result<(), SimError> {
        let caps = self.flow_caps.as_mut().ok_or(SimError::MaxOutflowExceeded {
            vault: self.vault,
            market_id: self.market_id,
        })?;
        caps.max_out = caps
            .max_out
            .checked_sub(amount)
            .ok_or(SimError::MaxOutflowExceeded {
                vault: self.vault,
                market_id: self.market_id,
            })?;
        caps.max_in = caps.max_in.saturating_add(amount);
        Ok(())
    }

    /// Public allocator inflow: `max_in -= amount`, `max_out += amount`.
    pub fn record_inflow(&mut self, amount: U256) -> Result<(), SimError> {
        let caps = self.flow_caps.as_mut().ok_or(SimError::MaxInflowExceeded {
            vault: self.vault,
            market_id: self.market_id,
        })?;
        caps.max_in = caps
            .max_in
            .checked_sub(amount)
            .ok_or(SimError::MaxInflowExceeded {
                vault: self.vault,
                market_id: self.market_id,
            })?;
        caps.max_out = caps.max_out.saturating_add(amount);
        Ok(())
    }
}

/// Vault-level public allocator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAllocatorConfig {
    pub admin: Address,
    /// Fee to use public allocator (in native token)
    pub fee: U256,
    #[serde(default)]
    pub accrued_fee: U256,
}

/// Represents a MetaMorpho vault state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub address: Address,
    /// Underlying loan asset
    pub asset: Address,
    pub asset_decimals: u8,
    pub total_assets: U256,
    pub total_supply: U256,
    /// Total assets at the last fee accrual
    pub last_total_assets: U256,
    /// Performance fee (WAD-scaled)
    #[serde(default)]
    pub fee: U256,
    #[serde(default)]
    pub fee_recipient: Address,
    #[serde(default)]
    pub owner: Address,
    #[serde(default)]
    pub curator: Address,
    #[serde(default)]
    pub guardian: Address,
    #[serde(default)]
    pub timelock: u64,
    pub supply_queue: Vec<MarketId>,
    pub withdraw_queue: Vec<MarketId>,
    #[serde(default)]
    pub public_allocator_config: Option<PublicAllocatorConfig>,
}

impl Vault {
    /// Empty vault over `asset`.
    pub fn new(address: Address, asset: Address, asset_decimals: u8) -> Self {
        Self {
            address,
            asset,
            asset_decimals,
            total_assets: U256::ZERO,
            total_supply: U256::ZERO,
            last_total_assets: U256::ZERO,
            fee: U256::ZERO,
            fee_recipient: Address::ZERO,
            owner: Address::ZERO,
            curator: Address::ZERO,
            guardian: Address::ZERO,
            timelock: 0,
            supply_queue: Vec::new(),
            withdraw_queue: Vec::new(),
            public_allocator_config: None,
        }
    }

    /// Calculate the decimals offset for share conversion
    pub fn decimals_offset(&self) -> u8 {
        18u8.saturating_sub(self.asset_decimals)
    }

    /// Virtual shares for this vault (10^decimals_offset)
    pub fn virtual_shares(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals_offset()))
    }

    /// Convert vault shares to assets
    pub fn to_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            shares,
            self.total_assets + VAULT_VIRTUAL_ASSETS,
            self.total_supply + self.virtual_shares(),
            rounding,
        )
    }

    /// Convert assets to vault shares
    pub fn to_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            assets,
            self.total_supply + self.virtual_shares(),
            self.total_assets + VAULT_VIRTUAL_ASSETS,
            rounding,
        )
    }

    /// Interest accrued since the last fee accrual
    pub fn total_interest(&self) -> U256 {
        zero_floor_sub(self.total_assets, self.last_total_assets)
    }

    /// Fee shares owed when total assets reach `new_total_assets`.
    pub fn fee_shares(&self, new_total_assets: U256) -> U256 {
        let interest = zero_floor_sub(new_total_assets, self.last_total_assets);
        if interest.is_zero() || self.fee.is_zero() {
            return U256::ZERO;
        }

        let fee_assets = w_mul_down(interest, self.fee);
        mul_div_down(
            fee_assets,
            self.total_supply + self.virtual_shares(),
            new_total_assets - fee_assets + VAULT_VIRTUAL_ASSETS,
        )
    }

    /// Moves the vault to `new_total_assets`, minting the performance fee.
    ///
    /// Returns the accrued vault and the fee shares to credit to `fee_recipient`.
    pub fn accrue_fee(&self, new_total_assets: U256) -> (Vault, U256) {
        let fee_shares = self.fee_shares(new_total_assets);

        let mut vault = self.clone();
        vault.total_assets = new_total_assets;
        vault.total_supply += fee_shares;
        vault.last_total_assets = new_total_assets;

        (vault, fee_shares)
    }

    pub fn public_allocator_fee(&self) -> Result<U256, SimError> {
        self.public_allocator_config
            .as_ref()
            .map(|config| config.fee)
            .ok_or(SimError::PublicAllocatorNotConfigured {
                vault: self.address,
            })
    }
}
