//! Vault V2: an ERC-4626 vault whose assets are spread over pluggable adapters.
//!
//! Total assets only grow through [`VaultV2::accrue`], which reads the real assets
//! of the idle balance plus every adapter and caps the growth at `max_rate`.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Entity, MarketId, SimError};
use crate::handlers::{blue, erc20, metamorpho};
use crate::market::Quantity;
use crate::math::{self, mul_div, mul_div_down, zero_floor_sub, RoundingDirection, WAD};
use crate::state::SimulationState;
use crate::vault::VAULT_VIRTUAL_ASSETS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultV2 {
    pub address: Address,
    pub asset: Address,
    pub asset_decimals: u8,
    pub total_assets: U256,
    pub total_supply: U256,
    pub last_update: u64,
    /// Maximum growth of total assets per second (WAD-scaled)
    pub max_rate: U256,
    #[serde(default)]
    pub performance_fee: U256,
    #[serde(default)]
    pub performance_fee_recipient: Address,
    /// Per second fee on total assets (WAD-scaled)
    #[serde(default)]
    pub management_fee: U256,
    #[serde(default)]
    pub management_fee_recipient: Address,
    #[serde(default)]
    pub adapters: Vec<Address>,
    /// Adapter receiving deposits and serving withdrawals
    #[serde(default)]
    pub liquidity_adapter: Option<Address>,
    /// Market of a `MorphoMarketV1` liquidity adapter
    #[serde(default)]
    pub liquidity_market: Option<MarketId>,
}

/// Result of a Vault V2 accrual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultV2Accrual {
    pub vault: VaultV2,
    pub performance_fee_shares: U256,
    pub management_fee_shares: U256,
}

impl VaultV2 {
    pub fn new(address: Address, asset: Address, asset_decimals: u8, last_update: u64) -> Self {
        Self {
            address,
            asset,
            asset_decimals,
            total_assets: U256::ZERO,
            total_supply: U256::ZERO,
            last_update,
            max_rate: U256::ZERO,
            performance_fee: U256::ZERO,
            performance_fee_recipient: Address::ZERO,
            management_fee: U256::ZERO,
            management_fee_recipient: Address::ZERO,
            adapters: Vec::new(),
            liquidity_adapter: None,
            liquidity_market: None,
        }
    }

    pub fn virtual_shares(&self) -> U256 {
        U256::from(10u64).pow(U256::from(18u8.saturating_sub(self.asset_decimals)))
    }

    pub fn to_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            shares,
            self.total_assets + VAULT_VIRTUAL_ASSETS,
            self.total_supply + self.virtual_shares(),
            rounding,
        )
    }

    pub fn to_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            assets,
            self.total_supply + self.virtual_shares(),
            self.total_assets + VAULT_VIRTUAL_ASSETS,
            rounding,
        )
    }

    /// Accrues interest given the vault's `real_assets` at `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidInterestAccrual`] if `timestamp < last_update`
    pub fn accrue(&self, real_assets: U256, timestamp: u64) -> Result<VaultV2Accrual, SimError> {
        if timestamp < self.last_update {
            return Err(SimError::InvalidInterestAccrual {
                timestamp,
                last_update: self.last_update,
            });
        }

        let elapsed = U256::from(timestamp - self.last_update);
        if elapsed.is_zero() {
            return Ok(VaultV2Accrual {
                vault: self.clone(),
                performance_fee_shares: U256::ZERO,
                management_fee_shares: U256::ZERO,
            });
        }

        let max_total_assets = self.total_assets.saturating_add(mul_div_down(
            self.total_assets,
            elapsed.saturating_mul(self.max_rate),
            WAD,
        ));
        let new_total_assets = math::min(real_assets, max_total_assets);
        let interest = zero_floor_sub(new_total_assets, self.total_assets);

        let performance_fee_assets = if interest.is_zero() || self.performance_fee.is_zero() {
            U256::ZERO
        } else {
            mul_div_down(interest, self.performance_fee, WAD)
        };
        let management_fee_assets = mul_div_down(
            new_total_assets,
            elapsed.saturating_mul(self.management_fee),
            WAD,
        );

        let without_fees = zero_floor_sub(
            new_total_assets,
            performance_fee_assets.saturating_add(management_fee_assets),
        );
        let share_base = self.total_supply + self.virtual_shares();
        let performance_fee_shares =
            mul_div_down(performance_fee_assets, share_base, without_fees + VAULT_VIRTUAL_ASSETS);
        let management_fee_shares =
            mul_div_down(management_fee_assets, share_base, without_fees + VAULT_VIRTUAL_ASSETS);

        let mut vault = self.clone();
        vault.total_assets = new_total_assets;
        vault.total_supply += performance_fee_shares + management_fee_shares;
        vault.last_update = timestamp;

        Ok(VaultV2Accrual {
            vault,
            performance_fee_shares,
            management_fee_shares,
        })
    }
}

/// Behaviour shared by all Vault V2 adapters.
///
/// Adapters read and write the simulation state directly: allocating moves assets
/// from the parent vault's idle balance into the underlying protocol, deallocating
/// brings them back.
pub trait Adapter {
    fn address(&self) -> Address;

    fn parent_vault(&self) -> Address;

    /// Assets held through the adapter, valued at the state's timestamp.
    fn real_assets(&self, state: &SimulationState) -> Result<U256, SimError>;

    fn allocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        market: Option<MarketId>,
    ) -> Result<(), SimError>;

    fn deallocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        market: Option<MarketId>,
    ) -> Result<(), SimError>;
}

/// Supplies the parent vault's assets to Morpho Blue markets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphoMarketV1Adapter {
    pub address: Address,
    pub parent_vault: Address,
    pub market_ids: Vec<MarketId>,
}

impl MorphoMarketV1Adapter {
    fn target_market(&self, market: Option<MarketId>) -> Result<MarketId, SimError> {
        market
            .or_else(|| self.market_ids.first().copied())
            .ok_or(SimError::UnknownEntity(Entity::VaultV2Adapter {
                address: self.address,
            }))
    }
}

impl Adapter for MorphoMarketV1Adapter {
    fn address(&self) -> Address {
        self.address
    }

    fn parent_vault(&self) -> Address {
        self.parent_vault
    }

    fn real_assets(&self, state: &SimulationState) -> Result<U256, SimError> {
        let mut total = U256::ZERO;
        for id in &self.market_ids {
            total = total.saturating_add(blue::expected_supply_assets(state, *id, self.address)?);
        }
        Ok(total)
    }

    fn allocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        market: Option<MarketId>,
    ) -> Result<(), SimError> {
        let id = self.target_market(market)?;
        let asset = state.vault_v2(self.parent_vault)?.asset;
        erc20::move_tokens(state, asset, self.parent_vault, self.address, assets)?;
        blue::supply(state, id, Quantity::Assets(assets), self.address, self.address)?;
        Ok(())
    }

    fn deallocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        market: Option<MarketId>,
    ) -> Result<(), SimError> {
        let id = self.target_market(market)?;
        let asset = state.vault_v2(self.parent_vault)?.asset;
        blue::withdraw(state, id, Quantity::Assets(assets), self.address, self.address, self.address)?;
        erc20::move_tokens(state, asset, self.address, self.parent_vault, assets)
    }
}

/// Deposits the parent vault's assets into a MetaMorpho vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaMorphoV1Adapter {
    pub address: Address,
    pub parent_vault: Address,
    pub vault: Address,
}

impl Adapter for MetaMorphoV1Adapter {
    fn address(&self) -> Address {
        self.address
    }

    fn parent_vault(&self) -> Address {
        self.parent_vault
    }

    fn real_assets(&self, state: &SimulationState) -> Result<U256, SimError> {
        let shares = state.balance_of(self.address, self.vault);
        let vault = metamorpho::accrued_view(state, self.vault)?;
        Ok(vault.to_assets(shares, RoundingDirection::Down))
    }

    fn allocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        _market: Option<MarketId>,
    ) -> Result<(), SimError> {
        let asset = state.vault_v2(self.parent_vault)?.asset;
        erc20::move_tokens(state, asset, self.parent_vault, self.address, assets)?;
        metamorpho::deposit(state, self.vault, Quantity::Assets(assets), self.address, self.address)?;
        Ok(())
    }

    fn deallocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        _market: Option<MarketId>,
    ) -> Result<(), SimError> {
        let asset = state.vault_v2(self.parent_vault)?.asset;
        metamorpho::withdraw(
            state,
            self.vault,
            Quantity::Assets(assets),
            metamorpho::WithdrawParties::own(self.address),
        )?;
        erc20::move_tokens(state, asset, self.address, self.parent_vault, assets)
    }
}

/// The closed set of supported Vault V2 adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultV2Adapter {
    MorphoMarketV1(MorphoMarketV1Adapter),
    MetaMorphoV1(MetaMorphoV1Adapter),
}

impl VaultV2Adapter {
    fn inner(&self) -> &dyn Adapter {
        match self {
            Self::MorphoMarketV1(adapter) => adapter,
            Self::MetaMorphoV1(adapter) => adapter,
        }
    }
}

impl Adapter for VaultV2Adapter {
    fn address(&self) -> Address {
        self.inner().address()
    }

    fn parent_vault(&self) -> Address {
        self.inner().parent_vault()
    }

    fn real_assets(&self, state: &SimulationState) -> Result<U256, SimError> {
        self.inner().real_assets(state)
    }

    fn allocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        market: Option<MarketId>,
    ) -> Result<(), SimError> {
        self.inner().allocate(state, assets, market)
    }

    fn deallocate(
        &self,
        state: &mut SimulationState,
        assets: U256,
        market: Option<MarketId>,
    ) -> Result<(), SimError> {
        self.inner().deallocate(state, assets, market)
    }
}
