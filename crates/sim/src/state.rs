//! The aggregate simulation state.
//!
//! Every collection sits behind an `Arc` and is copied on first write, so cloning a
//! state is cheap and the planner can branch on it freely.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::addresses::ChainAddresses;
use crate::error::{Entity, MarketId, SimError};
use crate::holding::Holding;
use crate::market::Market;
use crate::position::{AccrualPosition, Position};
use crate::token::{Token, NATIVE_ADDRESS};
use crate::user::User;
use crate::vault::{Vault, VaultMarketConfig};
use crate::vault_v2::{Adapter, VaultV2, VaultV2Adapter};

/// Reference block of a state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationState {
    pub chain_id: u64,
    pub block: BlockInfo,
    pub addresses: ChainAddresses,
    /// Receives the supply shares minted as Morpho protocol fee
    pub morpho_fee_recipient: Address,
    markets: Arc<BTreeMap<MarketId, Market>>,
    users: Arc<BTreeMap<Address, User>>,
    tokens: Arc<BTreeMap<Address, Token>>,
    vaults: Arc<BTreeMap<Address, Vault>>,
    positions: Arc<BTreeMap<MarketId, BTreeMap<Address, Position>>>,
    vault_market_configs: Arc<BTreeMap<Address, BTreeMap<MarketId, VaultMarketConfig>>>,
    holdings: Arc<BTreeMap<Address, BTreeMap<Address, Holding>>>,
    vaults_v2: Arc<BTreeMap<Address, VaultV2>>,
    vault_v2_adapters: Arc<BTreeMap<Address, VaultV2Adapter>>,
}

impl SimulationState {
    pub fn new(chain_id: u64, block: BlockInfo, addresses: ChainAddresses) -> Self {
        Self {
            chain_id,
            block,
            addresses,
            morpho_fee_recipient: Address::ZERO,
            markets: Arc::default(),
            users: Arc::default(),
            tokens: Arc::default(),
            vaults: Arc::default(),
            positions: Arc::default(),
            vault_market_configs: Arc::default(),
            holdings: Arc::default(),
            vaults_v2: Arc::default(),
            vault_v2_adapters: Arc::default(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.block.timestamp
    }

    /// Moves the reference block forward; entities accrue lazily on their next use.
    pub fn at_block(mut self, block: BlockInfo) -> Self {
        self.block = block;
        self
    }

    // ==================== Builders ====================

    pub fn with_market(mut self, market: Market) -> Self {
        self.set_market(market);
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.set_token(token);
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.set_user(user);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_holding(mut self, holding: Holding) -> Self {
        self.set_holding(holding);
        self
    }

    pub fn with_vault(mut self, vault: Vault) -> Self {
        self.set_vault(vault);
        self
    }

    pub fn with_vault_market_config(mut self, config: VaultMarketConfig) -> Self {
        self.set_vault_market_config(config);
        self
    }

    pub fn with_vault_v2(mut self, vault: VaultV2) -> Self {
        self.set_vault_v2(vault);
        self
    }

    pub fn with_vault_v2_adapter(mut self, adapter: VaultV2Adapter) -> Self {
        self.set_vault_v2_adapter(adapter);
        self
    }

    // ==================== Lookups ====================

    pub fn market(&self, id: MarketId) -> Result<&Market, SimError> {
        self.markets.get(&id).ok_or(SimError::unknown_market(id))
    }

    pub fn token(&self, address: Address) -> Result<&Token, SimError> {
        self.tokens
            .get(&address)
            .ok_or(SimError::unknown_token(address))
    }

    pub fn vault(&self, address: Address) -> Result<&Vault, SimError> {
        self.vaults
            .get(&address)
            .ok_or(SimError::unknown_vault(address))
    }

    pub fn vault_market_config(
        &self,
        vault: Address,
        market_id: MarketId,
    ) -> Result<&VaultMarketConfig, SimError> {
        self.vault_market_configs
            .get(&vault)
            .and_then(|configs| configs.get(&market_id))
            .ok_or(SimError::UnknownEntity(Entity::VaultMarketConfig { vault, market_id }))
    }

    pub fn vault_v2(&self, address: Address) -> Result<&VaultV2, SimError> {
        self.vaults_v2
            .get(&address)
            .ok_or(SimError::UnknownEntity(Entity::VaultV2 { address }))
    }

    pub fn vault_v2_adapter(&self, address: Address) -> Result<&VaultV2Adapter, SimError> {
        self.vault_v2_adapters
            .get(&address)
            .ok_or(SimError::UnknownEntity(Entity::VaultV2Adapter { address }))
    }

    pub fn user(&self, address: Address) -> Option<&User> {
        self.users.get(&address)
    }

    /// The stored user, or a fresh one with no authorization.
    pub fn user_or_new(&self, address: Address) -> User {
        self.user(address)
            .cloned()
            .unwrap_or_else(|| User::new(address))
    }

    pub fn position(&self, user: Address, market_id: MarketId) -> Option<&Position> {
        self.positions
            .get(&market_id)
            .and_then(|positions| positions.get(&user))
    }

    /// The stored position, or an empty one.
    pub fn position_or_empty(&self, user: Address, market_id: MarketId) -> Position {
        self.position(user, market_id)
            .cloned()
            .unwrap_or_else(|| Position::empty(user, market_id))
    }

    /// The position bound to its market accrued to the state's timestamp.
    pub fn accrual_position(
        &self,
        user: Address,
        market_id: MarketId,
    ) -> Result<AccrualPosition, SimError> {
        let market = self.market(market_id)?;
        self.position_or_empty(user, market_id)
            .accrue(market, self.timestamp())
    }

    pub fn holding(&self, user: Address, token: Address) -> Option<&Holding> {
        self.holdings
            .get(&user)
            .and_then(|holdings| holdings.get(&token))
    }

    /// The stored holding, or an empty one.
    pub fn holding_or_empty(&self, user: Address, token: Address) -> Holding {
        self.holding(user, token)
            .cloned()
            .unwrap_or_else(|| Holding::empty(user, token))
    }

    pub fn balance_of(&self, user: Address, token: Address) -> U256 {
        self.holding(user, token)
            .map_or(U256::ZERO, |holding| holding.balance)
    }

    pub fn is_vault(&self, address: Address) -> bool {
        self.vaults.contains_key(&address) || self.vaults_v2.contains_key(&address)
    }

    /// Token metadata is known, the address is a vault share token, or it is native.
    pub fn is_known_token(&self, address: Address) -> bool {
        address == NATIVE_ADDRESS || self.tokens.contains_key(&address) || self.is_vault(address)
    }

    pub fn ensure_token(&self, address: Address) -> Result<(), SimError> {
        if self.is_known_token(address) {
            Ok(())
        } else {
            Err(SimError::unknown_token(address))
        }
    }

    /// Contracts that approve Morpho and vaults for their own pulls.
    pub fn is_protocol_contract(&self, address: Address) -> bool {
        address == self.addresses.general_adapter1
            || self.is_vault(address)
            || self.vault_v2_adapters.contains_key(&address)
    }

    // ==================== Iteration ====================

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }

    pub fn vaults_v2(&self) -> impl Iterator<Item = &VaultV2> {
        self.vaults_v2.values()
    }

    pub fn vault_v2_adapters(&self) -> impl Iterator<Item = &VaultV2Adapter> {
        self.vault_v2_adapters.values()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().flat_map(BTreeMap::values)
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.values().flat_map(BTreeMap::values)
    }

    /// Holdings of `user`, by token.
    pub fn holdings_of(&self, user: Address) -> impl Iterator<Item = &Holding> {
        self.holdings.get(&user).into_iter().flat_map(BTreeMap::values)
    }

    pub fn vault_market_configs(&self) -> impl Iterator<Item = &VaultMarketConfig> {
        self.vault_market_configs
            .values()
            .flat_map(BTreeMap::values)
    }

    /// Configs of every vault listing `market_id`.
    pub fn vault_configs_for_market(
        &self,
        market_id: MarketId,
    ) -> impl Iterator<Item = &VaultMarketConfig> {
        self.vault_market_configs()
            .filter(move |config| config.market_id == market_id)
    }

    // ==================== Mutation ====================

    pub fn set_market(&mut self, market: Market) {
        Arc::make_mut(&mut self.markets).insert(market.id, market);
    }

    pub fn set_token(&mut self, token: Token) {
        Arc::make_mut(&mut self.tokens).insert(token.address, token);
    }

    pub fn set_user(&mut self, user: User) {
        Arc::make_mut(&mut self.users).insert(user.address, user);
    }

    pub fn set_position(&mut self, position: Position) {
        Arc::make_mut(&mut self.positions)
            .entry(position.market_id)
            .or_default()
            .insert(position.user, position);
    }

    pub fn set_holding(&mut self, holding: Holding) {
        Arc::make_mut(&mut self.holdings)
            .entry(holding.user)
            .or_default()
            .insert(holding.token, holding);
    }

    pub fn set_vault(&mut self, vault: Vault) {
        Arc::make_mut(&mut self.vaults).insert(vault.address, vault);
    }

    pub fn set_vault_market_config(&mut self, config: VaultMarketConfig) {
        Arc::make_mut(&mut self.vault_market_configs)
            .entry(config.vault)
            .or_default()
            .insert(config.market_id, config);
    }

    pub fn set_vault_v2(&mut self, vault: VaultV2) {
        Arc::make_mut(&mut self.vaults_v2).insert(vault.address, vault);
    }

    pub fn set_vault_v2_adapter(&mut self, adapter: VaultV2Adapter) {
        Arc::make_mut(&mut self.vault_v2_adapters).insert(adapter.address(), adapter);
    }

    /// Applies `f` to the holding of (`user`, `token`), creating it if missing.
    pub fn update_holding<T>(
        &mut self,
        user: Address,
        token: Address,
        f: impl FnOnce(&mut Holding) -> Result<T, SimError>,
    ) -> Result<T, SimError> {
        let mut holding = self.holding_or_empty(user, token);
        let result = f(&mut holding)?;
        self.set_holding(holding);
        Ok(result)
    }
}
