//! Serializable form of a [`SimulationState`].
//!
//! A snapshot lists every entity in a flat `Vec`, the JSON format read by the CLI
//! and produced by indexers. Building a state from a snapshot merges the
//! [`StateConfig`] metadata into its tokens and checks that positions, vault
//! configs and queues only reference markets and vaults the snapshot contains.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addresses::ChainAddresses;
use crate::config::StateConfig;
use crate::error::{Entity, MarketId};
use crate::holding::Holding;
use crate::market::Market;
use crate::position::Position;
use crate::state::{BlockInfo, SimulationState};
use crate::token::Token;
use crate::user::User;
use crate::vault::{Vault, VaultMarketConfig};
use crate::vault_v2::{VaultV2, VaultV2Adapter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("No address book for chain {chain_id}")]
    UnsupportedChain { chain_id: u64 },

    #[error("Snapshot references an unknown {0}")]
    Dangling(Entity),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub chain_id: u64,
    pub block: BlockInfo,
    /// Falls back to the configured or canonical address book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<ChainAddresses>,
    #[serde(default)]
    pub morpho_fee_recipient: Address,
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub vaults: Vec<Vault>,
    #[serde(default)]
    pub vault_market_configs: Vec<VaultMarketConfig>,
    #[serde(default)]
    pub vaults_v2: Vec<VaultV2>,
    #[serde(default)]
    pub vault_v2_adapters: Vec<VaultV2Adapter>,
}

impl SimulationState {
    /// Builds a state from `snapshot`, applying `config`.
    pub fn from_snapshot(
        snapshot: StateSnapshot,
        config: &StateConfig,
    ) -> Result<Self, SnapshotError> {
        let chain_id = snapshot.chain_id;
        let addresses = snapshot
            .addresses
            .or_else(|| config.resolve_addresses(chain_id))
            .ok_or(SnapshotError::UnsupportedChain { chain_id })?;

        let mut state = SimulationState::new(chain_id, snapshot.block, addresses);
        state.morpho_fee_recipient = config
            .fee_recipient
            .unwrap_or(snapshot.morpho_fee_recipient);

        for market in snapshot.markets {
            state.set_market(market);
        }
        for token in snapshot.tokens {
            state.set_token(config.apply(token));
        }
        for user in snapshot.users {
            state.set_user(user);
        }
        for vault in snapshot.vaults {
            state.set_vault(vault);
        }
        for vault in snapshot.vaults_v2 {
            state.set_vault_v2(vault);
        }
        for adapter in snapshot.vault_v2_adapters {
            state.set_vault_v2_adapter(adapter);
        }
        for holding in snapshot.holdings {
            state.set_holding(holding);
        }

        for position in snapshot.positions {
            ensure_market(&state, position.market_id)?;
            state.set_position(position);
        }
        for market_config in snapshot.vault_market_configs {
            ensure_market(&state, market_config.market_id)?;
            let vault = market_config.vault;
            state
                .vault(vault)
                .map_err(|_| SnapshotError::Dangling(Entity::Vault { address: vault }))?;
            state.set_vault_market_config(market_config);
        }
        for vault in state.vaults() {
            for id in vault.supply_queue.iter().chain(&vault.withdraw_queue) {
                state
                    .vault_market_config(vault.address, *id)
                    .map_err(|_| {
                        SnapshotError::Dangling(Entity::VaultMarketConfig {
                            vault: vault.address,
                            market_id: *id,
                        })
                    })?;
            }
        }

        Ok(state)
    }

    pub fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            chain_id: self.chain_id,
            block: self.block,
            addresses: Some(self.addresses.clone()),
            morpho_fee_recipient: self.morpho_fee_recipient,
            markets: self.markets().cloned().collect(),
            tokens: self.tokens().cloned().collect(),
            users: self.users().cloned().collect(),
            positions: self.positions().cloned().collect(),
            holdings: self.holdings().cloned().collect(),
            vaults: self.vaults().cloned().collect(),
            vault_market_configs: self.vault_market_configs().cloned().collect(),
            vaults_v2: self.vaults_v2().cloned().collect(),
            vault_v2_adapters: self.vault_v2_adapters().cloned().collect(),
        }
    }
}

fn ensure_market(state: &SimulationState, id: MarketId) -> Result<(), SnapshotError> {
    state
        .market(id)
        .map(|_| ())
        .map_err(|_| SnapshotError::Dangling(Entity::Market { id }))
}
