//! Per (user, token) balances and allowances.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::addresses::ChainAddresses;
use crate::error::{Entity, SimError};

/// The spenders whose allowances are tracked by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spender {
    Morpho,
    Permit2,
    GeneralAdapter1,
}

impl Spender {
    /// Resolves a spender address against the chain's canonical contracts.
    pub fn resolve(address: Address, addresses: &ChainAddresses) -> Result<Self, SimError> {
        if address == addresses.morpho {
            Ok(Self::Morpho)
        } else if address == addresses.general_adapter1 {
            Ok(Self::GeneralAdapter1)
        } else if Some(address) == addresses.permit2 {
            Ok(Self::Permit2)
        } else {
            Err(SimError::UnknownEntity(Entity::Spender { address }))
        }
    }

    pub fn address(self, addresses: &ChainAddresses) -> Option<Address> {
        match self {
            Self::Morpho => Some(addresses.morpho),
            Self::Permit2 => addresses.permit2,
            Self::GeneralAdapter1 => Some(addresses.general_adapter1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowances {
    #[serde(default)]
    pub morpho: U256,
    #[serde(default)]
    pub permit2: U256,
    #[serde(default)]
    pub general_adapter1: U256,
}

impl Allowances {
    pub fn get(&self, spender: Spender) -> U256 {
        match spender {
            Spender::Morpho => self.morpho,
            Spender::Permit2 => self.permit2,
            Spender::GeneralAdapter1 => self.general_adapter1,
        }
    }

    pub fn get_mut(&mut self, spender: Spender) -> &mut U256 {
        match spender {
            Spender::Morpho => &mut self.morpho,
            Spender::Permit2 => &mut self.permit2,
            Spender::GeneralAdapter1 => &mut self.general_adapter1,
        }
    }
}

/// `type(uint160).max`, the unlimited Permit2 amount
pub const MAX_UINT_160: U256 = U256::from_limbs([u64::MAX, u64::MAX, 0xFFFF_FFFF, 0]);

/// `type(uint48).max`, the farthest Permit2 expiration
pub const MAX_UINT_48: u64 = (1 << 48) - 1;

/// Permit2 allowance granted to GeneralAdapter1 (uint160 amount, uint48 expiration and nonce).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit2Allowance {
    pub amount: U256,
    pub expiration: u64,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub user: Address,
    pub token: Address,
    pub balance: U256,
    #[serde(default)]
    pub allowances: Allowances,
    #[serde(default)]
    pub permit2_allowance: Permit2Allowance,
    /// Present when the token exposes EIP-2612 `nonces(owner)`
    #[serde(default)]
    pub erc2612_nonce: Option<U256>,
}

impl Holding {
    pub fn new(user: Address, token: Address, balance: U256) -> Self {
        Self {
            user,
            token,
            balance,
            allowances: Allowances::default(),
            permit2_allowance: Permit2Allowance::default(),
            erc2612_nonce: None,
        }
    }

    /// A zero holding, created when a user first receives a token.
    pub fn empty(user: Address, token: Address) -> Self {
        Self::new(user, token, U256::ZERO)
    }

    pub fn with_allowance(mut self, spender: Spender, amount: U256) -> Self {
        *self.allowances.get_mut(spender) = amount;
        self
    }

    pub fn with_erc2612_nonce(mut self, nonce: U256) -> Self {
        self.erc2612_nonce = Some(nonce);
        self
    }

    pub fn with_permit2_allowance(mut self, allowance: Permit2Allowance) -> Self {
        self.permit2_allowance = allowance;
        self
    }

    pub fn debit(&mut self, amount: U256) -> Result<(), SimError> {
        if amount > self.balance {
            return Err(SimError::InsufficientBalance {
                user: self.user,
                token: self.token,
                balance: self.balance,
                required: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: U256) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Spends `amount` of the allowance to `spender`; unlimited allowances are kept.
    pub fn spend_allowance(
        &mut self,
        spender: Spender,
        spender_address: Address,
        amount: U256,
    ) -> Result<(), SimError> {
        let allowance = self.allowances.get_mut(spender);
        if *allowance == U256::MAX {
            return Ok(());
        }
        if amount > *allowance {
            return Err(SimError::InsufficientAllowance {
                owner: self.user,
                token: self.token,
                spender: spender_address,
                allowance: *allowance,
                required: amount,
            });
        }
        *allowance -= amount;
        Ok(())
    }
}
