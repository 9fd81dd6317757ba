//! Morpho account state.

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub address: Address,
    /// Nonce consumed by `setAuthorizationWithSig`
    #[serde(default)]
    pub morpho_nonce: U256,
    /// Addresses allowed to manage this user's Morpho positions
    #[serde(default)]
    pub authorized: BTreeSet<Address>,
}

impl User {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            morpho_nonce: U256::ZERO,
            authorized: BTreeSet::new(),
        }
    }

    pub fn with_authorized(mut self, authorized: Address) -> Self {
        self.authorized.insert(authorized);
        self
    }

    /// Whether `sender` may act on behalf of this user on Morpho.
    pub fn is_authorized(&self, sender: Address) -> bool {
        sender == self.address || self.authorized.contains(&sender)
    }

    pub fn set_authorization(&mut self, authorized: Address, is_authorized: bool) {
        if is_authorized {
            self.authorized.insert(authorized);
        } else {
            self.authorized.remove(&authorized);
        }
    }
}
