//! Explicit configuration for building a [`SimulationState`](crate::SimulationState).
//!
//! Token wrapper laws and permit domains that the snapshot does not carry are
//! registered here and merged into the tokens when the state is built.

use std::collections::BTreeMap;

use alloy_primitives::Address;

use crate::addresses::ChainAddresses;
use crate::token::{PermitDomain, Token, Wrapper};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateConfig {
    /// Overrides the chain's canonical address book
    pub addresses: Option<ChainAddresses>,
    pub wrappers: BTreeMap<Address, Wrapper>,
    pub permit_domains: BTreeMap<Address, PermitDomain>,
    /// Overrides the snapshot's Morpho fee recipient
    pub fee_recipient: Option<Address>,
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(mut self, addresses: ChainAddresses) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn with_wrapper(mut self, token: Address, wrapper: Wrapper) -> Self {
        self.wrappers.insert(token, wrapper);
        self
    }

    pub fn with_permit_domain(
        mut self,
        token: Address,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.permit_domains.insert(
            token,
            PermitDomain {
                name: name.into(),
                version: version.into(),
            },
        );
        self
    }

    pub fn with_fee_recipient(mut self, fee_recipient: Address) -> Self {
        self.fee_recipient = Some(fee_recipient);
        self
    }

    /// Address book for `chain_id`, preferring the configured override.
    pub fn resolve_addresses(&self, chain_id: u64) -> Option<ChainAddresses> {
        self.addresses
            .clone()
            .or_else(|| ChainAddresses::for_chain(chain_id))
    }

    /// Applies registered metadata to `token`; snapshot values win.
    pub fn apply(&self, mut token: Token) -> Token {
        if token.wrapper.is_none() {
            token.wrapper = self.wrappers.get(&token.address).cloned();
        }
        if token.permit.is_none() {
            token.permit = self.permit_domains.get(&token.address).cloned();
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{WrapLaw, NATIVE_ADDRESS};

    #[test]
    fn test_apply_merges_metadata() {
        let weth = Address::repeat_byte(0x11);
        let config = StateConfig::new()
            .with_wrapper(
                weth,
                Wrapper {
                    underlying: NATIVE_ADDRESS,
                    underlying_decimals: 18,
                    law: WrapLaw::Constant,
                },
            )
            .with_permit_domain(weth, "Wrapped Ether", "1");

        let token = config.apply(Token::new(weth, 18, "WETH"));
        assert!(token.wraps_native());
        assert!(token.supports_permit());
    }

    #[test]
    fn test_snapshot_metadata_wins() {
        let usdc = Address::repeat_byte(0x22);
        let config = StateConfig::new().with_permit_domain(usdc, "Other", "9");
        let token = config.apply(Token::new(usdc, 6, "USDC").with_permit("USD Coin", "2"));
        assert_eq!(token.permit.unwrap().version, "2");
    }

    #[test]
    fn test_resolve_addresses() {
        assert!(StateConfig::new().resolve_addresses(1).is_some());
        assert!(StateConfig::new().resolve_addresses(31337).is_none());

        let custom = ChainAddresses::for_chain(1).unwrap();
        let config = StateConfig::new().with_addresses(custom.clone());
        assert_eq!(config.resolve_addresses(31337), Some(custom));
    }
}
