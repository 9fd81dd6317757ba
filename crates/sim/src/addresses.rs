//! Canonical contract addresses per chain.

use alloy_chains::NamedChain;
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAddresses {
    pub morpho: Address,
    pub bundler3: Address,
    pub general_adapter1: Address,
    #[serde(default)]
    pub permit2: Option<Address>,
    #[serde(default)]
    pub public_allocator: Option<Address>,
    #[serde(default)]
    pub wrapped_native: Option<Address>,
    #[serde(default)]
    pub adaptive_curve_irm: Option<Address>,
}

const MORPHO: Address = address!("BBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb");
const PERMIT2: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");

impl ChainAddresses {
    /// Address book of a supported chain.
    pub fn for_chain(chain_id: u64) -> Option<Self> {
        match NamedChain::try_from(chain_id).ok()? {
            NamedChain::Mainnet => Some(Self {
                morpho: MORPHO,
                bundler3: address!("6566194141eefa99Af43Bb5Aa71460Ca2Dc90245"),
                general_adapter1: address!("4A6c312ec70E8747a587EE860a0353cd42Be0aE0"),
                permit2: Some(PERMIT2),
                public_allocator: Some(address!("fd32fA2ca22c76dD6E550706Ad913FC6CE91c75D")),
                wrapped_native: Some(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
                adaptive_curve_irm: Some(address!("870aC11D48B15DB9a138Cf899d20F13F79Ba00BC")),
            }),
            NamedChain::Base => Some(Self {
                morpho: MORPHO,
                bundler3: address!("6BFd8137e702540E7A42B74178A4a49Ba43920C4"),
                general_adapter1: address!("b98c948CFA24072e58935BC004a8A7b376AE746A"),
                permit2: Some(PERMIT2),
                public_allocator: Some(address!("A090dD1a701408Df1d4d0B85b716c87565f90467")),
                wrapped_native: Some(address!("4200000000000000000000000000000000000006")),
                adaptive_curve_irm: Some(address!("46415998764C29aB2a25CbeA6254146D50D22687")),
            }),
            _ => None,
        }
    }

    pub fn supported_chains() -> &'static [NamedChain] {
        &[NamedChain::Mainnet, NamedChain::Base]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_addresses() {
        let addresses = ChainAddresses::for_chain(1).unwrap();
        assert_eq!(addresses.morpho, MORPHO);
        assert_eq!(addresses.permit2, Some(PERMIT2));
    }

    #[test]
    fn test_base_shares_morpho_address() {
        let base = ChainAddresses::for_chain(8453).unwrap();
        let mainnet = ChainAddresses::for_chain(1).unwrap();
        assert_eq!(base.morpho, mainnet.morpho);
        assert_ne!(base.general_adapter1, mainnet.general_adapter1);
    }

    #[test]
    fn test_unsupported_chain() {
        assert!(ChainAddresses::for_chain(999_999_999).is_none());
    }
}
