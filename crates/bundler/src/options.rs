//! Planner configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use morpho_rs_sim::SimulationState;

/// 0.03%, in WAD
pub const DEFAULT_SLIPPAGE: U256 = U256::from_limbs([300_000_000_000_000, 0, 0, 0]);

/// Lifetime of permit and authorization signatures, in seconds
pub const DEFAULT_SIGNATURE_VALIDITY: u64 = 86_400;

/// Called with the running state before each input is populated; the returned
/// state replaces it.
pub type BundleTxHook = Arc<dyn Fn(&SimulationState) -> SimulationState + Send + Sync>;

/// Public allocator reallocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAllocatorOptions {
    pub enabled: bool,
    /// Reallocate until the market is back under this utilization, when possible
    pub supply_target_utilization: Option<U256>,
    /// Donor markets are never withdrawn past this utilization
    pub max_withdrawal_utilization: Option<U256>,
    /// Vaults allowed to donate; empty means every vault
    pub reallocatable_vaults: BTreeSet<Address>,
}

impl Default for PublicAllocatorOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            supply_target_utilization: None,
            max_withdrawal_utilization: None,
            reallocatable_vaults: BTreeSet::new(),
        }
    }
}

impl PublicAllocatorOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_supply_target_utilization(mut self, utilization: U256) -> Self {
        self.supply_target_utilization = Some(utilization);
        self
    }

    pub fn with_max_withdrawal_utilization(mut self, utilization: U256) -> Self {
        self.max_withdrawal_utilization = Some(utilization);
        self
    }

    pub fn with_reallocatable_vault(mut self, vault: Address) -> Self {
        self.reallocatable_vaults.insert(vault);
        self
    }

    pub fn allows(&self, vault: Address) -> bool {
        self.reallocatable_vaults.is_empty() || self.reallocatable_vaults.contains(&vault)
    }
}

#[derive(Clone)]
pub struct BundlerOptions {
    /// Whether the executing wallet can produce EIP-712 signatures
    pub supports_signature: bool,
    /// Tokens unwrapped for the user at the end of the bundle
    pub unwrap_tokens: BTreeSet<Address>,
    pub public_allocator: PublicAllocatorOptions,
    /// Share price tolerance of every bounded action, in WAD
    pub slippage: U256,
    pub signature_validity: u64,
    pub on_bundle_tx: Option<BundleTxHook>,
}

impl Default for BundlerOptions {
    fn default() -> Self {
        Self {
            supports_signature: true,
            unwrap_tokens: BTreeSet::new(),
            public_allocator: PublicAllocatorOptions::default(),
            slippage: DEFAULT_SLIPPAGE,
            signature_validity: DEFAULT_SIGNATURE_VALIDITY,
            on_bundle_tx: None,
        }
    }
}

impl fmt::Debug for BundlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlerOptions")
            .field("supports_signature", &self.supports_signature)
            .field("unwrap_tokens", &self.unwrap_tokens)
            .field("public_allocator", &self.public_allocator)
            .field("slippage", &self.slippage)
            .field("signature_validity", &self.signature_validity)
            .field("on_bundle_tx", &self.on_bundle_tx.is_some())
            .finish()
    }
}

impl BundlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supports_signature(mut self, supports_signature: bool) -> Self {
        self.supports_signature = supports_signature;
        self
    }

    pub fn with_unwrap_token(mut self, token: Address) -> Self {
        self.unwrap_tokens.insert(token);
        self
    }

    pub fn with_public_allocator(mut self, public_allocator: PublicAllocatorOptions) -> Self {
        self.public_allocator = public_allocator;
        self
    }

    pub fn with_slippage(mut self, slippage: U256) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn with_signature_validity(mut self, seconds: u64) -> Self {
        self.signature_validity = seconds;
        self
    }

    pub fn with_on_bundle_tx(
        mut self,
        hook: impl Fn(&SimulationState) -> SimulationState + Send + Sync + 'static,
    ) -> Self {
        self.on_bundle_tx = Some(Arc::new(hook));
        self
    }

    /// Deadline of signatures requested against `state`.
    pub(crate) fn deadline(&self, state: &SimulationState) -> u64 {
        state.timestamp().saturating_add(self.signature_validity)
    }
}
