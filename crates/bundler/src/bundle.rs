//! A planned Bundler3 multicall.

use alloy::signers::Signer;
use alloy_primitives::U256;
use morpho_rs_contracts::bundler3::{Call, IBundler3};
use morpho_rs_contracts::{PreparedCall, RawCall};
use morpho_rs_sim::ChainAddresses;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::BundlerAction;
use crate::error::BundlerError;
use crate::requirements::Requirements;

/// Actions run by one Bundler3 `multicall`, with what must happen before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBundle {
    pub chain_id: u64,
    pub addresses: ChainAddresses,
    pub actions: Vec<BundlerAction>,
    pub requirements: Requirements,
    /// Native amount sent with the multicall
    pub value: U256,
}

impl ActionBundle {
    /// Encodes every action. Fails while a signature is still missing.
    pub fn calls(&self) -> Result<Vec<Call>, BundlerError> {
        self.actions
            .iter()
            .enumerate()
            .map(|(index, action)| action.to_call(index, &self.addresses))
            .collect()
    }

    /// The typed `multicall` sent to Bundler3.
    pub fn prepare(&self) -> Result<PreparedCall<IBundler3::multicallCall>, BundlerError> {
        let call = IBundler3::multicallCall {
            bundle: self.calls()?,
        };
        Ok(PreparedCall::new(self.addresses.bundler3, call, self.value))
    }

    /// The ABI-encoded `multicall` transaction.
    pub fn tx(&self) -> Result<RawCall, BundlerError> {
        Ok(self.prepare()?.into_raw())
    }

    pub fn is_signed(&self) -> bool {
        self.requirements
            .signatures
            .iter()
            .all(|requirement| {
                self.actions
                    .get(requirement.action)
                    .is_some_and(|action| action.signature().is_some())
            })
    }

    /// Signs every signature requirement with `signer` and embeds the results.
    pub async fn sign<S>(&mut self, signer: &S) -> Result<(), BundlerError>
    where
        S: Signer + ?Sized,
    {
        for requirement in &self.requirements.signatures {
            let signature = requirement.sign(signer).await?;
            let embedded = self
                .actions
                .get_mut(requirement.action)
                .is_some_and(|action| action.set_signature(signature));
            if !embedded {
                return Err(BundlerError::MissingSignature {
                    action: requirement.action,
                });
            }
            debug!(action = requirement.action, "embedded signature");
        }
        Ok(())
    }
}
