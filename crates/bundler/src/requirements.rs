//! What the user must provide before the multicall can run.
//!
//! Transactions are sent and mined before the multicall. Signatures are
//! EIP-712 payloads signed off-chain and embedded into the action at
//! [`SignatureRequirement::action`].

use alloy::signers::Signer;
use alloy::sol_types::{Eip712Domain, SolStruct};
use alloy_primitives::{Address, Signature, B256, U256};
use morpho_rs_contracts::erc20::{IERC20, Permit};
use morpho_rs_contracts::morpho::{Authorization, IMorpho};
use morpho_rs_contracts::permit2::{PermitDetails, PermitSingle};
use morpho_rs_contracts::{eip712, narrow, ContractError, PreparedCall, RawCall};
use serde::{Deserialize, Serialize};

use crate::error::BundlerError;

/// EIP-2612 permit granted by `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitMessage {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub nonce: U256,
    pub deadline: u64,
}

impl PermitMessage {
    pub fn to_sol(&self) -> Permit {
        Permit {
            owner: self.owner,
            spender: self.spender,
            value: self.value,
            nonce: self.nonce,
            deadline: U256::from(self.deadline),
        }
    }
}

/// Permit2 single-token allowance granted by `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitSingleMessage {
    pub owner: Address,
    pub token: Address,
    pub amount: U256,
    pub expiration: u64,
    pub nonce: u64,
    pub spender: Address,
    pub sig_deadline: u64,
}

impl PermitSingleMessage {
    pub fn to_sol(&self) -> Result<PermitSingle, ContractError> {
        Ok(PermitSingle {
            details: PermitDetails {
                token: self.token,
                amount: narrow("amount", self.amount)?,
                expiration: narrow("expiration", U256::from(self.expiration))?,
                nonce: narrow("nonce", U256::from(self.nonce))?,
            },
            spender: self.spender,
            sigDeadline: U256::from(self.sig_deadline),
        })
    }
}

/// Morpho authorization signed by `authorizer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationMessage {
    pub authorizer: Address,
    pub authorized: Address,
    pub is_authorized: bool,
    pub nonce: U256,
    pub deadline: u64,
}

impl AuthorizationMessage {
    pub fn to_sol(&self) -> Authorization {
        Authorization {
            authorizer: self.authorizer,
            authorized: self.authorized,
            isAuthorized: self.is_authorized,
            nonce: self.nonce,
            deadline: U256::from(self.deadline),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TypedMessage {
    Permit(PermitMessage),
    PermitSingle(PermitSingleMessage),
    Authorization(AuthorizationMessage),
}

impl TypedMessage {
    /// Address expected to sign the message.
    pub fn signer(&self) -> Address {
        match self {
            Self::Permit(message) => message.owner,
            Self::PermitSingle(message) => message.owner,
            Self::Authorization(message) => message.authorizer,
        }
    }

    pub fn signing_hash(&self, domain: &Eip712Domain) -> Result<B256, BundlerError> {
        Ok(match self {
            Self::Permit(message) => message.to_sol().eip712_signing_hash(domain),
            Self::PermitSingle(message) => message.to_sol()?.eip712_signing_hash(domain),
            Self::Authorization(message) => message.to_sol().eip712_signing_hash(domain),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SigningDomain {
    Erc2612 {
        name: String,
        version: String,
        chain_id: u64,
        verifying_contract: Address,
    },
    Permit2 {
        chain_id: u64,
        verifying_contract: Address,
    },
    Morpho {
        chain_id: u64,
        verifying_contract: Address,
    },
}

impl SigningDomain {
    pub fn to_eip712(&self) -> Eip712Domain {
        match self {
            Self::Erc2612 {
                name,
                version,
                chain_id,
                verifying_contract,
            } => eip712::erc2612_domain(name.clone(), version.clone(), *chain_id, *verifying_contract),
            Self::Permit2 {
                chain_id,
                verifying_contract,
            } => eip712::permit2_domain(*chain_id, *verifying_contract),
            Self::Morpho {
                chain_id,
                verifying_contract,
            } => eip712::morpho_domain(*chain_id, *verifying_contract),
        }
    }
}

/// A signature to embed into the action at index `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequirement {
    pub action: usize,
    pub domain: SigningDomain,
    pub message: TypedMessage,
}

impl SignatureRequirement {
    pub fn signing_hash(&self) -> Result<B256, BundlerError> {
        self.message.signing_hash(&self.domain.to_eip712())
    }

    /// Signs the payload with `signer`, which must be the message's signer.
    pub async fn sign<S>(&self, signer: &S) -> Result<Signature, BundlerError>
    where
        S: Signer + ?Sized,
    {
        let expected = self.message.signer();
        if signer.address() != expected {
            return Err(BundlerError::SignerMismatch {
                expected,
                found: signer.address(),
            });
        }

        let domain = self.domain.to_eip712();
        let signature = match &self.message {
            TypedMessage::Permit(message) => {
                eip712::sign(signer, &message.to_sol(), &domain).await?
            }
            TypedMessage::PermitSingle(message) => {
                eip712::sign(signer, &message.to_sol()?, &domain).await?
            }
            TypedMessage::Authorization(message) => {
                eip712::sign(signer, &message.to_sol(), &domain).await?
            }
        };
        Ok(signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "camelCase")]
pub enum TransactionKind {
    Erc20Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    MorphoSetAuthorization {
        authorized: Address,
        is_authorized: bool,
    },
}

/// A transaction mined before the multicall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequirement {
    #[serde(flatten)]
    pub kind: TransactionKind,
    pub raw_call: RawCall,
}

impl TransactionRequirement {
    pub fn erc20_approve(token: Address, spender: Address, amount: U256) -> Self {
        let call = IERC20::approveCall { spender, amount };
        Self {
            kind: TransactionKind::Erc20Approve {
                token,
                spender,
                amount,
            },
            raw_call: PreparedCall::new(token, call, U256::ZERO).into_raw(),
        }
    }

    pub fn morpho_set_authorization(morpho: Address, authorized: Address, is_authorized: bool) -> Self {
        let call = IMorpho::setAuthorizationCall {
            authorized,
            newIsAuthorized: is_authorized,
        };
        Self {
            kind: TransactionKind::MorphoSetAuthorization {
                authorized,
                is_authorized,
            },
            raw_call: PreparedCall::new(morpho, call, U256::ZERO).into_raw(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub signatures: Vec<SignatureRequirement>,
    pub txs: Vec<TransactionRequirement>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty() && self.txs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::sol_types::SolCall;

    // Anvil's default account 0 private key
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signer() -> PrivateKeySigner {
        TEST_PRIVATE_KEY.parse().unwrap()
    }

    fn permit_requirement(owner: Address) -> SignatureRequirement {
        SignatureRequirement {
            action: 0,
            domain: SigningDomain::Erc2612 {
                name: "USD Coin".to_string(),
                version: "2".to_string(),
                chain_id: 1,
                verifying_contract: Address::repeat_byte(0xa0),
            },
            message: TypedMessage::Permit(PermitMessage {
                owner,
                spender: Address::repeat_byte(0x42),
                value: U256::from(1_000_000u64),
                nonce: U256::from(3),
                deadline: 1_700_086_400,
            }),
        }
    }

    #[tokio::test]
    async fn test_sign_recovers_owner() {
        let signer = signer();
        let requirement = permit_requirement(signer.address());

        let signature = requirement.sign(&signer).await.unwrap();
        let recovered = signature
            .recover_address_from_prehash(&requirement.signing_hash().unwrap())
            .unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[tokio::test]
    async fn test_sign_rejects_other_signer() {
        let requirement = permit_requirement(Address::repeat_byte(0xaa));
        let err = requirement.sign(&signer()).await.unwrap_err();
        assert!(matches!(err, BundlerError::SignerMismatch { .. }));
    }

    #[test]
    fn test_permit_single_overflow() {
        let message = TypedMessage::PermitSingle(PermitSingleMessage {
            owner: Address::ZERO,
            token: Address::ZERO,
            amount: U256::MAX,
            expiration: 0,
            nonce: 0,
            spender: Address::ZERO,
            sig_deadline: 0,
        });
        let domain = SigningDomain::Permit2 {
            chain_id: 1,
            verifying_contract: Address::ZERO,
        };
        assert!(matches!(
            message.signing_hash(&domain.to_eip712()),
            Err(BundlerError::Contract(ContractError::AmountOverflow { bits: 160, .. }))
        ));
    }

    #[test]
    fn test_transaction_requirement_wire_format() {
        let tx = TransactionRequirement::erc20_approve(
            Address::repeat_byte(0xa0),
            Address::repeat_byte(0x22),
            U256::MAX,
        );
        let json = serde_json::to_value(&tx).unwrap();

        assert_eq!(json["type"], "erc20Approve");
        assert_eq!(json["raw_call"]["to"], serde_json::to_value(Address::repeat_byte(0xa0)).unwrap());
        assert_eq!(tx.raw_call.selector(), Some(IERC20::approveCall::SELECTOR));
    }
}
