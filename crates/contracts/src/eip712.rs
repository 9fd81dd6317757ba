//! EIP-712 domains and signing for permits and Morpho authorizations.

use std::borrow::Cow;

use alloy::signers::Signer;
use alloy::sol_types::{Eip712Domain, SolStruct};
use alloy_primitives::{Address, Bytes, Signature, B256, U256};

use crate::error::Result;
use crate::morpho;

/// Domain of an EIP-2612 token.
pub fn erc2612_domain(
    name: impl Into<String>,
    version: impl Into<String>,
    chain_id: u64,
    token: Address,
) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Owned(name.into())),
        Some(Cow::Owned(version.into())),
        Some(U256::from(chain_id)),
        Some(token),
        None,
    )
}

pub fn permit2_domain(chain_id: u64, permit2: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed("Permit2")),
        None,
        Some(U256::from(chain_id)),
        Some(permit2),
        None,
    )
}

/// Morpho's domain has neither name nor version.
pub fn morpho_domain(chain_id: u64, morpho: Address) -> Eip712Domain {
    Eip712Domain::new(None, None, Some(U256::from(chain_id)), Some(morpho), None)
}

/// Signs the EIP-712 hash of `payload` under `domain`.
pub async fn sign<S, T>(signer: &S, payload: &T, domain: &Eip712Domain) -> Result<Signature>
where
    S: Signer + ?Sized,
    T: SolStruct,
{
    let hash = payload.eip712_signing_hash(domain);
    Ok(signer.sign_hash(&hash).await?)
}

/// `v` in 27/28 form, as ERC-2612 `permit` and Morpho expect it.
pub fn recovery_byte(signature: &Signature) -> u8 {
    27 + u8::from(signature.v())
}

pub fn word(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// 65-byte `r || s || v` encoding, as Permit2 expects it.
pub fn packed(signature: &Signature) -> Bytes {
    Bytes::copy_from_slice(&signature.as_bytes())
}

impl From<&Signature> for morpho::Signature {
    fn from(signature: &Signature) -> Self {
        Self {
            v: recovery_byte(signature),
            r: word(signature.r()),
            s: word(signature.s()),
        }
    }
}
