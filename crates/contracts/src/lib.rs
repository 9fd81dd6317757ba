//! Contract bindings for Morpho Blue, GeneralAdapter1 and Bundler3.
//!
//! This crate provides Solidity bindings, EIP-712 payloads and ABI-encoded
//! calls. It never talks to a node: calls are built here and sent by the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use morpho_rs_contracts::{bundler3::IBundler3, RawCall};
//! use alloy::primitives::U256;
//!
//! let multicall = IBundler3::multicallCall { bundle: calls };
//! let tx = RawCall::new(bundler3, &multicall, U256::ZERO);
//! ```

pub mod bundler3;
pub mod eip712;
pub mod erc20;
pub mod error;
pub mod morpho;
pub mod permit2;
pub mod prepared_call;

pub use error::{ContractError, Result};
pub use prepared_call::{PreparedCall, RawCall};

use alloy::primitives::Uint;
use alloy_primitives::U256;

/// Narrows `value` to `uint{BITS}`.
pub fn narrow<const BITS: usize, const LIMBS: usize>(
    field: &'static str,
    value: U256,
) -> Result<Uint<BITS, LIMBS>> {
    Uint::try_from_be_slice(&value.to_be_bytes::<32>()).ok_or(ContractError::AmountOverflow {
        field,
        bits: BITS,
        value,
    })
}
