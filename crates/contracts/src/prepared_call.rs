//! Calls built but not sent.
//!
//! [`PreparedCall`] keeps the typed `SolCall` for inspection; [`RawCall`] is the
//! ABI-encoded form handed to wallets and Bundler3.

use alloy_primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A typed call to `to`, carrying `value` wei.
///
/// # Example
///
/// ```rust,ignore
/// let call = IERC20::approveCall { spender, amount };
/// let (addr, call) = PreparedCall::new(token, call, U256::ZERO).prepare();
/// ```
#[derive(Debug, Clone)]
pub struct PreparedCall<C: SolCall> {
    to: Address,
    call: C,
    value: U256,
}

impl<C: SolCall> PreparedCall<C> {
    /// Create a new prepared call.
    pub fn new(to: Address, call: C, value: U256) -> Self {
        Self { to, call, value }
    }

    /// Consumes self and returns `(address, call)`.
    pub fn prepare(self) -> (Address, C) {
        (self.to, self.call)
    }

    /// Returns the target address for this call.
    pub fn to(&self) -> Address {
        self.to
    }

    /// Returns the value (ETH) to send with this call.
    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn call(&self) -> &C {
        &self.call
    }

    /// ABI-encodes the call.
    pub fn into_raw(self) -> RawCall {
        RawCall::new(self.to, &self.call, self.value)
    }
}

impl<C: SolCall> From<PreparedCall<C>> for RawCall {
    fn from(call: PreparedCall<C>) -> Self {
        call.into_raw()
    }
}

/// An ABI-encoded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl RawCall {
    pub fn new<C: SolCall>(to: Address, call: &C, value: U256) -> Self {
        Self {
            to,
            data: call.abi_encode().into(),
            value,
        }
    }

    /// The 4-byte function selector, if the calldata has one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4)?.try_into().ok()
    }

    /// Decodes the calldata as `C`, checking the selector.
    pub fn decode<C: SolCall>(&self) -> Result<C> {
        Ok(C::abi_decode(&self.data)?)
    }
}
